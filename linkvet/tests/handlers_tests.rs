use linkvet::handlers::*;
use linkvet_core::checkpoint::CheckpointState;
use linkvet_core::report::ReportFormat;
use linkvet_scanner::extract::{self, DocumentCollection};
use linkvet_scanner::result::{Category, ProbeResult, ProbeTrace};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_parse_domain_interval() {
    assert_eq!(
        parse_domain_interval("doi.org=2000"),
        Ok(("doi.org".to_string(), 2000))
    );
    assert_eq!(
        parse_domain_interval(" WWW.Example.com = 250 "),
        Ok(("www.example.com".to_string(), 250))
    );
}

#[test]
fn test_parse_domain_interval_invalid() {
    assert!(parse_domain_interval("doi.org").is_err());
    assert!(parse_domain_interval("=2000").is_err());
    assert!(parse_domain_interval("doi.org=soon").is_err());
    assert!(parse_domain_interval("doi.org=-5").is_err());
}

#[test]
fn test_exit_status_codes() {
    assert_eq!(ExitStatus::Success.code(), 0);
    assert_eq!(ExitStatus::Fatal.code(), 1);
    assert_eq!(ExitStatus::Interrupted.code(), 2);
    assert_eq!(ExitStatus::BrokenLinksFound.code(), 3);
}

#[test]
fn test_build_config_defaults() {
    let config = build_config(&CheckOverrides::default()).unwrap();
    assert_eq!(config.max_workers, 4);
    assert_eq!(config.batch_size, 20);
    assert_eq!(config.output_path, PathBuf::from("broken_links_report.txt"));
    assert_eq!(
        config.checkpoint_path(),
        PathBuf::from("broken_links_report.txt.checkpoint.json")
    );
}

#[test]
fn test_flags_override_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_file = NamedTempFile::new()?;
    write!(
        config_file,
        r#"{{
            "max_workers": 8,
            "batch_size": 50,
            "request_timeout_secs": 30,
            "domain_intervals": {{ "example.org": 1000 }}
        }}"#
    )?;

    let overrides = CheckOverrides {
        config_file: Some(config_file.path().to_path_buf()),
        threads: Some(2),
        domain_intervals: vec![("doi.org".to_string(), 5000)],
        no_browser_headers: true,
        ..CheckOverrides::default()
    };

    let config = build_config(&overrides)?;
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.batch_size, 50);
    assert_eq!(config.request_timeout_secs, 30);
    assert_eq!(config.domain_intervals.get("example.org"), Some(&1000));
    assert_eq!(config.domain_intervals.get("doi.org"), Some(&5000));
    assert!(!config.browser_headers);
    Ok(())
}

#[test]
fn test_invalid_values_are_rejected() {
    let overrides = CheckOverrides {
        threads: Some(0),
        ..CheckOverrides::default()
    };
    assert!(build_config(&overrides).is_err());
}

#[test]
fn test_unparsable_config_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_file = NamedTempFile::new()?;
    write!(config_file, "max_workers = 8")?;

    let overrides = CheckOverrides {
        config_file: Some(config_file.path().to_path_buf()),
        ..CheckOverrides::default()
    };
    assert!(build_config(&overrides).is_err());
    Ok(())
}

#[test]
fn test_overlapping_status_sets_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_file = NamedTempFile::new()?;
    let json = serde_json::json!({
        "classification": {
            "broken_statuses": [404, 403],
            "browser_only_statuses": [403]
        }
    });
    write!(config_file, "{}", json)?;

    let overrides = CheckOverrides {
        config_file: Some(config_file.path().to_path_buf()),
        ..CheckOverrides::default()
    };
    assert!(build_config(&overrides).is_err());
    Ok(())
}

fn collection_with_links() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("index.html"),
        r#"<a href="https://example.com/ok">ok</a>
           <a href="https://example.com/gone">gone</a>
           <img src="missing.png">"#,
    )
    .unwrap();
    dir
}

fn result(url: &str, category: Category) -> ProbeResult {
    ProbeResult::new(
        ProbeTrace {
            url: url.to_string(),
            attempts: Vec::new(),
        },
        category,
        BTreeSet::from(["index.html".to_string()]),
    )
}

#[test]
fn test_format_extraction_lists_links() {
    let dir = collection_with_links();
    let collection = DocumentCollection::open(dir.path()).unwrap();
    let listing = format_extraction(&extract::extract(&collection));

    assert!(listing.contains("https://example.com/gone [LINK]\n    index.html\n"));
    assert!(listing.contains("2 unique link(s), 2 reference(s), 1 document(s), 0 skipped"));
}

#[test]
fn test_write_report_drops_results_outside_collection() {
    let dir = collection_with_links();
    let collection = DocumentCollection::open(dir.path()).unwrap();
    let extraction = extract::extract(&collection);
    let missing = extract::check_local_references(&extraction.local_references, collection.root());

    let mut state = CheckpointState::new();
    state.record(result("https://example.com/ok", Category::Ok));
    state.record(result("https://example.com/gone", Category::DefinitelyBroken));
    state.record(result("https://example.com/removed", Category::DefinitelyBroken));

    let output = dir.path().join("out").join("report.txt");
    let counts = write_report(&extraction, missing, state, ReportFormat::Text, &output).unwrap();

    assert_eq!(counts.total(), 2);
    assert_eq!(counts.definitely_broken, 1);

    let report = fs::read_to_string(&output).unwrap();
    assert!(report.contains("https://example.com/gone"));
    assert!(!report.contains("https://example.com/removed"));
    assert!(report.contains("[LOCAL_IMAGE] missing.png"));
}
