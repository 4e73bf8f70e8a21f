// Tests for link extraction over a document collection

use linkvet_scanner::extract::{self, DocumentCollection, LinkKind};
use linkvet_scanner::ScanError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn sample_collection() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "index.html",
        br#"<html><body>
            <a href="https://example.com/a">A</a>
            <a href="https://example.com/b">B</a>
            <img src="img/logo.png">
        </body></html>"#,
    );
    write(
        dir.path(),
        "chapters/one.htm",
        br#"<html><body>
            <a href="https://example.com/a">A again</a>
            <img src="https://images.example.org/cover.jpg">
            <a href="/internal">Internal</a>
        </body></html>"#,
    );
    write(dir.path(), "notes.txt", b"https://example.com/ignored");
    dir
}

// ============================================================================
// Collection Tests
// ============================================================================

#[test]
fn test_open_lists_html_documents_sorted() {
    let dir = sample_collection();
    let collection = DocumentCollection::open(dir.path()).unwrap();

    let ids: Vec<String> = collection.document_ids().collect();
    assert_eq!(ids, vec!["chapters/one.htm", "index.html"]);
    assert_eq!(collection.len(), 2);
}

#[test]
fn test_open_missing_directory_is_fatal() {
    let dir = TempDir::new().unwrap();
    let result = DocumentCollection::open(dir.path().join("does-not-exist"));
    assert!(matches!(result, Err(ScanError::CollectionUnreadable { .. })));
}

#[test]
fn test_open_file_instead_of_directory_is_fatal() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.html", b"<html></html>");
    let result = DocumentCollection::open(dir.path().join("page.html"));
    assert!(matches!(result, Err(ScanError::CollectionUnreadable { .. })));
}

// ============================================================================
// Extraction Tests
// ============================================================================

#[test]
fn test_links_are_deduplicated_across_documents() {
    let dir = sample_collection();
    let collection = DocumentCollection::open(dir.path()).unwrap();
    let extraction = extract::extract(&collection);

    assert_eq!(extraction.documents_scanned, 2);
    assert_eq!(extraction.links.len(), 3);
    assert_eq!(extraction.total_references(), 4);

    let shared = &extraction.links["https://example.com/a"];
    let sources: Vec<&str> = shared.source_documents.iter().map(String::as_str).collect();
    assert_eq!(sources, vec!["chapters/one.htm", "index.html"]);

    let image = &extraction.links["https://images.example.org/cover.jpg"];
    assert!(image.kinds.contains(&LinkKind::Image));
}

#[test]
fn test_extraction_is_idempotent() {
    let dir = sample_collection();
    let collection = DocumentCollection::open(dir.path()).unwrap();

    let first = extract::extract(&collection);
    let second = extract::extract(&collection);
    assert_eq!(first, second);
}

#[test]
fn test_malformed_document_is_skipped() {
    let dir = sample_collection();
    write(dir.path(), "broken.html", &[0x3c, 0x61, 0xff, 0xfe, 0x00]);

    let collection = DocumentCollection::open(dir.path()).unwrap();
    let extraction = extract::extract(&collection);

    assert_eq!(extraction.documents_scanned, 3);
    assert_eq!(extraction.issues.len(), 1);
    assert_eq!(extraction.issues[0].document, "broken.html");
    assert_eq!(extraction.links.len(), 3);
}

#[test]
fn test_strict_markup_flags_parse_errors() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "sloppy.html",
        b"<!DOCTYPE html><html><body><a href=\"https://example.com/x\">x</b></body></html>",
    );
    write(
        dir.path(),
        "tidy.html",
        b"<!DOCTYPE html><html><head><title>t</title></head>\
          <body><a href=\"https://example.com/y\">y</a></body></html>",
    );

    let lenient = DocumentCollection::open(dir.path()).unwrap();
    assert_eq!(extract::extract(&lenient).links.len(), 2);

    let strict = lenient.with_strict_markup(true);
    let extraction = extract::extract(&strict);
    assert_eq!(
        extraction.links.keys().collect::<Vec<_>>(),
        vec!["https://example.com/y"]
    );
    assert_eq!(extraction.issues.len(), 1);
    assert_eq!(extraction.issues[0].document, "sloppy.html");
}

// ============================================================================
// Local Reference Tests
// ============================================================================

#[test]
fn test_missing_local_images_are_reported() {
    let dir = sample_collection();
    let collection = DocumentCollection::open(dir.path()).unwrap();
    let extraction = extract::extract(&collection);

    assert_eq!(extraction.local_references.len(), 1);
    let missing =
        extract::check_local_references(&extraction.local_references, collection.root());
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].path, "img/logo.png");

    write(dir.path(), "img/logo.png", b"png");
    let missing =
        extract::check_local_references(&extraction.local_references, collection.root());
    assert!(missing.is_empty());
}

#[test]
fn test_local_images_resolve_from_collection_root() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "chapters/two.html",
        br#"<img src="shared/figure.png">"#,
    );
    write(dir.path(), "shared/figure.png", b"png");

    let collection = DocumentCollection::open(dir.path()).unwrap();
    let extraction = extract::extract(&collection);
    let missing =
        extract::check_local_references(&extraction.local_references, collection.root());
    assert!(missing.is_empty());
}
