//! Report generation from classified probe results.

use crate::error::PersistenceError;
use crate::persist::write_atomic;
use linkvet_scanner::extract::{Extraction, ExtractionIssue, LinkKind, LocalReference};
use linkvet_scanner::result::{Category, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const HEAVY_RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// What the extractor saw, independent of any network activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub documents_scanned: usize,
    pub unique_links: usize,
    pub extraction_issues: Vec<ExtractionIssue>,
    pub missing_local_files: Vec<LocalReference>,
    pub link_kinds: BTreeMap<String, BTreeSet<LinkKind>>,
}

impl CorpusSummary {
    pub fn from_extraction(extraction: &Extraction, missing_local_files: Vec<LocalReference>) -> Self {
        let mut missing_local_files = missing_local_files;
        missing_local_files.sort();

        Self {
            documents_scanned: extraction.documents_scanned,
            unique_links: extraction.links.len(),
            extraction_issues: extraction.issues.clone(),
            missing_local_files,
            link_kinds: extraction
                .links
                .values()
                .map(|l| (l.url.clone(), l.kinds.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub definitely_broken: usize,
    pub works_in_browser: usize,
    pub may_work_in_browser: usize,
    pub ok: usize,
}

impl CategoryCounts {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            *counts.slot(result.category) += 1;
        }
        counts
    }

    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::DefinitelyBroken => self.definitely_broken,
            Category::WorksInBrowser => self.works_in_browser,
            Category::MayWorkInBrowser => self.may_work_in_browser,
            Category::Ok => self.ok,
        }
    }

    pub fn total(&self) -> usize {
        self.definitely_broken + self.works_in_browser + self.may_work_in_browser + self.ok
    }

    fn slot(&mut self, category: Category) -> &mut usize {
        match category {
            Category::DefinitelyBroken => &mut self.definitely_broken,
            Category::WorksInBrowser => &mut self.works_in_browser,
            Category::MayWorkInBrowser => &mut self.may_work_in_browser,
            Category::Ok => &mut self.ok,
        }
    }
}

fn marker(category: Category) -> &'static str {
    match category {
        Category::DefinitelyBroken => "🔴",
        Category::WorksInBrowser => "🟡",
        Category::MayWorkInBrowser => "🟠",
        Category::Ok => "🟢",
    }
}

fn section_header(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push('\n');
}

/// Results in report order: by category, then by URL
pub fn sorted_results(results: &[ProbeResult]) -> Vec<&ProbeResult> {
    let mut sorted: Vec<&ProbeResult> = results.iter().collect();
    sorted.sort_by(|a, b| (a.category, &a.url).cmp(&(b.category, &b.url)));
    sorted
}

fn format_kinds(kinds: Option<&BTreeSet<LinkKind>>) -> String {
    match kinds {
        Some(kinds) if !kinds.is_empty() => kinds
            .iter()
            .map(LinkKind::as_str)
            .collect::<Vec<_>>()
            .join("/"),
        _ => "LINK".to_string(),
    }
}

pub fn generate_text_report(results: &[ProbeResult], summary: &CorpusSummary) -> String {
    let mut report = String::new();
    let counts = CategoryCounts::from_results(results);
    let sorted = sorted_results(results);

    report.push_str(HEAVY_RULE);
    report.push_str("                          LINK VALIDATION REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');

    report.push_str(&format!("Documents scanned:  {}\n", summary.documents_scanned));
    report.push_str(&format!("Unique links:       {}\n", summary.unique_links));
    report.push_str(&format!("Links checked:      {}\n", counts.total()));
    report.push('\n');

    for category in Category::ALL {
        let in_category: Vec<&ProbeResult> = sorted
            .iter()
            .copied()
            .filter(|r| r.category == category)
            .collect();
        if in_category.is_empty() {
            continue;
        }

        section_header(
            &mut report,
            &format!("{} {} ({})", marker(category), category.title(), in_category.len()),
        );

        let mut by_document: BTreeMap<&str, Vec<&ProbeResult>> = BTreeMap::new();
        for &result in &in_category {
            if result.referencing_documents.is_empty() {
                by_document.entry("(unknown document)").or_default().push(result);
            }
            for document in &result.referencing_documents {
                by_document.entry(document.as_str()).or_default().push(result);
            }
        }

        for (document, entries) in by_document {
            report.push_str(&format!("{}\n", document));
            for result in entries {
                report.push_str(&format!(
                    "  [{}] {}\n",
                    format_kinds(summary.link_kinds.get(&result.url)),
                    result.url
                ));
                report.push_str(&format!("      {}\n", result.attempt_chain()));
            }
            report.push('\n');
        }
    }

    if !summary.missing_local_files.is_empty() {
        section_header(
            &mut report,
            &format!("🖼  MISSING LOCAL FILES ({})", summary.missing_local_files.len()),
        );

        let mut by_document: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for missing in &summary.missing_local_files {
            by_document
                .entry(missing.document.as_str())
                .or_default()
                .push(missing.path.as_str());
        }
        for (document, paths) in by_document {
            report.push_str(&format!("{}\n", document));
            for path in paths {
                report.push_str(&format!("  [LOCAL_IMAGE] {}\n", path));
            }
            report.push('\n');
        }
    }

    if !summary.extraction_issues.is_empty() {
        section_header(
            &mut report,
            &format!("⚠  SKIPPED DOCUMENTS ({})", summary.extraction_issues.len()),
        );
        let mut issues: Vec<&ExtractionIssue> = summary.extraction_issues.iter().collect();
        issues.sort_by(|a, b| a.document.cmp(&b.document));
        for issue in issues {
            report.push_str(&format!("{}\n  {}\n", issue.document, issue.reason));
        }
        report.push('\n');
    }

    section_header(&mut report, "SUMMARY");
    for category in Category::ALL {
        report.push_str(&format!(
            "  {} {:<22}{}\n",
            marker(category),
            category.title(),
            counts.get(category)
        ));
    }
    report.push('\n');
    report.push_str(&format!("  Documents scanned      {}\n", summary.documents_scanned));
    report.push_str(&format!(
        "  Extraction issues      {}\n",
        summary.extraction_issues.len()
    ));
    report.push_str(&format!("  Unique links           {}\n", summary.unique_links));
    report.push_str(&format!("  Links checked          {}\n", counts.total()));
    report.push_str(&format!("  Broken links           {}\n", counts.definitely_broken));
    report.push_str(&format!(
        "  Missing local files    {}\n",
        summary.missing_local_files.len()
    ));
    report.push('\n');

    report.push_str(HEAVY_RULE);
    report.push_str("                            End of Report\n");
    report.push_str(HEAVY_RULE);

    report
}

pub fn generate_json_report(
    results: &[ProbeResult],
    summary: &CorpusSummary,
) -> Result<String, serde_json::Error> {
    let counts = CategoryCounts::from_results(results);

    let entries: Vec<serde_json::Value> = sorted_results(results)
        .into_iter()
        .map(|result| {
            let attempts: Vec<serde_json::Value> = result
                .attempts
                .iter()
                .map(|attempt| {
                    serde_json::json!({
                        "method": attempt.method,
                        "outcome": attempt.outcome,
                        "reason": attempt.reason,
                        "browser_headers": attempt.browser_headers,
                    })
                })
                .collect();

            serde_json::json!({
                "url": result.url,
                "category": result.category,
                "kinds": summary.link_kinds.get(&result.url),
                "referencing_documents": result.referencing_documents,
                "attempts": attempts,
            })
        })
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "linkvet",
                "version": env!("CARGO_PKG_VERSION"),
                "format": "json",
            },
            "summary": {
                "counts": counts,
                "documents_scanned": summary.documents_scanned,
                "extraction_issues": summary.extraction_issues.len(),
                "unique_links": summary.unique_links,
                "links_checked": counts.total(),
                "broken_links": counts.definitely_broken,
                "missing_local_files": summary.missing_local_files.len(),
            },
            "results": entries,
            "missing_local_files": summary.missing_local_files,
            "extraction_issues": summary.extraction_issues,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_report(
    format: ReportFormat,
    results: &[ProbeResult],
    summary: &CorpusSummary,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(results, summary)),
        ReportFormat::Json => generate_json_report(results, summary),
    }
}

pub fn save_report(content: &str, path: &Path) -> Result<(), PersistenceError> {
    write_atomic(path, content.as_bytes())
}
