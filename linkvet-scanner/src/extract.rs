//! Link extraction from a directory of HTML documents.
//!
//! The collection is read once, documents are visited in sorted order and
//! every container is ordered, so extracting an unchanged collection twice
//! yields identical output.

use crate::error::{Result, ScanError};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Path of a document relative to the collection root, `/`-separated
pub type DocumentId = String;

/// Which markup produced a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `<a href>`
    Link,
    /// `<img src>`
    Image,
    /// `<link href>`
    Resource,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Link => "LINK",
            LinkKind::Image => "IMAGE",
            LinkKind::Resource => "RESOURCE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    pub url: String,
    pub source_documents: BTreeSet<DocumentId>,
    pub kinds: BTreeSet<LinkKind>,
}

/// A relative image path that should exist on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalReference {
    pub document: DocumentId,
    pub path: String,
}

/// A document that contributed no links because it could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionIssue {
    pub document: DocumentId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub links: BTreeMap<String, LinkReference>,
    pub local_references: BTreeSet<LocalReference>,
    pub issues: Vec<ExtractionIssue>,
    pub documents_scanned: usize,
}

impl Extraction {
    /// Total link occurrences across all documents, before deduplication
    pub fn total_references(&self) -> usize {
        self.links.values().map(|l| l.source_documents.len()).sum()
    }
}

/// Read-only view of the HTML files under a directory
#[derive(Debug, Clone)]
pub struct DocumentCollection {
    root: PathBuf,
    documents: Vec<PathBuf>,
    strict_markup: bool,
}

impl DocumentCollection {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root).map_err(|source| ScanError::CollectionUnreadable {
            path: root.clone(),
            source,
        })?;

        if !metadata.is_dir() {
            return Err(ScanError::CollectionUnreadable {
                path: root,
                source: std::io::Error::other("not a directory"),
            });
        }

        let mut documents = Vec::new();
        collect_documents(&root, &root, &mut documents)?;
        documents.sort();

        info!("Found {} HTML document(s) under {}", documents.len(), root.display());

        Ok(Self {
            root,
            documents,
            strict_markup: false,
        })
    }

    /// Treat any HTML parse error as a malformed document
    pub fn with_strict_markup(mut self, strict: bool) -> Self {
        self.strict_markup = strict;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.documents.iter().map(|p| document_id(p))
    }
}

fn collect_documents(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| ScanError::CollectionUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_documents(root, &path, out)?;
        } else if is_html_file(&path) {
            // strip_prefix cannot fail: every path is built from `root`
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }

    Ok(())
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

fn document_id(relative: &Path) -> DocumentId {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Links found in a single document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentLinks {
    pub remote: Vec<(LinkKind, String)>,
    pub local_images: Vec<String>,
}

/// Extract every HTTP(S) link from every document in the collection.
pub fn extract(collection: &DocumentCollection) -> Extraction {
    let mut extraction = Extraction::default();

    for relative in &collection.documents {
        let id = document_id(relative);
        extraction.documents_scanned += 1;

        let parsed = fs::read(collection.root.join(relative))
            .map_err(|e| format!("unreadable: {}", e))
            .and_then(|bytes| {
                String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {}", e))
            })
            .and_then(|html| extract_document(&html, collection.strict_markup));

        let links = match parsed {
            Ok(links) => links,
            Err(reason) => {
                warn!("Skipping malformed document {}: {}", id, reason);
                extraction.issues.push(ExtractionIssue { document: id, reason });
                continue;
            }
        };

        debug!(
            "{} remote link(s), {} local image(s) in {}",
            links.remote.len(),
            links.local_images.len(),
            id
        );

        for (kind, url) in links.remote {
            let reference = extraction
                .links
                .entry(url.clone())
                .or_insert_with(|| LinkReference {
                    url,
                    source_documents: BTreeSet::new(),
                    kinds: BTreeSet::new(),
                });
            reference.source_documents.insert(id.clone());
            reference.kinds.insert(kind);
        }

        for path in links.local_images {
            extraction.local_references.insert(LocalReference {
                document: id.clone(),
                path,
            });
        }
    }

    info!(
        "Extracted {} unique link(s) from {} document(s) ({} skipped)",
        extraction.links.len(),
        extraction.documents_scanned,
        extraction.issues.len()
    );

    extraction
}

/// Extract links from one HTML string.
///
/// Returns `Err` with a reason when the document counts as malformed; with
/// `strict` set, any parse error reported by the HTML parser qualifies.
pub fn extract_document(html: &str, strict: bool) -> std::result::Result<DocumentLinks, String> {
    let document = Html::parse_document(html);

    if strict && let Some(first) = document.errors.first() {
        return Err(format!(
            "{} markup error(s), first: {}",
            document.errors.len(),
            first
        ));
    }

    let anchor = Selector::parse("a[href]").expect("static selector");
    let image = Selector::parse("img[src]").expect("static selector");
    let resource = Selector::parse("link[href]").expect("static selector");

    let mut links = DocumentLinks::default();

    for element in document.select(&anchor) {
        if let Some(href) = element.value().attr("href")
            && let Some(url) = remote_url(href)
        {
            links.remote.push((LinkKind::Link, url));
        }
    }

    for element in document.select(&image) {
        if let Some(src) = element.value().attr("src") {
            if let Some(url) = remote_url(src) {
                links.remote.push((LinkKind::Image, url));
            } else if let Some(path) = local_path(src) {
                links.local_images.push(path);
            }
        }
    }

    for element in document.select(&resource) {
        if let Some(href) = element.value().attr("href")
            && let Some(url) = remote_url(href)
        {
            links.remote.push((LinkKind::Resource, url));
        }
    }

    Ok(links)
}

fn remote_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_http_url(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// True when the string starts with an `http://` or `https://` scheme
pub fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.get(..8).unwrap_or(candidate).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("//")
        || Url::parse(trimmed).is_ok()
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// Return the local references whose file exists neither next to the
/// referencing document, nor under the collection root, nor under its parent.
pub fn check_local_references<'a>(
    references: impl IntoIterator<Item = &'a LocalReference>,
    root: &Path,
) -> Vec<LocalReference> {
    let mut missing = Vec::new();

    for reference in references {
        let path = reference
            .path
            .split(['?', '#'])
            .next()
            .unwrap_or(&reference.path)
            .trim_start_matches('/');

        let document_dir = root
            .join(&reference.document)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());

        let mut candidates = vec![document_dir.join(path), root.join(path)];
        if let Some(parent) = root.parent() {
            candidates.push(parent.join(path));
        }

        if !candidates.iter().any(|c| c.exists()) {
            debug!("Missing local file {} referenced by {}", reference.path, reference.document);
            missing.push(reference.clone());
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("http://example.com"));
        assert!(is_http_url("HTTPS://example.com/a"));
        assert!(!is_http_url("httpfoo://example.com"));
        assert!(!is_http_url("mailto:someone@example.com"));
        assert!(!is_http_url("/relative/path"));
        assert!(!is_http_url("ftp://example.com"));
    }

    #[test]
    fn test_extract_document_kinds() {
        let html = r##"<html><head>
            <link rel="stylesheet" href="https://cdn.example.com/style.css">
            <link rel="icon" href="/favicon.ico">
        </head><body>
            <a href=" https://example.com/page ">Page</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="#top">Top</a>
            <img src="http://img.example.com/a.png">
            <img src="images/local.png">
            <img src="data:image/png;base64,AAAA">
        </body></html>"##;

        let links = extract_document(html, false).unwrap();
        assert_eq!(
            links.remote,
            vec![
                (LinkKind::Link, "https://example.com/page".to_string()),
                (LinkKind::Image, "http://img.example.com/a.png".to_string()),
                (LinkKind::Resource, "https://cdn.example.com/style.css".to_string()),
            ]
        );
        assert_eq!(links.local_images, vec!["images/local.png".to_string()]);
    }

    #[test]
    fn test_strict_markup_rejects_parse_errors() {
        let html = "<!DOCTYPE html><html><body><a href=\"https://example.com\">x</b></body></html>";
        assert!(extract_document(html, false).is_ok());
        assert!(extract_document(html, true).is_err());
    }

    #[test]
    fn test_strict_markup_accepts_well_formed_document() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head>\
                    <body><a href=\"https://example.com\">x</a></body></html>";
        let links = extract_document(html, true).unwrap();
        assert_eq!(links.remote, vec![(LinkKind::Link, "https://example.com".to_string())]);
    }

    #[test]
    fn test_local_path_skips_absolute_and_fragments() {
        assert_eq!(local_path("img/a.png"), Some("img/a.png".to_string()));
        assert_eq!(local_path("#frag"), None);
        assert_eq!(local_path("//cdn.example.com/a.png"), None);
        assert_eq!(local_path("data:image/png;base64,AAAA"), None);
        assert_eq!(local_path(""), None);
    }
}
