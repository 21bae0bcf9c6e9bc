//! Book metadata extraction.
//!
//! Pure text functions plus a best-effort reader. Nothing here fails: a book
//! without recognisable metadata simply has no title or author.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes scanned from the start of a book.
pub const SCAN_LIMIT: u64 = 64 * 1024;

/// Title and author, when found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

impl BookMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none()
    }
}

/// Text of the first non-empty `<tag ...>value</tag>` element.
///
/// Attributes on the opening tag are ignored, nested markup is stripped and
/// the five predefined XML entities are unescaped.
pub fn extract_tag(blob: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut rest = blob;

    while let Some(start) = rest.find(&open) {
        let after_name = &rest[start + open.len()..];

        // `<dc:title>` or `<dc:title id="x">`, not `<dc:titles>`
        let at_boundary = after_name
            .chars()
            .next()
            .map_or(false, |c| c == '>' || c == '/' || c.is_whitespace());
        if !at_boundary {
            rest = after_name;
            continue;
        }

        let tag_end = after_name.find('>')?;
        if after_name[..tag_end].ends_with('/') {
            rest = &after_name[tag_end + 1..];
            continue;
        }

        let body = &after_name[tag_end + 1..];
        let end = body.find(&close)?;
        let text = unescape(&strip_markup(&body[..end]));
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
        rest = &body[end + close.len()..];
    }
    None
}

/// Value of the first `Key: value` line, key matched case-insensitively.
pub fn extract_header(blob: &str, key: &str) -> Option<String> {
    blob.lines().find_map(|line| {
        let (name, value) = line.trim_start().split_once(':')?;
        if !name.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn unescape(text: &str) -> String {
    // `&amp;` last so "&amp;lt;" stays "&lt;"
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Metadata from an OPF package document.
pub fn from_opf(blob: &str) -> BookMetadata {
    BookMetadata {
        title: extract_tag(blob, "dc:title").or_else(|| extract_tag(blob, "title")),
        author: extract_tag(blob, "dc:creator").or_else(|| extract_tag(blob, "creator")),
    }
}

/// Metadata from plain-text headers (`Title:` / `Author:`).
pub fn from_text_headers(blob: &str) -> BookMetadata {
    BookMetadata {
        title: extract_header(blob, "Title"),
        author: extract_header(blob, "Author"),
    }
}

fn read_prefix(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.take(SCAN_LIMIT).read_to_end(&mut bytes).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Best-effort metadata for a book file.
///
/// A sidecar `<stem>.opf` next to the book wins. Otherwise the first
/// [`SCAN_LIMIT`] bytes are scanned: `.epub` for Dublin Core elements (only
/// visible when the package document is stored uncompressed) and `.txt` for
/// header lines.
pub fn read_book_metadata(path: &Path) -> BookMetadata {
    let sidecar = path.with_extension("opf");
    if sidecar != path && sidecar.is_file() {
        if let Some(blob) = read_prefix(&sidecar) {
            let meta = from_opf(&blob);
            if !meta.is_empty() {
                return meta;
            }
        }
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("epub") => read_prefix(path).map(|b| from_opf(&b)).unwrap_or_default(),
        Some("txt") => read_prefix(path)
            .map(|b| from_text_headers(&b))
            .unwrap_or_default(),
        _ => BookMetadata::default(),
    }
}
