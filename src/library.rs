//! Book listing for a mounted volume.

use crate::metadata::read_book_metadata;
use log::debug;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Extensions listed as books (matched case-insensitively).
pub const BOOK_EXTENSIONS: [&str; 4] = ["epub", "mobi", "pdf", "txt"];

/// One listed book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// True when `name` has a book extension.
pub fn is_book(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| {
            BOOK_EXTENSIONS.iter().any(|b| b.eq_ignore_ascii_case(e))
        })
}

/// Regular files with book extensions directly under `root`, sorted by name.
pub fn list_books(root: &Path) -> io::Result<Vec<BookEntry>> {
    let mut books = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            debug!("Skipping non-UTF-8 name in {:?}", root);
            continue;
        };
        if !is_book(&name) {
            continue;
        }

        let meta = read_book_metadata(&entry.path());
        books.push(BookEntry {
            name,
            title: meta.title,
            author: meta.author,
        });
    }

    books.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(books)
}
