use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{NewAuthor, NewBook};

/// A book together with its authors and subjects, as fetched from
/// OpenLibrary and as written to the catalog in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub book: NewBook,
    pub authors: Vec<NewAuthor>,
    pub subjects: BTreeSet<String>,
}

impl BookRecord {
    pub fn new(book: NewBook) -> Self {
        Self {
            book,
            authors: Vec::new(),
            subjects: BTreeSet::new(),
        }
    }

    pub fn isbn(&self) -> &str {
        &self.book.isbn
    }

    pub fn with_author(mut self, author: NewAuthor) -> Self {
        self.authors.push(author);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.insert(subject.into());
        self
    }

    pub fn authors_line(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.book.title)?;
        if let Some(subtitle) = &self.book.subtitle {
            write!(f, ": {}", subtitle)?;
        }
        if !self.authors.is_empty() {
            write!(f, " by {}", self.authors_line())?;
        }
        write!(f, "\n\tisbn: {}", self.book.isbn)
    }
}
