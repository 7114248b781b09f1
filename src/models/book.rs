use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub isbn: String,
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub cover_url: Option<String>,
}

/// Column values for inserting or replacing a book row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub isbn: String,
    pub url: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub cover_url: Option<String>,
}

impl NewBook {
    pub fn new(isbn: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            url: url.into(),
            title: title.into(),
            subtitle: None,
            cover_url: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }
}

impl From<Book> for NewBook {
    fn from(book: Book) -> Self {
        Self {
            isbn: book.isbn,
            url: book.url,
            title: book.title,
            subtitle: book.subtitle,
            cover_url: book.cover_url,
        }
    }
}
