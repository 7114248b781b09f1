use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::isbn::Isbn;
use crate::models::{BookRecord, NewAuthor, NewBook};

pub const OPENLIBRARY_URL: &str = "https://openlibrary.org";

#[derive(Debug, Deserialize)]
struct OlBook {
    url: String,
    title: String,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<OlAuthor>,
    #[serde(default)]
    subjects: Vec<OlSubject>,
    cover: Option<OlCover>,
}

#[derive(Debug, Deserialize)]
struct OlAuthor {
    url: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OlSubject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OlCover {
    large: Option<String>,
}

pub struct OpenLibraryClient {
    client: Client,
    base_url: Url,
}

impl OpenLibraryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid OpenLibrary URL {}: {}", base_url, e)))?;
        // joins resolve against the last path segment only when it ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("ol-catalog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn books_url(&self, isbn: &Isbn) -> Result<Url> {
        let mut url = self
            .base_url
            .join("api/books")
            .map_err(|e| AppError::Config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("bibkeys", &bibkey(isbn))
            .append_pair("format", "json")
            .append_pair("jscmd", "data");
        Ok(url)
    }

    /// Fetch a book by ISBN from the OpenLibrary books API
    pub async fn fetch_book(&self, isbn: &Isbn) -> Result<BookRecord> {
        let url = self.books_url(isbn)?;
        tracing::debug!("Requesting {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::OpenLibrary(format!("HTTP {}: {}", status, error_text)));
        }

        let body = response.text().await?;
        parse_books_response(isbn, &body)
    }
}

fn bibkey(isbn: &Isbn) -> String {
    format!("ISBN:{}", isbn.canonical())
}

/// Turns a `jscmd=data` response into a record. The response maps each
/// requested bibkey to its book; an unknown ISBN yields an empty object.
pub fn parse_books_response(isbn: &Isbn, body: &str) -> Result<BookRecord> {
    let mut books: HashMap<String, OlBook> = serde_json::from_str(body)?;
    let book = books
        .remove(&bibkey(isbn))
        .ok_or_else(|| AppError::NotFound(format!("OpenLibrary has no book for ISBN {}", isbn)))?;

    Ok(BookRecord {
        book: NewBook {
            isbn: isbn.canonical().to_string(),
            url: book.url,
            title: book.title,
            subtitle: book.subtitle,
            cover_url: book.cover.and_then(|c| c.large),
        },
        authors: book
            .authors
            .into_iter()
            .map(|a| NewAuthor::new(a.url, a.name))
            .collect(),
        subjects: book.subjects.into_iter().map(|s| s.name).collect(),
    })
}
