use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::isbn::{find_isbns, Isbn};
use crate::models::BookRecord;
use crate::openlibrary::OpenLibraryClient;

/// Where book records come from when an ISBN is not yet cataloged.
pub trait BookSource {
    fn fetch(&self, isbn: &Isbn) -> impl Future<Output = Result<BookRecord>>;
}

impl BookSource for OpenLibraryClient {
    fn fetch(&self, isbn: &Isbn) -> impl Future<Output = Result<BookRecord>> {
        self.fetch_book(isbn)
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Saved { book_id: i64, record: BookRecord },
    AlreadyCataloged,
    AlreadySeen,
}

/// Result of ingesting one ISBN found while scanning.
#[derive(Debug)]
pub struct IngestReport {
    pub isbn: Isbn,
    pub outcome: Result<IngestOutcome>,
}

pub struct Ingestor<'a, S> {
    repository: &'a Repository,
    source: S,
    seen: HashSet<Isbn>,
    max_concurrent: usize,
}

impl<'a, S: BookSource> Ingestor<'a, S> {
    pub fn new(repository: &'a Repository, source: S, max_concurrent: usize) -> Self {
        Self {
            repository,
            source,
            seen: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// ISBNs handled so far in this session are skipped without a lookup.
    /// Failures are forgotten so a later scan retries them.
    pub async fn ingest(&mut self, isbn: &Isbn) -> Result<IngestOutcome> {
        if !self.mark_seen(isbn) {
            tracing::debug!("Skipping {}: already handled", isbn);
            return Ok(IngestOutcome::AlreadySeen);
        }

        let outcome = self.ingest_unseen(isbn).await;
        if outcome.is_err() {
            self.forget(isbn);
        }
        outcome
    }

    async fn ingest_unseen(&self, isbn: &Isbn) -> Result<IngestOutcome> {
        if self.is_cataloged(isbn).await? {
            tracing::debug!("Skipping {}: already cataloged", isbn);
            return Ok(IngestOutcome::AlreadyCataloged);
        }

        let record = self.source.fetch(isbn).await?;
        self.save(record).await
    }

    pub async fn scan_text(&mut self, text: &str) -> Vec<IngestReport> {
        let mut reports = Vec::new();
        for isbn in find_isbns(text) {
            let outcome = self.ingest(&isbn).await;
            if let Err(e) = &outcome {
                tracing::warn!("Failed to ingest {}: {}", isbn, e);
            }
            reports.push(IngestReport { isbn, outcome });
        }
        reports
    }

    /// Fetch every unknown ISBN concurrently, then save the records one by one.
    pub async fn ingest_all(&mut self, isbns: Vec<Isbn>) -> Vec<IngestReport> {
        let mut reports = Vec::new();
        let mut pending = Vec::new();

        for isbn in isbns {
            if !self.mark_seen(&isbn) {
                reports.push(IngestReport { isbn, outcome: Ok(IngestOutcome::AlreadySeen) });
                continue;
            }
            match self.is_cataloged(&isbn).await {
                Ok(true) => reports.push(IngestReport {
                    isbn,
                    outcome: Ok(IngestOutcome::AlreadyCataloged),
                }),
                Ok(false) => pending.push(isbn),
                Err(e) => {
                    self.forget(&isbn);
                    reports.push(IngestReport { isbn, outcome: Err(e) });
                }
            }
        }

        let source = &self.source;
        let fetched: Vec<(Isbn, Result<BookRecord>)> = stream::iter(pending)
            .map(|isbn| async move {
                let record = source.fetch(&isbn).await;
                (isbn, record)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (isbn, record) in fetched {
            let outcome = match record {
                Ok(record) => self.save(record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                tracing::warn!("Failed to ingest {}: {}", isbn, e);
                self.forget(&isbn);
            }
            reports.push(IngestReport { isbn, outcome });
        }

        reports
    }

    /// Returns false when this book, in either notation, was already seen.
    fn mark_seen(&mut self, isbn: &Isbn) -> bool {
        self.seen.insert(isbn.to_isbn13())
    }

    fn forget(&mut self, isbn: &Isbn) {
        self.seen.remove(&isbn.to_isbn13());
    }

    async fn is_cataloged(&self, isbn: &Isbn) -> Result<bool> {
        for form in isbn.forms() {
            if self.repository.contains_isbn(form.canonical()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn save(&self, record: BookRecord) -> Result<IngestOutcome> {
        let book_id = self.repository.save_record(record.clone()).await?;
        tracing::info!("Saved book {}: {}", book_id, record);
        Ok(IngestOutcome::Saved { book_id, record })
    }
}

impl IngestReport {
    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, Ok(IngestOutcome::Saved { .. }))
    }

    pub fn error(&self) -> Option<&AppError> {
        self.outcome.as_ref().err()
    }
}
