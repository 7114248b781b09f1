//! A SQLite catalog of books, authors and subjects.
//!
//! Books are found by scanning text for ISBNs, looked up on OpenLibrary and
//! written to the catalog together with their authors and subjects.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod isbn;
pub mod models;
pub mod openlibrary;

pub use db::Repository;
pub use error::{AppError, Result};
pub use isbn::Isbn;
