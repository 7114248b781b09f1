use std::path::Path;

use rusqlite::{params, OptionalExtension, Row, ToSql, Transaction};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Author, Book, BookRecord, NewAuthor, NewBook, Subject};

use super::schema::SCHEMA;

const BOOK_COLUMNS: &str = "id, isbn, url, title, subtitle, cover_url";

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub books: i64,
    pub authors: i64,
    pub subjects: i64,
    pub book_authors: i64,
    pub book_subjects: i64,
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        let repository = Self::init(conn).await?;
        tracing::info!("Opened catalog at {}", db_path.display());
        Ok(repository)
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            let _mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "temp_store", "MEMORY")?;
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Refreshes query planner statistics and closes the connection.
    pub async fn close(self) -> Result<()> {
        self.conn
            .call(|conn| {
                let _limit: i64 =
                    conn.pragma_update_and_check(None, "analysis_limit", 400, |row| row.get(0))?;
                conn.execute_batch("PRAGMA optimize;")?;
                Ok(())
            })
            .await?;
        self.conn.close().await?;
        Ok(())
    }

    // Book operations

    pub async fn insert_book(&self, book: NewBook) -> Result<i64> {
        let isbn = book.isbn.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id = insert_book_row(&tx, &book)?;
                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(|e| in_context(e, || format!("inserting book {}", isbn)))
    }

    pub async fn get_book(&self, id: i64) -> Result<Book> {
        self.query_one(
            format!("SELECT {} FROM book WHERE id = ?1", BOOK_COLUMNS),
            id,
            book_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book {}", id)))
    }

    pub async fn get_book_by_isbn(&self, isbn: &str) -> Result<Book> {
        self.query_one(
            format!("SELECT {} FROM book WHERE isbn = ?1", BOOK_COLUMNS),
            isbn.to_string(),
            book_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book with isbn {}", isbn)))
    }

    pub async fn get_book_by_url(&self, url: &str) -> Result<Book> {
        self.query_one(
            format!("SELECT {} FROM book WHERE url = ?1", BOOK_COLUMNS),
            url.to_string(),
            book_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("book with url {}", url)))
    }

    pub async fn get_all_books(&self) -> Result<Vec<Book>> {
        let books = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM book ORDER BY title, id",
                    BOOK_COLUMNS
                ))?;
                let books = stmt
                    .query_map([], book_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(books)
            })
            .await?;
        Ok(books)
    }

    pub async fn update_book(&self, id: i64, book: NewBook) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE book SET isbn = ?1, url = ?2, title = ?3, subtitle = ?4, cover_url = ?5 WHERE id = ?6",
                    params![book.isbn, book.url, book.title, book.subtitle, book.cover_url, id],
                )?;
                tx.commit()?;
                Ok(changed)
            })
            .await
            .map_err(|e| in_context(e, || format!("updating book {}", id)))?;
        expect_changed(changed, || format!("book {}", id))
    }

    pub async fn delete_book(&self, id: i64) -> Result<()> {
        self.delete_by_id("DELETE FROM book WHERE id = ?1", id, "book")
            .await
    }

    // Author operations

    pub async fn insert_author(&self, author: NewAuthor) -> Result<i64> {
        let url = author.url.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id = insert_author_row(&tx, &author)?;
                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(|e| in_context(e, || format!("inserting author {}", url)))
    }

    pub async fn get_author(&self, id: i64) -> Result<Author> {
        self.query_one(
            "SELECT id, url, name FROM author WHERE id = ?1".to_string(),
            id,
            author_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("author {}", id)))
    }

    pub async fn get_author_by_url(&self, url: &str) -> Result<Author> {
        self.query_one(
            "SELECT id, url, name FROM author WHERE url = ?1".to_string(),
            url.to_string(),
            author_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("author with url {}", url)))
    }

    pub async fn update_author(&self, id: i64, author: NewAuthor) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE author SET url = ?1, name = ?2 WHERE id = ?3",
                    params![author.url, author.name, id],
                )?;
                tx.commit()?;
                Ok(changed)
            })
            .await
            .map_err(|e| in_context(e, || format!("updating author {}", id)))?;
        expect_changed(changed, || format!("author {}", id))
    }

    pub async fn delete_author(&self, id: i64) -> Result<()> {
        self.delete_by_id("DELETE FROM author WHERE id = ?1", id, "author")
            .await
    }

    // Subject operations

    pub async fn insert_subject(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        let context = name.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id = insert_subject_row(&tx, &name)?;
                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(|e| in_context(e, || format!("inserting subject {:?}", context)))
    }

    pub async fn get_subject(&self, id: i64) -> Result<Subject> {
        self.query_one(
            "SELECT id, sub_name FROM subject WHERE id = ?1".to_string(),
            id,
            subject_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subject {}", id)))
    }

    pub async fn get_subject_by_name(&self, name: &str) -> Result<Subject> {
        self.query_one(
            "SELECT id, sub_name FROM subject WHERE sub_name = ?1".to_string(),
            name.to_string(),
            subject_from_row,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subject {:?}", name)))
    }

    pub async fn rename_subject(&self, id: i64, name: &str) -> Result<()> {
        let name = name.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE subject SET sub_name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
                tx.commit()?;
                Ok(changed)
            })
            .await
            .map_err(|e| in_context(e, || format!("renaming subject {}", id)))?;
        expect_changed(changed, || format!("subject {}", id))
    }

    pub async fn delete_subject(&self, id: i64) -> Result<()> {
        self.delete_by_id("DELETE FROM subject WHERE id = ?1", id, "subject")
            .await
    }

    // Association operations

    pub async fn link_author(&self, book_id: i64, author_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO book_author (b_id, a_id) VALUES (?1, ?2)",
                    params![book_id, author_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| {
                in_context(e, || format!("linking book {} to author {}", book_id, author_id))
            })
    }

    pub async fn unlink_author(&self, book_id: i64, author_id: i64) -> Result<()> {
        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM book_author WHERE b_id = ?1 AND a_id = ?2",
                    params![book_id, author_id],
                )?;
                Ok(removed)
            })
            .await?;
        expect_changed(removed, || format!("link of book {} to author {}", book_id, author_id))
    }

    pub async fn link_subject(&self, book_id: i64, subject_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO book_subject (b_id, s_id) VALUES (?1, ?2)",
                    params![book_id, subject_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| {
                in_context(e, || format!("linking book {} to subject {}", book_id, subject_id))
            })
    }

    pub async fn unlink_subject(&self, book_id: i64, subject_id: i64) -> Result<()> {
        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM book_subject WHERE b_id = ?1 AND s_id = ?2",
                    params![book_id, subject_id],
                )?;
                Ok(removed)
            })
            .await?;
        expect_changed(removed, || {
            format!("link of book {} to subject {}", book_id, subject_id)
        })
    }

    /// Authors of a book in the order they were linked.
    pub async fn get_book_authors(&self, book_id: i64) -> Result<Vec<Author>> {
        self.conn
            .call(move |conn| {
                if !book_exists(conn, book_id)? {
                    return Ok(None);
                }
                Ok(Some(authors_of(conn, book_id)?))
            })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {}", book_id)))
    }

    /// Subjects of a book ordered by name.
    pub async fn get_book_subjects(&self, book_id: i64) -> Result<Vec<Subject>> {
        self.conn
            .call(move |conn| {
                if !book_exists(conn, book_id)? {
                    return Ok(None);
                }
                Ok(Some(subjects_of(conn, book_id)?))
            })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {}", book_id)))
    }

    // Record operations

    /// Writes a fetched record in one transaction, reusing rows that already
    /// exist by isbn, author url and subject name. Returns the book id.
    pub async fn save_record(&self, record: BookRecord) -> Result<i64> {
        let isbn = record.book.isbn.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let book_id = match find_id(&tx, "SELECT id FROM book WHERE isbn = ?1", &record.book.isbn)? {
                    Some(id) => id,
                    None => insert_book_row(&tx, &record.book)?,
                };

                for author in &record.authors {
                    let author_id = match find_id(&tx, "SELECT id FROM author WHERE url = ?1", &author.url)? {
                        Some(id) => id,
                        None => insert_author_row(&tx, author)?,
                    };
                    tx.execute(
                        "INSERT INTO book_author (b_id, a_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                        params![book_id, author_id],
                    )?;
                }

                for subject in &record.subjects {
                    let subject_id = match find_id(&tx, "SELECT id FROM subject WHERE sub_name = ?1", subject)? {
                        Some(id) => id,
                        None => insert_subject_row(&tx, subject)?,
                    };
                    tx.execute(
                        "INSERT INTO book_subject (b_id, s_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                        params![book_id, subject_id],
                    )?;
                }

                tx.commit()?;
                Ok(book_id)
            })
            .await
            .map_err(|e| in_context(e, || format!("saving book {}", isbn)))
    }

    pub async fn load_record(&self, isbn: &str) -> Result<BookRecord> {
        let key = isbn.to_string();
        self.conn
            .call(move |conn| {
                let book = conn
                    .query_row(
                        &format!("SELECT {} FROM book WHERE isbn = ?1", BOOK_COLUMNS),
                        params![key],
                        book_from_row,
                    )
                    .optional()?;
                let Some(book) = book else {
                    return Ok(None);
                };

                let authors = authors_of(conn, book.id)?;
                let subjects = subjects_of(conn, book.id)?;

                Ok(Some(BookRecord {
                    book: book.into(),
                    authors: authors.into_iter().map(NewAuthor::from).collect(),
                    subjects: subjects.into_iter().map(|s| s.name).collect(),
                }))
            })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book with isbn {}", isbn)))
    }

    pub async fn contains_isbn(&self, isbn: &str) -> Result<bool> {
        let isbn = isbn.to_string();
        let exists = self
            .conn
            .call(move |conn| Ok(find_id(conn, "SELECT id FROM book WHERE isbn = ?1", &isbn)?.is_some()))
            .await?;
        Ok(exists)
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |table: &str| -> rusqlite::Result<i64> {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                };
                Ok(CatalogStats {
                    books: count("book")?,
                    authors: count("author")?,
                    subjects: count("subject")?,
                    book_authors: count("book_author")?,
                    book_subjects: count("book_subject")?,
                })
            })
            .await?;
        Ok(stats)
    }

    async fn query_one<T, P>(
        &self,
        sql: String,
        param: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>>
    where
        T: Send + 'static,
        P: ToSql + Send + 'static,
    {
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let row = stmt.query_row(params![param], map).optional()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    async fn delete_by_id(&self, sql: &'static str, id: i64, what: &'static str) -> Result<()> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(sql, params![id])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(|e| in_context(e, || format!("deleting {} {}", what, id)))?;
        expect_changed(removed, || format!("{} {}", what, id))
    }
}

fn insert_book_row(tx: &Transaction<'_>, book: &NewBook) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO book (isbn, url, title, subtitle, cover_url) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![book.isbn, book.url, book.title, book.subtitle, book.cover_url],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_author_row(tx: &Transaction<'_>, author: &NewAuthor) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO author (url, name) VALUES (?1, ?2)",
        params![author.url, author.name],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_subject_row(tx: &Transaction<'_>, name: &str) -> rusqlite::Result<i64> {
    tx.execute("INSERT INTO subject (sub_name) VALUES (?1)", params![name])?;
    Ok(tx.last_insert_rowid())
}

fn find_id(conn: &rusqlite::Connection, sql: &str, key: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(sql, params![key], |row| row.get(0)).optional()
}

fn book_exists(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM book WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn authors_of(conn: &rusqlite::Connection, book_id: i64) -> rusqlite::Result<Vec<Author>> {
    let mut stmt = conn.prepare(
        r#"SELECT a.id, a.url, a.name
           FROM author a
           JOIN book_author ba ON a.id = ba.a_id
           WHERE ba.b_id = ?1
           ORDER BY ba.rowid"#,
    )?;
    let authors = stmt
        .query_map(params![book_id], author_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(authors)
}

fn subjects_of(conn: &rusqlite::Connection, book_id: i64) -> rusqlite::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        r#"SELECT s.id, s.sub_name
           FROM subject s
           JOIN book_subject bs ON s.id = bs.s_id
           WHERE bs.b_id = ?1
           ORDER BY s.sub_name"#,
    )?;
    let subjects = stmt
        .query_map(params![book_id], subject_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(subjects)
}

/// Prefixes constraint failures with the write that hit them.
fn in_context(err: tokio_rusqlite::Error, what: impl FnOnce() -> String) -> AppError {
    match AppError::from(err) {
        AppError::ConstraintViolation(detail) => {
            AppError::ConstraintViolation(format!("{}: {}", what(), detail))
        }
        AppError::Reference(detail) => AppError::Reference(format!("{}: {}", what(), detail)),
        other => other,
    }
}

fn expect_changed(changed: usize, what: impl FnOnce() -> String) -> Result<()> {
    if changed == 0 {
        Err(AppError::NotFound(what()))
    } else {
        Ok(())
    }
}

fn book_from_row(row: &Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        isbn: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        subtitle: row.get(4)?,
        cover_url: row.get(5)?,
    })
}

fn author_from_row(row: &Row) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
    })
}

fn subject_from_row(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn sample_book() -> NewBook {
        NewBook::new("0-000-00000-0", "http://x/1", "T")
    }

    fn sample_author() -> NewAuthor {
        NewAuthor::new("http://x/a1", "A")
    }

    #[tokio::test]
    async fn links_an_author_once() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        let author_id = repo.insert_author(sample_author()).await.unwrap();

        assert_ok!(repo.link_author(book_id, author_id).await);
        let err = repo.link_author(book_id, author_id).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");

        let authors = repo.get_book_authors(book_id).await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].name, "A");
    }

    #[tokio::test]
    async fn duplicate_book_keys_are_rejected() {
        let repo = Repository::in_memory().await.unwrap();
        let original = sample_book().with_cover_url("http://x/c1");
        let id = repo.insert_book(original.clone()).await.unwrap();

        let same_isbn = NewBook::new("0-000-00000-0", "http://x/2", "Other");
        let same_url = NewBook::new("1-111-11111-1", "http://x/1", "Other");
        let same_cover = NewBook::new("2-222-22222-2", "http://x/3", "Other")
            .with_cover_url("http://x/c1");

        for book in [same_isbn, same_url, same_cover] {
            let err = repo.insert_book(book).await.unwrap_err();
            assert!(err.is_constraint_violation(), "{err}");
        }

        let stored = repo.get_book(id).await.unwrap();
        assert_eq!(NewBook::from(stored), original);
        assert_eq!(repo.stats().await.unwrap().books, 1);
    }

    #[tokio::test]
    async fn missing_cover_urls_do_not_collide() {
        let repo = Repository::in_memory().await.unwrap();
        assert_ok!(repo.insert_book(NewBook::new("a", "http://x/1", "One")).await);
        assert_ok!(repo.insert_book(NewBook::new("b", "http://x/2", "Two")).await);
    }

    #[tokio::test]
    async fn links_to_missing_rows_are_reference_errors() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        let author_id = repo.insert_author(sample_author()).await.unwrap();
        let subject_id = repo.insert_subject("Fiction").await.unwrap();

        let err = repo.link_author(book_id + 100, author_id).await.unwrap_err();
        assert!(err.is_reference(), "{err}");
        let err = repo.link_author(book_id, author_id + 100).await.unwrap_err();
        assert!(err.is_reference(), "{err}");
        let err = repo.link_subject(book_id, subject_id + 100).await.unwrap_err();
        assert!(err.is_reference(), "{err}");

        assert_eq!(repo.stats().await.unwrap().book_authors, 0);
    }

    #[tokio::test]
    async fn referenced_author_cannot_be_deleted() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        let author_id = repo.insert_author(sample_author()).await.unwrap();
        repo.link_author(book_id, author_id).await.unwrap();

        let err = repo.delete_author(author_id).await.unwrap_err();
        assert!(err.is_reference(), "{err}");
        assert_ok!(repo.get_author(author_id).await);

        repo.unlink_author(book_id, author_id).await.unwrap();
        assert_ok!(repo.delete_author(author_id).await);
        assert!(repo.get_author(author_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn subject_links_enforce_keys_and_references() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        let subject_id = repo.insert_subject("Fiction").await.unwrap();

        assert_ok!(repo.link_subject(book_id, subject_id).await);
        let err = repo.link_subject(book_id, subject_id).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");

        let err = repo.link_subject(book_id + 100, subject_id).await.unwrap_err();
        assert!(err.is_reference(), "{err}");

        let err = repo.delete_subject(subject_id).await.unwrap_err();
        assert!(err.is_reference(), "{err}");
        assert_ok!(repo.get_subject(subject_id).await);
        assert_eq!(repo.stats().await.unwrap().book_subjects, 1);

        repo.unlink_subject(book_id, subject_id).await.unwrap();
        assert_ok!(repo.delete_subject(subject_id).await);
    }

    #[tokio::test]
    async fn lookups_by_key_and_id() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        let author_id = repo.insert_author(sample_author()).await.unwrap();
        let subject_id = repo.insert_subject("Poetry").await.unwrap();

        assert_eq!(repo.get_book_by_isbn("0-000-00000-0").await.unwrap().id, book_id);
        assert_eq!(repo.get_book_by_url("http://x/1").await.unwrap().id, book_id);
        assert_eq!(repo.get_author_by_url("http://x/a1").await.unwrap().id, author_id);
        assert_eq!(repo.get_subject_by_name("Poetry").await.unwrap().id, subject_id);
        assert_eq!(repo.get_subject(subject_id).await.unwrap().name, "Poetry");

        assert!(repo.get_book_by_isbn("nope").await.unwrap_err().is_not_found());
        assert!(repo.get_author_by_url("nope").await.unwrap_err().is_not_found());
        assert!(repo.get_subject_by_name("nope").await.unwrap_err().is_not_found());
        assert!(repo.get_book(book_id + 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn subjects_are_listed_by_name() {
        let repo = Repository::in_memory().await.unwrap();
        let book_id = repo.insert_book(sample_book()).await.unwrap();
        for name in ["Poetry", "Art", "History"] {
            let id = repo.insert_subject(name).await.unwrap();
            repo.link_subject(book_id, id).await.unwrap();
        }

        let names: Vec<_> = repo
            .get_book_subjects(book_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["Art", "History", "Poetry"]);

        assert!(repo.get_book_subjects(book_id + 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn updates_keep_ids_and_enforce_uniqueness() {
        let repo = Repository::in_memory().await.unwrap();
        let first = repo.insert_book(sample_book()).await.unwrap();
        let second = repo
            .insert_book(NewBook::new("1-111-11111-1", "http://x/2", "Second"))
            .await
            .unwrap();

        let renamed = sample_book().with_subtitle("Revised");
        repo.update_book(first, renamed.clone()).await.unwrap();
        assert_eq!(NewBook::from(repo.get_book(first).await.unwrap()), renamed);

        let err = repo.update_book(second, sample_book()).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");

        let err = repo.update_book(second + 10, sample_book()).await.unwrap_err();
        assert!(err.is_not_found());

        let subject = repo.insert_subject("Art").await.unwrap();
        repo.insert_subject("History").await.unwrap();
        let err = repo.rename_subject(subject, "History").await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");
        assert_ok!(repo.rename_subject(subject, "Fine Art").await);

        let author = repo.insert_author(sample_author()).await.unwrap();
        repo.update_author(author, NewAuthor::new("http://x/a1", "A. Author"))
            .await
            .unwrap();
        assert_eq!(repo.get_author(author).await.unwrap().name, "A. Author");
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let repo = Repository::in_memory().await.unwrap();
        let first = repo.insert_book(sample_book()).await.unwrap();
        repo.delete_book(first).await.unwrap();
        let second = repo.insert_book(sample_book()).await.unwrap();
        assert!(second > first);

        assert!(repo.delete_book(first).await.unwrap_err().is_not_found());
        assert!(repo.unlink_subject(second, 1).await.unwrap_err().is_not_found());
    }

    fn sample_record() -> BookRecord {
        BookRecord::new(NewBook::new("9780226550275", "http://x/b", "Record"))
            .with_author(NewAuthor::new("http://x/a2", "Second"))
            .with_author(NewAuthor::new("http://x/a1", "First"))
            .with_subject("Philosophy")
            .with_subject("Ethics")
    }

    #[tokio::test]
    async fn saving_a_record_twice_creates_no_duplicates() {
        let repo = Repository::in_memory().await.unwrap();
        let first = repo.save_record(sample_record()).await.unwrap();
        let second = repo.save_record(sample_record()).await.unwrap();
        assert_eq!(first, second);

        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            CatalogStats {
                books: 1,
                authors: 2,
                subjects: 2,
                book_authors: 2,
                book_subjects: 2,
            }
        );

        let loaded = repo.load_record("9780226550275").await.unwrap();
        assert_eq!(loaded, sample_record());
    }

    #[tokio::test]
    async fn records_share_existing_authors_and_subjects() {
        let repo = Repository::in_memory().await.unwrap();
        let author_id = repo.insert_author(NewAuthor::new("http://x/a1", "First")).await.unwrap();
        repo.save_record(sample_record()).await.unwrap();

        let other = BookRecord::new(NewBook::new("9780000000002", "http://x/c", "Other"))
            .with_author(NewAuthor::new("http://x/a1", "First"))
            .with_subject("Ethics");
        let other_id = repo.save_record(other).await.unwrap();

        let authors = repo.get_book_authors(other_id).await.unwrap();
        assert_eq!(authors[0].id, author_id);
        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.authors, 2);
        assert_eq!(stats.subjects, 2);
    }

    #[tokio::test]
    async fn failed_record_save_rolls_back() {
        let repo = Repository::in_memory().await.unwrap();
        repo.insert_book(NewBook::new("1-111-11111-1", "http://x/b", "Taken"))
            .await
            .unwrap();

        // isbn is new but url collides with the existing book
        let err = assert_err!(repo.save_record(sample_record()).await);
        assert!(err.is_constraint_violation(), "{err}");

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.books, 1);
        assert_eq!(stats.authors, 0);
        assert_eq!(stats.subjects, 0);
        assert!(!repo.contains_isbn("9780226550275").await.unwrap());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let repo = Repository::in_memory().await.unwrap();
        let err = repo.load_record("9780226550275").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn catalog_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        let repo = Repository::new(&path).await.unwrap();
        repo.save_record(sample_record()).await.unwrap();
        repo.close().await.unwrap();

        let repo = Repository::new(&path).await.unwrap();
        let books = repo.get_all_books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Record");

        let err = repo.insert_author(NewAuthor::new("http://x/a1", "Dup")).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err}");
    }
}
