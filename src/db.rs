use crate::error::CatalogError;
use crate::model::*;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase, Row};
use std::path::Path;
use tokio::sync::Mutex;

pub type Result<T> = std::result::Result<T, CatalogError>;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

const BOOK_COLUMNS: &str = "books.id, books.title, books.description, books.created_at, books.updated_at";

const AUTHOR_COLUMNS: &str =
    "authors.id, authors.first_name, authors.last_name, authors.notes, authors.created_at, authors.updated_at";

pub struct Database {
    // keeps the underlying database alive for as long as the connection is used
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(source) => Err(CatalogError::Timestamp { value, source }),
    }
}

fn row_to_book(row: &Row) -> Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_timestamp(row.get(3)?)?,
        updated_at: parse_timestamp(row.get(4)?)?,
    })
}

fn row_to_author(row: &Row) -> Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        notes: row.get(3)?,
        created_at: parse_timestamp(row.get(4)?)?,
        updated_at: parse_timestamp(row.get(5)?)?,
    })
}

impl Database {
    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        let mut rows = conn.query(query, libsql::params![name]).await?;
        Ok(rows.next().await?.is_some())
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = "INSERT INTO _migrations (name, applied_at) VALUES (?, ?)";
        conn.execute(query, libsql::params![name, format_timestamp(&now())])
            .await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql).await?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens (or creates) the catalog at `path` and brings its schema up to date.
    ///
    /// `":memory:"` gives a throwaway database, which is what the tests use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        let conn = db.connect()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").await?;

        // the bookkeeping table itself is created unconditionally
        for (_, sql) in SYSTEM_MIGRATIONS {
            conn.execute_batch(sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    pub async fn create_book(&self, input: NewBook) -> Result<Book> {
        let _guard = self.tx_lock.lock().await;

        let query = format!(
            r#"
            INSERT INTO books (title, description, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING {BOOK_COLUMNS}
        "#
        );

        let ts = format_timestamp(&now());
        let mut rows = self
            .conn
            .query(&query, libsql::params![input.title, input.description, ts.clone(), ts])
            .await?;

        match rows.next().await? {
            Some(row) => row_to_book(&row),
            None => Err(CatalogError::InsertFailed("book")),
        }
    }

    pub async fn create_author(&self, input: NewAuthor) -> Result<Author> {
        let _guard = self.tx_lock.lock().await;

        let query = format!(
            r#"
            INSERT INTO authors (first_name, last_name, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {AUTHOR_COLUMNS}
        "#
        );

        let ts = format_timestamp(&now());
        let mut rows = self
            .conn
            .query(
                &query,
                libsql::params![input.first_name, input.last_name, input.notes, ts.clone(), ts],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_author(&row),
            None => Err(CatalogError::InsertFailed("author")),
        }
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY books.id");
        let mut rows = self.conn.query(&query, ()).await?;

        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }
        Ok(books)
    }

    pub async fn list_authors(&self) -> Result<Vec<Author>> {
        let query = format!("SELECT {AUTHOR_COLUMNS} FROM authors ORDER BY authors.id");
        let mut rows = self.conn.query(&query, ()).await?;

        let mut authors = Vec::new();
        while let Some(row) = rows.next().await? {
            authors.push(row_to_author(&row)?);
        }
        Ok(authors)
    }

    pub async fn get_book(&self, id: i32) -> Result<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE books.id = ?");
        let mut rows = self.conn.query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_book(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_author(&self, id: i32) -> Result<Option<Author>> {
        let query = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE authors.id = ?");
        let mut rows = self.conn.query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_author(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn authors_of_book(&self, book_id: i32) -> Result<Vec<Author>> {
        let query = format!(
            r#"
SELECT {AUTHOR_COLUMNS}
FROM authors
JOIN books_and_authors ON books_and_authors.author_id = authors.id
WHERE books_and_authors.book_id = ?
ORDER BY authors.id
"#
        );
        let mut rows = self.conn.query(&query, libsql::params![book_id]).await?;

        let mut authors = Vec::new();
        while let Some(row) = rows.next().await? {
            authors.push(row_to_author(&row)?);
        }
        Ok(authors)
    }

    pub async fn books_of_author(&self, author_id: i32) -> Result<Vec<Book>> {
        let query = format!(
            r#"
SELECT {BOOK_COLUMNS}
FROM books
JOIN books_and_authors ON books_and_authors.book_id = books.id
WHERE books_and_authors.author_id = ?
ORDER BY books.id
"#
        );
        let mut rows = self.conn.query(&query, libsql::params![author_id]).await?;

        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }
        Ok(books)
    }

    /// Links an author to a book.
    ///
    /// Both records must exist. Linking an already linked pair changes nothing
    /// and reports [`Association::AlreadyLinked`]; a new link refreshes the
    /// `updated_at` of both sides.
    pub async fn associate(&self, link: BookAuthor) -> Result<Association> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = self.associate_internal(link).await;

        match result {
            Ok(association) => {
                self.commit_or_rollback().await?;
                Ok(association)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    // A failed COMMIT leaves the transaction open on the shared connection.
    async fn commit_or_rollback(&self) -> Result<()> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _ = self.conn.execute("ROLLBACK", ()).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn associate_internal(&self, link: BookAuthor) -> Result<Association> {
        if !self.exists("books", link.book_id).await? {
            return Err(CatalogError::BookNotFound(link.book_id));
        }
        if !self.exists("authors", link.author_id).await? {
            return Err(CatalogError::AuthorNotFound(link.author_id));
        }

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO books_and_authors (author_id, book_id) VALUES (?, ?)",
                libsql::params![link.author_id, link.book_id],
            )
            .await?;

        if inserted == 0 {
            return Ok(Association::AlreadyLinked);
        }

        let ts = format_timestamp(&now());
        self.conn
            .execute(
                "UPDATE books SET updated_at = ? WHERE id = ?",
                libsql::params![ts.clone(), link.book_id],
            )
            .await?;
        self.conn
            .execute(
                "UPDATE authors SET updated_at = ? WHERE id = ?",
                libsql::params![ts, link.author_id],
            )
            .await?;

        Ok(Association::Linked)
    }

    async fn exists(&self, table: &'static str, id: i32) -> Result<bool> {
        let query = format!("SELECT 1 FROM {table} WHERE id = ?");
        let mut rows = self.conn.query(&query, libsql::params![id]).await?;
        Ok(rows.next().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn memory_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn new_book(title: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            description: format!("about {title}"),
        }
    }

    fn new_author(first_name: &str, last_name: &str) -> NewAuthor {
        NewAuthor {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            notes: String::new(),
        }
    }

    async fn link_count(db: &Database) -> i64 {
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM books_and_authors", ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    #[tokio::test]
    async fn created_book_can_be_fetched() {
        let db = memory_db().await;
        let created = db
            .create_book(NewBook {
                title: "Dune".into(),
                description: "Spice".into(),
            })
            .await
            .unwrap();

        let fetched = db.get_book(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Dune");
        assert_eq!(fetched.description, "Spice");
        assert!(fetched.created_at <= fetched.updated_at);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn created_author_can_be_fetched() {
        let db = memory_db().await;
        let created = db
            .create_author(NewAuthor {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                notes: "first programmer".into(),
            })
            .await
            .unwrap();

        let fetched = db.get_author(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.full_name(), "Ada Lovelace");
        assert_eq!(fetched.notes, "first programmer");
        assert!(fetched.created_at <= fetched.updated_at);
    }

    #[tokio::test]
    async fn empty_fields_are_stored_as_is() {
        let db = memory_db().await;
        let book = db
            .create_book(NewBook {
                title: String::new(),
                description: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(book.title, "");
    }

    #[tokio::test]
    async fn lists_every_book_in_insertion_order() {
        let db = memory_db().await;
        for title in ["a", "b", "c", "d", "e"] {
            db.create_book(new_book(title)).await.unwrap();
        }

        let books = db.list_books().await.unwrap();
        assert_eq!(books.len(), 5);
        let ids: HashSet<i32> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids.len(), 5);
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, ["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn lists_every_author() {
        let db = memory_db().await;
        db.create_author(new_author("Ada", "Lovelace")).await.unwrap();
        db.create_author(new_author("Alan", "Turing")).await.unwrap();

        let authors = db.list_authors().await.unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[1].full_name(), "Alan Turing");
    }

    #[tokio::test]
    async fn missing_records_are_none() {
        let db = memory_db().await;
        assert!(db.get_book(42).await.unwrap().is_none());
        assert!(db.get_author(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn association_is_visible_from_both_sides() {
        let db = memory_db().await;
        let book = db.create_book(new_book("Notes on the Analytical Engine")).await.unwrap();
        let other = db.create_book(new_book("Unrelated")).await.unwrap();
        let author = db.create_author(new_author("Ada", "Lovelace")).await.unwrap();

        let outcome = db
            .associate(BookAuthor {
                author_id: author.id,
                book_id: book.id,
            })
            .await
            .unwrap();
        assert_eq!(outcome, Association::Linked);

        let books = db.books_of_author(author.id).await.unwrap();
        assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![book.id]);

        let authors = db.authors_of_book(book.id).await.unwrap();
        assert_eq!(authors.iter().map(|a| a.id).collect::<Vec<_>>(), vec![author.id]);

        assert!(db.authors_of_book(other.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn association_refreshes_updated_at() {
        let db = memory_db().await;
        let book = db.create_book(new_book("Dune")).await.unwrap();
        let author = db.create_author(new_author("Frank", "Herbert")).await.unwrap();
        let link = BookAuthor {
            author_id: author.id,
            book_id: book.id,
        };

        // timestamps have millisecond precision
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(db.associate(link).await.unwrap(), Association::Linked);

        let book_after = db.get_book(book.id).await.unwrap().unwrap();
        let author_after = db.get_author(author.id).await.unwrap().unwrap();
        assert_eq!(book_after.created_at, book.created_at);
        assert_eq!(author_after.created_at, author.created_at);
        assert!(book_after.updated_at > book.updated_at);
        assert!(author_after.updated_at > author.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(db.associate(link).await.unwrap(), Association::AlreadyLinked);

        let book_again = db.get_book(book.id).await.unwrap().unwrap();
        let author_again = db.get_author(author.id).await.unwrap().unwrap();
        assert_eq!(book_again.updated_at, book_after.updated_at);
        assert_eq!(author_again.updated_at, author_after.updated_at);
    }

    #[tokio::test]
    async fn failed_commit_does_not_leave_transaction_open() {
        let db = memory_db().await;
        let book = db.create_book(new_book("Dune")).await.unwrap();
        let author = db.create_author(new_author("Frank", "Herbert")).await.unwrap();

        // a deferred foreign key violation only surfaces at COMMIT
        db.connection()
            .execute_batch(
                "BEGIN TRANSACTION;
                 CREATE TABLE dangling (book_id INTEGER REFERENCES books(id) DEFERRABLE INITIALLY DEFERRED);
                 INSERT INTO dangling (book_id) VALUES (999);",
            )
            .await
            .unwrap();
        assert!(!db.connection().is_autocommit());

        assert!(db.commit_or_rollback().await.is_err());
        assert!(db.connection().is_autocommit());

        assert_eq!(
            db.associate(BookAuthor {
                author_id: author.id,
                book_id: book.id,
            })
            .await
            .unwrap(),
            Association::Linked
        );
    }

    #[tokio::test]
    async fn reassociation_is_idempotent() {
        let db = memory_db().await;
        let book = db.create_book(new_book("Dune")).await.unwrap();
        let author = db.create_author(new_author("Frank", "Herbert")).await.unwrap();
        let link = BookAuthor {
            author_id: author.id,
            book_id: book.id,
        };

        assert_eq!(db.associate(link).await.unwrap(), Association::Linked);
        assert_eq!(db.associate(link).await.unwrap(), Association::AlreadyLinked);
        assert_eq!(link_count(&db).await, 1);
        assert_eq!(db.books_of_author(author.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn association_with_unknown_ids_fails_without_writing() {
        let db = memory_db().await;
        let book = db.create_book(new_book("Dune")).await.unwrap();
        let author = db.create_author(new_author("Frank", "Herbert")).await.unwrap();

        let err = db
            .associate(BookAuthor {
                author_id: author.id,
                book_id: 999,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::BookNotFound(999)));

        let err = db
            .associate(BookAuthor {
                author_id: 998,
                book_id: book.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AuthorNotFound(998)));

        assert_eq!(link_count(&db).await, 0);

        // the connection is usable again once the failed transaction is rolled back
        assert_eq!(
            db.associate(BookAuthor {
                author_id: author.id,
                book_id: book.id,
            })
            .await
            .unwrap(),
            Association::Linked
        );
    }

    #[tokio::test]
    async fn many_to_many_links() {
        let db = memory_db().await;
        let first = db.create_book(new_book("First")).await.unwrap();
        let second = db.create_book(new_book("Second")).await.unwrap();
        let ada = db.create_author(new_author("Ada", "Lovelace")).await.unwrap();
        let charles = db.create_author(new_author("Charles", "Babbage")).await.unwrap();

        for (author_id, book_id) in [(ada.id, first.id), (ada.id, second.id), (charles.id, first.id)] {
            db.associate(BookAuthor { author_id, book_id }).await.unwrap();
        }

        assert_eq!(db.books_of_author(ada.id).await.unwrap().len(), 2);
        assert_eq!(db.books_of_author(charles.id).await.unwrap().len(), 1);
        let names: Vec<String> = db
            .authors_of_book(first.id)
            .await
            .unwrap()
            .iter()
            .map(Author::full_name)
            .collect();
        assert_eq!(names, ["Ada Lovelace", "Charles Babbage"]);
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let db = memory_db().await;
        for (filename, sql) in MIGRATIONS {
            Database::run_migration(db.connection(), filename, sql).await.unwrap();
        }

        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM _migrations", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = now();
        let parsed = parse_timestamp(format_timestamp(&ts)).unwrap();
        assert_eq!(parsed.timestamp_millis(), ts.timestamp_millis());
        assert!(parse_timestamp("yesterday".into()).is_err());
    }
}
