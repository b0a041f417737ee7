use chrono::{DateTime, Utc};

/// Column limit shared by every text field of the catalog.
pub const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Author {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A row of the `books_and_authors` join table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookAuthor {
    pub author_id: i32,
    pub book_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Linked,
    AlreadyLinked,
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewAuthor {
    pub first_name: String,
    pub last_name: String,
    pub notes: String,
}

/// Everything the book detail view needs.
#[derive(Debug)]
pub struct BookPage {
    pub book: Book,
    pub authors: Vec<Author>,
    pub all_authors: Vec<Author>,
}

/// Everything the author detail view needs.
#[derive(Debug)]
pub struct AuthorPage {
    pub author: Author,
    pub books: Vec<Book>,
    pub all_books: Vec<Book>,
}
