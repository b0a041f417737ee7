use std::sync::Arc;

use axum::{
    Form,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::db::Database;
use crate::error::HandlerError;
use crate::model::{Association, AuthorPage, BookAuthor, BookPage, MAX_TEXT_LEN, NewAuthor, NewBook};
use crate::views;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

type HandlerResult<T> = Result<T, HandlerError>;

// Form fields are optional here so a missing one can be reported by name
// instead of through a generic extractor rejection.
#[derive(Debug, Deserialize)]
pub struct BookForm {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssociationForm {
    pub book_id: Option<String>,
    pub author_id: Option<String>,
}

fn required(field: &'static str, value: Option<String>) -> HandlerResult<String> {
    let value = value.ok_or(HandlerError::MissingField(field))?;
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(HandlerError::FieldTooLong {
            field,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(value)
}

fn required_id(field: &'static str, value: Option<String>) -> HandlerResult<i32> {
    let value = value.ok_or(HandlerError::MissingField(field))?;
    value
        .trim()
        .parse()
        .map_err(|_| HandlerError::InvalidField { field, value })
}

fn path_id(path: Result<Path<i32>, PathRejection>) -> HandlerResult<i32> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => Err(HandlerError::InvalidField {
            field: "id",
            value: rejection.body_text(),
        }),
    }
}

impl BookForm {
    pub fn into_new_book(self) -> HandlerResult<NewBook> {
        Ok(NewBook {
            title: required("title", self.title)?,
            description: required("description", self.description)?,
        })
    }
}

impl AuthorForm {
    pub fn into_new_author(self) -> HandlerResult<NewAuthor> {
        Ok(NewAuthor {
            first_name: required("first_name", self.first_name)?,
            last_name: required("last_name", self.last_name)?,
            notes: required("notes", self.notes)?,
        })
    }
}

impl AssociationForm {
    pub fn into_link(self) -> HandlerResult<BookAuthor> {
        Ok(BookAuthor {
            book_id: required_id("book_id", self.book_id)?,
            author_id: required_id("author_id", self.author_id)?,
        })
    }
}

pub async fn list_books(State(state): State<AppState>) -> HandlerResult<Html<String>> {
    let books = state.db.list_books().await?;
    info!(count = books.len(), "got books");
    Ok(views::main_page(&books))
}

pub async fn list_authors(State(state): State<AppState>) -> HandlerResult<Html<String>> {
    let authors = state.db.list_authors().await?;
    info!(count = authors.len(), "got authors");
    Ok(views::authors_page(&authors))
}

pub async fn add_book(State(state): State<AppState>, Form(form): Form<BookForm>) -> HandlerResult<Redirect> {
    let book = state.db.create_book(form.into_new_book()?).await?;
    info!(book_id = book.id, title = %book.title, "added a new book");
    Ok(Redirect::to("/"))
}

pub async fn add_author(State(state): State<AppState>, Form(form): Form<AuthorForm>) -> HandlerResult<Redirect> {
    let author = state.db.create_author(form.into_new_author()?).await?;
    info!(author_id = author.id, name = %author.full_name(), "added a new author");
    Ok(Redirect::to("/authors"))
}

pub async fn view_book(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> HandlerResult<Html<String>> {
    let id = path_id(path)?;
    let Some(book) = state.db.get_book(id).await? else {
        return Err(HandlerError::NotFound(format!("book {id} not found")));
    };

    let page = BookPage {
        authors: state.db.authors_of_book(book.id).await?,
        all_authors: state.db.list_authors().await?,
        book,
    };
    Ok(views::book_page(&page))
}

pub async fn view_author(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> HandlerResult<Html<String>> {
    let id = path_id(path)?;
    let Some(author) = state.db.get_author(id).await? else {
        return Err(HandlerError::NotFound(format!("author {id} not found")));
    };

    let page = AuthorPage {
        books: state.db.books_of_author(author.id).await?,
        all_books: state.db.list_books().await?,
        author,
    };
    Ok(views::author_page(&page))
}

pub async fn associate(
    State(state): State<AppState>,
    Form(form): Form<AssociationForm>,
) -> HandlerResult<Redirect> {
    let link = form.into_link()?;

    match state.db.associate(link).await? {
        Association::Linked => {
            info!(author_id = link.author_id, book_id = link.book_id, "linked author to book")
        }
        Association::AlreadyLinked => {
            info!(author_id = link.author_id, book_id = link.book_id, "author already linked to book")
        }
    }

    Ok(Redirect::to("/"))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, views::error_page(StatusCode::NOT_FOUND, "page not found")).into_response()
}
