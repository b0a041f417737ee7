//! Server-side HTML views.
//!
//! Every view is a plain function from a data bundle to [`Html`]. Handlers pick
//! the view; nothing here touches the database.

use std::fmt::Write;

use axum::{http::StatusCode, response::Html};

use crate::model::{Author, AuthorPage, Book, BookPage};

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html>
    <head>
        <meta charset="utf-8">
        <title>{title}</title>
        <link rel="stylesheet" href="/static/style.css">
    </head>
    <body>
        <nav><a href="/">Books</a><a href="/authors">Authors</a></nav>
        <h1>{title}</h1>
{body}
    </body>
</html>
"#,
        title = escape(title),
    ))
}

fn book_rows(books: &[Book]) -> String {
    let mut rows = String::new();
    for book in books {
        let _ = writeln!(
            rows,
            r#"            <tr><td><a href="/books/{id}">{title}</a></td><td>{description}</td></tr>"#,
            id = book.id,
            title = escape(&book.title),
            description = escape(&book.description),
        );
    }
    rows
}

fn author_rows(authors: &[Author]) -> String {
    let mut rows = String::new();
    for author in authors {
        let _ = writeln!(
            rows,
            r#"            <tr><td><a href="/authors/{id}">{name}</a></td><td>{notes}</td></tr>"#,
            id = author.id,
            name = escape(&author.full_name()),
            notes = escape(&author.notes),
        );
    }
    rows
}

fn list(items: &[(i32, String, &str)]) -> String {
    if items.is_empty() {
        return "        <p>None yet.</p>\n".to_string();
    }
    let mut out = String::from("        <ul>\n");
    for (id, label, prefix) in items {
        let _ = writeln!(out, r#"            <li><a href="/{prefix}/{id}">{}</a></li>"#, escape(label));
    }
    out.push_str("        </ul>\n");
    out
}

fn options(items: &[(i32, String)]) -> String {
    let mut out = String::new();
    for (id, label) in items {
        let _ = writeln!(out, r#"                <option value="{id}">{}</option>"#, escape(label));
    }
    out
}

/// `main`: every book plus the add-book form.
pub fn main_page(books: &[Book]) -> Html<String> {
    let body = format!(
        r#"        <table>
            <tr><th>Title</th><th>Description</th></tr>
{rows}        </table>
        <h2>Add a book</h2>
        <form action="/book" method="post">
            <label>Title <input type="text" name="title" maxlength="255"></label>
            <label>Description <input type="text" name="description" maxlength="255"></label>
            <input type="submit" value="Add">
        </form>
"#,
        rows = book_rows(books),
    );
    layout("Books", &body)
}

/// `authors`: every author plus the add-author form.
pub fn authors_page(authors: &[Author]) -> Html<String> {
    let body = format!(
        r#"        <table>
            <tr><th>Name</th><th>Notes</th></tr>
{rows}        </table>
        <h2>Add an author</h2>
        <form action="/author" method="post">
            <label>First name <input type="text" name="first_name" maxlength="255"></label>
            <label>Last name <input type="text" name="last_name" maxlength="255"></label>
            <label>Notes <textarea name="notes" maxlength="255"></textarea></label>
            <input type="submit" value="Add">
        </form>
"#,
        rows = author_rows(authors),
    );
    layout("Authors", &body)
}

/// `book`: one book, its authors and a form to add another author.
pub fn book_page(page: &BookPage) -> Html<String> {
    let authors: Vec<(i32, String, &str)> = page
        .authors
        .iter()
        .map(|a| (a.id, a.full_name(), "authors"))
        .collect();
    let choices: Vec<(i32, String)> = page.all_authors.iter().map(|a| (a.id, a.full_name())).collect();

    let body = format!(
        r#"        <p>{description}</p>
        <h2>Authors</h2>
{authors}        <form action="/authors_books" method="post">
            <input type="hidden" name="book_id" value="{id}">
            <select name="author_id">
{choices}            </select>
            <input type="submit" value="Add author">
        </form>
"#,
        description = escape(&page.book.description),
        authors = list(&authors),
        id = page.book.id,
        choices = options(&choices),
    );
    layout(&page.book.title, &body)
}

/// `author`: one author, their books and a form to add another book.
pub fn author_page(page: &AuthorPage) -> Html<String> {
    let books: Vec<(i32, String, &str)> = page
        .books
        .iter()
        .map(|b| (b.id, b.title.clone(), "books"))
        .collect();
    let choices: Vec<(i32, String)> = page.all_books.iter().map(|b| (b.id, b.title.clone())).collect();

    let body = format!(
        r#"        <p>{notes}</p>
        <h2>Books</h2>
{books}        <form action="/authors_books" method="post">
            <input type="hidden" name="author_id" value="{id}">
            <select name="book_id">
{choices}            </select>
            <input type="submit" value="Add book">
        </form>
"#,
        notes = escape(&page.author.notes),
        books = list(&books),
        id = page.author.id,
        choices = options(&choices),
    );
    layout(&page.author.full_name(), &body)
}

pub fn error_page(status: StatusCode, message: &str) -> Html<String> {
    let body = format!(r#"        <p class="error">{}</p>"#, escape(message));
    layout(status.canonical_reason().unwrap_or("Error"), &body)
}
