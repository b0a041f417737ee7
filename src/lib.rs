use axum::{
    Router,
    routing::{get, post},
};
use std::error::Error;
use tower_http::trace::TraceLayer;

use crate::handler::AppState;

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod views;

/// Builds the catalog router on top of an already opened database.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handler::list_books))
        .route("/authors", get(handler::list_authors))
        .route("/book", post(handler::add_book))
        .route("/books/:id", get(handler::view_book))
        .route("/authors/:id", get(handler::view_author))
        .route("/author", post(handler::add_author))
        .route("/authors_books", post(handler::associate))
        .route("/static/*path", get(assets::serve_static))
        .fallback(handler::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
