use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::views;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("book {0} not found")]
    BookNotFound(i32),

    #[error("author {0} not found")]
    AuthorNotFound(i32),

    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("invalid timestamp {value:?}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to insert {0}")]
    InsertFailed(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} must be at most {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        use HandlerError::*;
        match self {
            MissingField(_) | InvalidField { .. } | FieldTooLong { .. } => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            Catalog(CatalogError::BookNotFound(_) | CatalogError::AuthorNotFound(_)) => StatusCode::NOT_FOUND,
            Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %crate::unpack_error(&self), "request failed");
            "something went wrong, please try again".to_string()
        } else {
            tracing::info!(status = status.as_u16(), error = %self, "request rejected");
            self.to_string()
        };

        (status, views::error_page(status, &message)).into_response()
    }
}
