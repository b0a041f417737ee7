use axum::{
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;

use crate::views;

#[derive(Embed)]
#[folder = "web/static"]
pub struct Assets;

pub async fn serve_static(Path(path): Path<String>) -> Response {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], content.data.into_owned()).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            views::error_page(StatusCode::NOT_FOUND, "asset not found"),
        )
            .into_response(),
    }
}
