//! API request handlers

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::routes::AppState;
use crate::store::WriteMode;
use crate::types::{created_view, stamp_created, Record};

// Request bodies

/// Any JSON object; every field is stored as given
#[derive(Debug, Deserialize, ToSchema)]
#[schema(value_type = Object)]
pub struct BookFields(pub Record);

// Response types

#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    /// Every document in the books collection
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Record>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookResponse {
    /// Outcome description
    pub message: String,
    /// The book as written
    #[schema(value_type = Object)]
    pub data: Record,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    /// Outcome description
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// API version
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, err: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Parse a request body as a JSON object, whatever its content type
fn parse_record(body: &[u8]) -> Result<Record, ApiError> {
    serde_json::from_slice::<BookFields>(body)
        .map(|fields| fields.0)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

// Handlers

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// List every book.
///
/// A read fault part way through ends the listing; whatever was read before
/// it is still returned.
#[utoipa::path(
    get,
    path = "/api/books",
    responses(
        (status = 200, description = "All books", body = ListResponse)
    ),
    tag = "books"
)]
pub async fn list_books(State(state): State<AppState>) -> Json<ListResponse> {
    let collection = &state.books.collection;
    let mut docs = state.store.list(collection);
    let mut data = Vec::new();

    while let Some(doc) = docs.next().await {
        match doc {
            Ok(doc) => data.push(doc),
            Err(e) => {
                tracing::warn!("Listing {} stopped after {} documents: {}", collection, data.len(), e);
                break;
            }
        }
    }

    Json(ListResponse { data })
}

/// Look up a single book. Always reports not found.
#[utoipa::path(
    get,
    path = "/api/books/{id}",
    params(
        ("id" = String, Path, description = "Book identifier (unused)")
    ),
    responses(
        (status = 404, description = "Book not found", body = MessageResponse)
    ),
    tag = "books"
)]
pub async fn get_book() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            message: "Book not found".into(),
        }),
    )
}

/// Plain-text 404 for methods a book path does not serve
pub async fn no_route() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found")
}

/// Create the book, replacing whatever was stored before
#[utoipa::path(
    post,
    path = "/api/books",
    request_body = BookFields,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Body is not a JSON object", body = ErrorResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    ),
    tag = "books"
)]
pub async fn create_book(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    let mut book = parse_record(&body)?;
    stamp_created(&mut book);

    let data = created_view(&book);
    state
        .store
        .set(
            &state.books.collection,
            &state.books.document_id,
            book,
            WriteMode::Overwrite,
        )
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    tracing::info!("Created book {}/{}", state.books.collection, state.books.document_id);

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            message: "Book created successfully".into(),
            data,
        }),
    ))
}

/// Merge fields into the book and return the stored result
#[utoipa::path(
    put,
    path = "/api/books/2",
    request_body(content = BookFields, description = "Fields to overwrite"),
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Body is not a JSON object", body = ErrorResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    ),
    tag = "books"
)]
pub async fn update_book(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BookResponse>, ApiError> {
    let patch = parse_record(&body)?;
    let (collection, id) = (&state.books.collection, &state.books.document_id);

    state
        .store
        .set(collection, id, patch, WriteMode::Merge)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let data = state
        .store
        .get(collection, id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(BookResponse {
        message: "Book updated successfully".into(),
        data,
    }))
}

/// Delete the book from the delete collection
#[utoipa::path(
    delete,
    path = "/api/books/2",
    responses(
        (status = 200, description = "Delete issued", body = MessageResponse),
        (status = 500, description = "Store error", body = ErrorResponse)
    ),
    tag = "books"
)]
pub async fn delete_book(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    state
        .store
        .delete(&state.books.delete_collection, &state.books.document_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(MessageResponse {
        message: "Book deleted successfully".into(),
    }))
}
