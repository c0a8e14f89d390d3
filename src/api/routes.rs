//! API route definitions

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    self, BookFields, BookResponse, ErrorResponse, HealthResponse, ListResponse,
    MessageResponse,
};
use crate::config::BooksConfig;
use crate::store::DocumentStore;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshelf API",
        version = "0.1.0",
        description = "JSON CRUD endpoints for books stored in Cloud Firestore"
    ),
    tags(
        (name = "books", description = "Book management"),
        (name = "health", description = "Health checks")
    ),
    paths(
        handlers::health,
        handlers::list_books,
        handlers::get_book,
        handlers::create_book,
        handlers::update_book,
        handlers::delete_book,
    ),
    components(schemas(
        BookFields,
        ListResponse,
        BookResponse,
        MessageResponse,
        HealthResponse,
        ErrorResponse,
    ))
)]
pub struct ApiDoc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub books: Arc<BooksConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, books: BooksConfig) -> Self {
        Self {
            store,
            books: Arc::new(books),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let openapi = ApiDoc::openapi();

    // Update and delete only answer on the pinned document's path
    let pinned = format!("/api/books/{}", state.books.document_id);

    Router::new()
        // Books
        .route("/api/books", get(handlers::list_books).post(handlers::create_book))
        .route(
            "/api/books/{id}",
            get(handlers::get_book).fallback(handlers::no_route),
        )
        .route(
            &pinned,
            get(handlers::get_book)
                .put(handlers::update_book)
                .delete(handlers::delete_book)
                .fallback(handlers::no_route),
        )

        // Health
        .route("/health", get(handlers::health))

        // OpenAPI spec and Swagger UI
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", openapi))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
