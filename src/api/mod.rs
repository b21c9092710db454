//! API Module
//!
//! HTTP handlers and routing exposing a JSON-valued cache over REST.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /flush` - Remove every entry
//! - `POST /gc` - Remove expired entries now
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
