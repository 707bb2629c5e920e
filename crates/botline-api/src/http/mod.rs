//! Administrative HTTP/REST API for botline.
//!
//! Axum-based REST API at `/api/v1/` with the envelope response format and
//! CORS support. It is a thin surface over the session manager.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
