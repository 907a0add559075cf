//! REST API client for the Eclipse backend.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthRequest, AuthResponse};
pub use error::ApiError;
