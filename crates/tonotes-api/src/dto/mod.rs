//! Data Transfer Objects
//!
//! Request and response types for API endpoints.

pub mod auth;
pub mod session;
pub mod two_factor;
pub mod user;

pub use auth::*;
pub use session::*;
pub use two_factor::*;
pub use user::*;

use serde::Serialize;

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
