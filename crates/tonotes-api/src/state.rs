//! Application state shared across handlers

use std::sync::Arc;
use tonotes_auth::AuthService;
use tonotes_db::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Authentication orchestrator
    pub auth: Arc<AuthService>,
    /// Store connections, absent when running on the in-memory backends
    pub db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, db: Arc<Database>) -> Self {
        Self { auth, db: Some(db) }
    }

    /// State over in-memory backends
    pub fn in_memory(auth: Arc<AuthService>) -> Self {
        Self { auth, db: None }
    }
}
