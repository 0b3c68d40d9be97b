//! Session DTOs

use chrono::{DateTime, Utc};
use serde::Serialize;
use tonotes_db::{DeviceInfo, Session};
use uuid::Uuid;

/// A session as shown to its owner
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub device: DeviceInfo,
    pub ip: String,
    pub location: String,
    pub active: bool,
    /// True for the session making the request
    pub current: bool,
}

impl SessionView {
    pub fn new(session: Session, current_id: Uuid) -> Self {
        Self {
            current: session.id == current_id,
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            last_activity_at: session.last_activity_at,
            device: session.device,
            ip: session.ip,
            location: session.location,
            active: session.active,
        }
    }
}

/// Active sessions of the caller
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
    pub count: usize,
}

/// Result of ending every session
#[derive(Debug, Clone, Serialize)]
pub struct LogoutAllResponse {
    pub message: String,
    pub sessions_ended: u64,
}
