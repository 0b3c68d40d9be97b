//! toNotes Authentication Core
//!
//! Everything between a credential arriving and a handler running:
//!
//! - **Password Hasher**: Argon2id digests and the password policy
//! - **Token Service**: HS256 access/refresh tokens
//! - **Revocation List**: revoked tokens kept until their natural expiry
//! - **Session Registry**: server-side sessions with a per-user cap
//! - **2FA**: TOTP enrollment and single-use recovery codes
//! - **Orchestrator**: register, login, refresh, logout and account flows
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Authentication Flow                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request → AuthMiddleware → Handler                          │
//! │                 │                                            │
//! │   bearer ───────┼──────────── session id                     │
//! │     ▼           ▼                  ▼                         │
//! │ TokenService  RevocationList  SessionRegistry ─► cache       │
//! │     └───────────┼──────────────────┘                         │
//! │                 ▼                                            │
//! │            AuthContext                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The revocation check fails open: if the key/value store is unreachable,
//! already-issued tokens keep working, while logout refuses to report success.

pub mod config;
pub mod device;
pub mod error;
pub mod janitor;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod service;
pub mod session;
pub mod session_cache;
pub mod totp;
pub mod two_factor;
pub mod types;

pub use config::AuthConfig;
pub use device::{GeoLocator, HttpGeoLocator, NoopGeoLocator};
pub use error::{AuthError, AuthResult, ErrorKind, ErrorResponse};
pub use jwt::TokenService;
pub use middleware::{AuthLayer, AuthMiddleware, RequireAuth};
pub use password::PasswordService;
pub use revocation::RevocationList;
pub use service::{AuthService, Backends};
pub use session::SessionRegistry;
pub use totp::TotpService;
pub use two_factor::TwoFactorService;
pub use types::*;
