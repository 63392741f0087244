//! Authentication module for the ledger server
//!
//! Password hashing, token pair issuance, the session store and the request
//! guard that ties a bearer token to a live session.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod service;
pub mod session;
pub mod token;

pub use middleware::require_session;
pub use password::PasswordHasher;
pub use service::{AccessDetails, AuthService};
pub use session::{MemorySessionStore, RedisSessionStore, SessionStore};
pub use token::{Claims, TokenIssuer, TokenPair};
