//! Mai-Guru - session and access layer for the marketplace client
//!
//! This is the library interface: the session manager that owns the
//! client's credentials and the access controller that guards navigation
//! by role.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;

pub use auth::{AccessController, Decision, Role, SessionManager, SessionSnapshot, User};
pub use config::Config;
pub use error::Error;
