//! Authentication, session lifecycle and role-based access control

pub mod access;
pub mod jwt;
pub mod models;
pub mod session;
pub mod storage;

pub use access::{AccessController, Decision, RoleRoutes};
pub use jwt::{peek_claims, Claims};
pub use models::{AuthError, ClientKind, CompanySize, Credentials, RegisterData, Role, User};
pub use session::{Navigation, SessionManager, SessionOptions, SessionSnapshot};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
