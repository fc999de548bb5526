//! Backend endpoint paths consumed by the session layer

/// Exchange email/password for an access + refresh token pair
pub const TOKEN: &str = "/api/token/";

/// Trade a refresh token for a new access token
pub const TOKEN_REFRESH: &str = "/api/token/refresh/";

/// Profile of the bearer
pub const CURRENT_USER: &str = "/api/auth/user/";

/// Client self-registration. Expert accounts are only created by invitation.
pub const REGISTER_CLIENT: &str = "/api/accounts/register/client/";
