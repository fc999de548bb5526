//! Authentication models

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Student or organization posting work
    Client,
    /// Invited expert delivering work
    Expert,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Client, Role::Expert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Expert => "expert",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            "expert" => Ok(Role::Expert),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Profile of the logged-in user, as returned by the backend.
///
/// Replaced wholesale on login or bootstrap; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(alias = "firstName", default)]
    pub first_name: String,
    #[serde(alias = "lastName", default)]
    pub last_name: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// A failed login or registration, attributed to a form field when the
/// backend names one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AuthError {
    pub const UNEXPECTED: &'static str = "An unexpected error occurred";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn unexpected() -> Self {
        Self::new(Self::UNEXPECTED)
    }

    /// Build an error from a backend error body.
    ///
    /// Understands `{"detail": .., "field": ..}` and the field-keyed map
    /// `{"email": ["Enter a valid email address."]}`. Anything else yields
    /// `fallback`.
    pub fn from_body(body: &serde_json::Value, fallback: &str) -> Self {
        let Some(object) = body.as_object() else {
            return Self::new(fallback);
        };

        if let Some(detail) = object.get("detail").and_then(first_message) {
            let field = object
                .get("field")
                .and_then(|f| f.as_str())
                .map(str::to_string);
            return Self {
                message: detail,
                field,
            };
        }

        for (key, value) in object {
            if let Some(message) = first_message(value) {
                return if key == "non_field_errors" {
                    Self::new(message)
                } else {
                    Self::for_field(key.clone(), message)
                };
            }
        }

        Self::new(fallback)
    }
}

fn first_message(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

/// Access and refresh token held for the current session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Login credentials
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Token pair returned by the token and registration endpoints
#[derive(Debug, Deserialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Organization head-count bands accepted by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanySize {
    #[serde(rename = "1-50")]
    Small,
    #[serde(rename = "51-100")]
    Medium,
    #[serde(rename = "101-500")]
    Large,
    #[serde(rename = "500+")]
    Enterprise,
}

impl FromStr for CompanySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1-50" => Ok(CompanySize::Small),
            "51-100" => Ok(CompanySize::Medium),
            "101-500" => Ok(CompanySize::Large),
            "500+" => Ok(CompanySize::Enterprise),
            other => Err(format!(
                "unknown company size '{}' (expected 1-50, 51-100, 101-500 or 500+)",
                other
            )),
        }
    }
}

/// Client-type specific registration fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "user_type", rename_all = "lowercase")]
pub enum ClientKind {
    Student {
        #[serde(rename = "phone_number")]
        phone: String,
    },
    Organization {
        company_name: String,
        company_size: CompanySize,
    },
}

/// Self-registration payload. Only client accounts can be created this way.
#[derive(Clone, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(flatten)]
    pub kind: ClientKind,
}

impl fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterData")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("password_confirm", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Wire body for the registration endpoint
#[derive(Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub username: &'a str,
    pub role: Role,
    #[serde(flatten)]
    pub data: &'a RegisterData,
}

impl<'a> RegisterRequest<'a> {
    pub fn client(data: &'a RegisterData) -> Self {
        Self {
            username: &data.email,
            role: Role::Client,
            data,
        }
    }
}
