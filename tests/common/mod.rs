//! In-memory stand-in for the marketplace backend

#![allow(dead_code)]

use async_trait::async_trait;
use maiguru::api::{endpoints, ApiRequest, ApiResponse, Transport};
use maiguru::auth::{MemoryCredentialStore, SessionManager, SessionOptions};
use maiguru::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TASKS: &str = "/api/tasks/";
pub const PASSWORD: &str = "correct horse";

struct Account {
    password: String,
    profile: Value,
}

#[derive(Default)]
pub struct FakeBackend {
    accounts: Mutex<HashMap<String, Account>>,
    access: Mutex<HashSet<String>>,
    refresh: Mutex<HashSet<String>>,
    owners: Mutex<HashMap<String, String>>,
    issued: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
    pub offline: AtomicBool,
    pub tasks_always_unauthorized: AtomicBool,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub token_delay: Mutex<Option<Duration>>,
    /// Held before the bearer is checked, so tokens can change meanwhile
    pub tasks_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.add_account("admin@maiguru.test", "admin", 1);
        backend.add_account("client@maiguru.test", "client", 2);
        backend.add_account("expert@maiguru.test", "expert", 3);
        Arc::new(backend)
    }

    pub fn add_account(&self, email: &str, role: &str, id: i64) {
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                password: PASSWORD.to_string(),
                profile: json!({
                    "id": id,
                    "username": email,
                    "email": email,
                    "first_name": "Test",
                    "last_name": role,
                    "role": role,
                    "is_verified": true,
                }),
            },
        );
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    /// Every access token issued so far stops working
    pub fn expire_access_tokens(&self) {
        self.access.lock().clear();
    }

    /// Every refresh token issued so far stops working
    pub fn revoke_refresh_tokens(&self) {
        self.refresh.lock().clear();
    }

    fn issue(&self, email: &str) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let access = format!("access-{}", n);
        let refresh = format!("refresh-{}", n);
        self.access.lock().insert(access.clone());
        self.refresh.lock().insert(refresh.clone());
        self.owners.lock().insert(access.clone(), email.to_string());
        self.owners.lock().insert(refresh.clone(), email.to_string());
        (access, refresh)
    }

    fn bearer_owner(&self, request: &ApiRequest) -> Option<String> {
        let token = request.bearer.as_ref()?;
        if !self.access.lock().contains(token) {
            return None;
        }
        self.owners.lock().get(token).cloned()
    }

    fn token_not_valid() -> ApiResponse {
        ApiResponse::new(
            401,
            json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
        )
    }

    fn obtain(&self, body: &Value) -> ApiResponse {
        let email = body["email"].as_str().unwrap_or_default();
        let password = body["password"].as_str().unwrap_or_default();

        if !email.contains('@') {
            return ApiResponse::new(
                400,
                json!({"detail": "Enter a valid email address.", "field": "email"}),
            );
        }
        let valid = self
            .accounts
            .lock()
            .get(email)
            .is_some_and(|account| account.password == password);
        if !valid {
            return ApiResponse::new(
                401,
                json!({"detail": "No active account found with the given credentials"}),
            );
        }

        let (access, refresh) = self.issue(email);
        ApiResponse::new(200, json!({"access": access, "refresh": refresh}))
    }

    fn refresh_access(&self, body: &Value) -> ApiResponse {
        let token = body["refresh"].as_str().unwrap_or_default();
        if !self.refresh.lock().contains(token) {
            return Self::token_not_valid();
        }
        let Some(owner) = self.owners.lock().get(token).cloned() else {
            return Self::token_not_valid();
        };

        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let access = format!("access-{}", n);
        self.access.lock().insert(access.clone());
        self.owners.lock().insert(access.clone(), owner);
        ApiResponse::new(200, json!({"access": access}))
    }

    fn register(&self, body: &Value) -> ApiResponse {
        let email = body["email"].as_str().unwrap_or_default().to_string();
        if self.accounts.lock().contains_key(&email) {
            return ApiResponse::new(
                400,
                json!({"email": ["user with this email already exists."]}),
            );
        }
        if body["role"] != "client" {
            return ApiResponse::new(400, json!({"role": ["Only client accounts may register."]}));
        }

        let id = 100 + self.accounts.lock().len() as i64;
        let profile = json!({
            "id": id,
            "email": email,
            "first_name": body["first_name"],
            "last_name": body["last_name"],
            "role": "client",
            "user_type": body["user_type"],
        });
        self.accounts.lock().insert(
            email,
            Account {
                password: body["password"].as_str().unwrap_or_default().to_string(),
                profile: profile.clone(),
            },
        );
        ApiResponse::new(201, profile)
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        *self.calls.lock().entry(request.path.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let body = request.body.clone().unwrap_or(Value::Null);
        match request.path.as_str() {
            endpoints::TOKEN => {
                let delay = *self.token_delay.lock();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(self.obtain(&body))
            }
            endpoints::TOKEN_REFRESH => {
                let delay = *self.refresh_delay.lock();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(self.refresh_access(&body))
            }
            endpoints::REGISTER_CLIENT => Ok(self.register(&body)),
            endpoints::CURRENT_USER => match self.bearer_owner(&request) {
                Some(owner) => {
                    let accounts = self.accounts.lock();
                    let profile = accounts.get(&owner).map(|a| a.profile.clone());
                    Ok(ApiResponse::new(200, profile.unwrap_or(Value::Null)))
                }
                None => Ok(Self::token_not_valid()),
            },
            TASKS => {
                let delay = *self.tasks_delay.lock();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if self.tasks_always_unauthorized.load(Ordering::SeqCst) {
                    return Ok(Self::token_not_valid());
                }
                match self.bearer_owner(&request) {
                    Some(owner) => Ok(ApiResponse::new(200, json!({"owner": owner, "tasks": []}))),
                    None => Ok(Self::token_not_valid()),
                }
            }
            other => Ok(ApiResponse::new(404, json!({"detail": format!("{} not found", other)}))),
        }
    }
}

/// Manager over the fake backend with an in-memory store, already bootstrapped
pub async fn signed_out(backend: &Arc<FakeBackend>) -> (SessionManager, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let manager = SessionManager::new(backend.clone(), store.clone(), SessionOptions::default());
    manager.bootstrap().await;
    (manager, store)
}

/// Same as [`signed_out`], then logged in as `email`
pub async fn signed_in(
    backend: &Arc<FakeBackend>,
    email: &str,
) -> (SessionManager, Arc<MemoryCredentialStore>) {
    let (manager, store) = signed_out(backend).await;
    manager
        .login(email, PASSWORD)
        .await
        .expect("Failed to log in");
    (manager, store)
}
