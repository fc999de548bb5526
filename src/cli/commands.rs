//! CLI command implementations

use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use std::fs;

use crate::auth::{
    AccessController, ClientKind, CompanySize, RegisterData, Role, SessionManager,
};
use crate::cli::{info, print_decision, print_session_table, success, warn, OutputFormat};
use crate::config::{self, Config};
use crate::error::Error;

/// Initialize a new maiguru.toml configuration file
pub async fn init() -> Result<()> {
    let config_path = std::path::Path::new(config::loader::CONFIG_FILENAME);

    if config_path.exists() {
        warn("maiguru.toml already exists");
        return Ok(());
    }

    fs::write(config_path, config::loader::default_config_content())?;

    success("Created maiguru.toml");
    info("Set api.base_url (or MAIGURU_API_URL) and run 'maiguru login --email <email>'");

    Ok(())
}

/// Log in and report where the user lands
pub async fn login(email: &str, password: Option<String>, return_to: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()?,
    };

    let session = start_session().await?;
    match session
        .login_with_return(email, &password, return_to.as_deref())
        .await
    {
        Ok(nav) => {
            let snapshot = session.snapshot();
            if let Some(user) = &snapshot.user {
                success(&format!("Logged in as {} ({})", user.email, user.role));
            }
            info(&format!("Continue at {}", nav.to));
            Ok(())
        }
        Err(e) => Err(report("Login failed", e)),
    }
}

/// Register a client account
pub async fn register(
    email: &str,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    company_name: Option<String>,
    company_size: Option<CompanySize>,
) -> Result<()> {
    let kind = match (phone, company_name, company_size) {
        (Some(phone), None, None) => ClientKind::Student { phone },
        (None, Some(company_name), Some(company_size)) => ClientKind::Organization {
            company_name,
            company_size,
        },
        _ => anyhow::bail!(
            "Pass --phone for a student account, or --company-name and --company-size for an organization"
        ),
    };

    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    let data = RegisterData {
        email: email.to_string(),
        password_confirm: password.clone(),
        password,
        first_name,
        last_name,
        kind,
    };

    let session = start_session().await?;
    match session.register(&data).await {
        Ok(nav) => {
            success(&format!("Registered {}", email));
            info(&format!("Continue at {}", nav.to));
            Ok(())
        }
        Err(e) => Err(report("Registration failed", e)),
    }
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = SessionManager::from_config(&config)?;
    let nav = session.logout();

    success("Logged out");
    info(&format!("Continue at {}", nav.to));
    Ok(())
}

/// Show the restored session
pub async fn status(format: OutputFormat) -> Result<()> {
    let session = start_session().await?;
    let snapshot = session.snapshot();

    match format {
        OutputFormat::Table => print_session_table(&snapshot),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    Ok(())
}

/// Run the access check for a destination
pub async fn check(path: &str, roles: &[Role]) -> Result<()> {
    let config = load_config()?;
    let session = SessionManager::from_config(&config)?;
    let snapshot = session.bootstrap().await;

    let controller = AccessController::new(config.routes.clone());
    let decision = controller.authorize(&snapshot, path, roles);
    print_decision(path, &decision);
    Ok(())
}

/// Authorized GET printing the response body
pub async fn get(path: &str) -> Result<()> {
    let session = start_session().await?;
    if !session.is_authenticated() {
        return Err(report("Request failed", Error::NotAuthenticated));
    }

    match session.get_json::<serde_json::Value>(path).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => Err(report("Request failed", e)),
    }
}

fn load_config() -> Result<Config> {
    Ok(config::load_config_or_default()?)
}

async fn start_session() -> Result<SessionManager> {
    let config = load_config()?;
    let session = SessionManager::from_config(&config)?;
    session.bootstrap().await;
    Ok(session)
}

/// Attach the command context; `main` prints the result once
fn report(context: &str, err: Error) -> anyhow::Error {
    match err {
        Error::Auth(auth) => match auth.field {
            Some(field) => anyhow!("{} ({}): {}", context, field, auth.message),
            None => anyhow!("{}: {}", context, auth.message),
        },
        Error::SessionExpired | Error::Unauthorized => {
            anyhow!("{}: {}", context, Error::SessionExpired)
        }
        other => anyhow!("{}: {}", context, other),
    }
}
