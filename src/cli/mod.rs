//! CLI interface for Mai-Guru

pub mod commands;
mod output;

pub use output::*;

use clap::{Parser, Subcommand, ValueEnum};

use crate::auth::{CompanySize, Role};

#[derive(Parser)]
#[command(name = "maiguru")]
#[command(version)]
#[command(about = "Sign in to the Mai-Guru marketplace and check role access", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a maiguru.toml configuration file
    Init,

    /// Log in with email and password
    Login {
        #[arg(short, long, env = "MAIGURU_EMAIL")]
        email: String,

        /// Prompted for when omitted
        #[arg(short, long, env = "MAIGURU_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Page to return to after login (must be a local path)
        #[arg(long)]
        return_to: Option<String>,
    },

    /// Register a new client account and log in
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Contact phone, registers a student account
        #[arg(long, conflicts_with_all = ["company_name", "company_size"])]
        phone: Option<String>,

        /// Company name, registers an organization account
        #[arg(long, requires = "company_size")]
        company_name: Option<String>,

        /// One of 1-50, 51-100, 101-500, 500+
        #[arg(long, requires = "company_name")]
        company_size: Option<CompanySize>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Status {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Check whether the current session may open a page
    Check {
        /// Destination path, e.g. /admin/dashboard
        path: String,

        /// Roles allowed on the destination
        #[arg(short, long, value_delimiter = ',', required = true)]
        roles: Vec<Role>,
    },

    /// Authorized GET against the backend, printing the JSON response
    Get {
        /// API path, e.g. /api/tasks/
        path: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
