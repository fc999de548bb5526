use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maiguru::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maiguru=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Init => cli::commands::init().await,
        Commands::Login {
            email,
            password,
            return_to,
        } => cli::commands::login(&email, password, return_to).await,
        Commands::Register {
            email,
            first_name,
            last_name,
            phone,
            company_name,
            company_size,
        } => {
            cli::commands::register(
                &email,
                first_name,
                last_name,
                phone,
                company_name,
                company_size,
            )
            .await
        }
        Commands::Logout => cli::commands::logout().await,
        Commands::Status { format } => cli::commands::status(format).await,
        Commands::Check { path, roles } => cli::commands::check(&path, &roles).await,
        Commands::Get { path } => cli::commands::get(&path).await,
    }
}
