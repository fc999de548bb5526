//! CLI output formatting utilities

use chrono::Utc;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::auth::{Decision, Role, SessionSnapshot};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

fn role_color(role: Role) -> Color {
    match role {
        Role::Admin => Color::Magenta,
        Role::Client => Color::Green,
        Role::Expert => Color::Cyan,
    }
}

/// Print the current session as a table
pub fn print_session_table(snapshot: &SessionSnapshot) {
    let Some(user) = &snapshot.user else {
        info("Not logged in. Run 'maiguru login --email <email>'");
        return;
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Email").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Role").fg(Color::Cyan),
            Cell::new("Token expires").fg(Color::Cyan),
        ]);

    let expires = match snapshot.access_expires_at {
        Some(at) => {
            let shown = at.format("%Y-%m-%d %H:%M UTC").to_string();
            if at <= Utc::now() {
                format!("{} (expired)", shown)
            } else {
                shown
            }
        }
        None => "unknown".to_string(),
    };

    table.add_row(vec![
        Cell::new(&user.id),
        Cell::new(&user.email),
        Cell::new(user.full_name()),
        Cell::new(user.role).fg(role_color(user.role)),
        Cell::new(expires),
    ]);

    println!("{table}");
}

/// Print an access decision for a destination
pub fn print_decision(path: &str, decision: &Decision) {
    match decision {
        Decision::Allow => success(&format!("{} may be opened", path)),
        Decision::Wait => warn("Session is still loading"),
        Decision::Login { location, .. } => {
            warn(&format!("Login required, redirecting to {}", location.bold()))
        }
        Decision::Landing { location, role } => warn(&format!(
            "{} is not open to {} accounts, redirecting to {}",
            path,
            role,
            location.bold()
        )),
    }
}
