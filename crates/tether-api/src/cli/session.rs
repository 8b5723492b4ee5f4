//! Remote session CLI commands: list, create, delete, share.
//!
//! Talks to the chat server directly through the hub's backend; nothing here
//! needs the HTTP server to be running.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tether_types::remote::RemoteSession;
use tether_types::session::SessionKey;

use crate::state::AppState;

/// List sessions on the chat server at `ip`.
///
/// # Examples
///
/// ```bash
/// tether sessions list --ip 10.0.0.5
/// tether sessions list --ip 10.0.0.5 --json
/// ```
pub async fn list_sessions(state: &AppState, ip: &str, json: bool) -> Result<()> {
    let endpoint = state.config().remote.endpoint_for(ip);
    let sessions = state
        .hub
        .backend()
        .list_sessions(&endpoint)
        .await
        .with_context(|| format!("Failed to list sessions on {endpoint}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions on {}. Start one with: {}",
            style("i").blue().bold(),
            style(ip).cyan(),
            style(format!("tether sessions create --ip {ip}")).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Shared").fg(Color::White),
    ]);

    for session in &sessions {
        table.add_row(vec![
            Cell::new(&session.id).fg(Color::Cyan),
            Cell::new(truncate(session.title.as_deref().unwrap_or("(untitled)"), 40))
                .fg(Color::White),
            Cell::new(format_created(session)).fg(Color::DarkGrey),
            match &session.share_url {
                Some(_) => Cell::new("yes").fg(Color::Green),
                None => Cell::new("no").fg(Color::DarkGrey),
            },
        ]);
    }

    println!();
    println!("  Sessions on {}", style(ip).cyan().bold());
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

pub async fn create_session(
    state: &AppState,
    ip: &str,
    title: Option<&str>,
    json: bool,
) -> Result<()> {
    let endpoint = state.config().remote.endpoint_for(ip);
    let session = state
        .hub
        .backend()
        .create_session(&endpoint, title)
        .await
        .with_context(|| format!("Failed to create a session on {endpoint}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!(
            "  {} Session {} created.",
            style("+").green().bold(),
            style(&session.id).cyan()
        );
    }
    Ok(())
}

/// Delete a session remotely and drop its local summary and state.
pub async fn delete_session(state: &AppState, ip: &str, sid: &str, json: bool) -> Result<()> {
    let key = SessionKey::new(ip, sid);
    state
        .hub
        .backend()
        .delete_session(&state.hub.endpoint_for(&key), sid)
        .await
        .with_context(|| format!("Failed to delete session '{sid}'"))?;
    state.hub.forget(&key).await;

    if json {
        println!("{}", serde_json::json!({"deleted": true, "session_id": sid}));
    } else {
        println!("  {} Session '{}' deleted.", style("x").red().bold(), sid);
    }
    Ok(())
}

pub async fn share_session(state: &AppState, ip: &str, sid: &str, json: bool) -> Result<()> {
    let key = SessionKey::new(ip, sid);
    let url = state
        .hub
        .share(&key)
        .await
        .with_context(|| format!("Failed to share session '{sid}'"))?;

    if json {
        println!("{}", serde_json::json!({"session_id": sid, "url": url}));
    } else {
        println!("  {} {}", style("Shared:").green().bold(), style(url).underlined());
    }
    Ok(())
}

// --- Formatting helpers ---

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn format_created(session: &RemoteSession) -> String {
    session
        .created_at
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
