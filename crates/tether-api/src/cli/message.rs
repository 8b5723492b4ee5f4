//! CLI message commands: one-shot send and live watch.

use anyhow::{Result, bail};
use console::style;
use tether_types::queue::{JobStatus, QueuedMessageJob};
use tether_types::session::SessionKey;
use tether_types::state::SessionSnapshot;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Enqueue `text` and drain the queue in the foreground.
///
/// A previously failed message for the same session is retried first.
///
/// # Examples
///
/// ```bash
/// tether send --ip 10.0.0.5 --sid ses_1 "run the tests again"
/// ```
pub async fn send(state: &AppState, ip: &str, sid: &str, text: &str, json: bool) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Message text must not be empty");
    }

    let key = SessionKey::new(ip, sid);
    state.hub.enqueue(&key, text);
    let report = state.hub.queue().drain().await;

    let history = state.hub.queue().history(&key);
    let delivered: Vec<&QueuedMessageJob> = history
        .iter()
        .filter(|job| job.attempts > 0 && job.status.is_terminal())
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "report": report,
                "jobs": delivered,
            }))?
        );
    } else {
        for job in &delivered {
            print_job(job);
        }
    }

    if report.failed > 0 {
        bail!(
            "{} of {} message(s) failed to send",
            report.failed,
            report.sent + report.failed
        );
    }
    Ok(())
}

fn print_job(job: &QueuedMessageJob) {
    match job.status {
        JobStatus::Sent => println!(
            "  {} {}",
            style("sent").green().bold(),
            style(&job.text).dim()
        ),
        _ => println!(
            "  {} {} ({})",
            style(job.status).red().bold(),
            style(&job.text).dim(),
            job.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Stream snapshots of one session until Ctrl+C.
pub async fn watch(state: &AppState, ip: &str, sid: &str, json: bool) -> Result<()> {
    let key = SessionKey::new(ip, sid);
    let cancel = CancellationToken::new();
    let mut snapshots = state.hub.observe(key.clone(), cancel.clone());

    if !json {
        println!(
            "  Watching {} {}",
            style(&key).cyan().bold(),
            style("(Ctrl+C to stop)").dim()
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = snapshots.recv() => match next {
                Some(snapshot) if json => println!("{}", serde_json::to_string(&snapshot)?),
                Some(snapshot) => print_snapshot(&snapshot),
                None => break,
            },
        }
    }

    cancel.cancel();
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    let state = &snapshot.state;
    let marker = if state.action_flag {
        style("!").yellow().bold()
    } else {
        style("*").dim()
    };
    println!();
    println!(
        "  {} {} {}",
        marker,
        style(&state.summary).bold(),
        style(format!("({} messages)", state.message_count)).dim()
    );
    for msg in &state.last_messages {
        let line: String = msg.text.lines().next().unwrap_or_default().chars().take(100).collect();
        println!("    {} {}", style(format!("{}:", msg.role)).cyan(), line);
    }
}
