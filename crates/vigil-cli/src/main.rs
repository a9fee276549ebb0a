use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vigil_core::{
    alert, user, Alert, AlertCounts, AlertFilter, AlertKind, DetectionState, EnrollMode,
    ImageFile, User, ValidationError,
};
use vigil_sync::{
    resolve_base_url, spawn_reminder_sync, ApiClient, EnrollmentWorkflow, Session, SyncError,
};

mod config;

use config::Config;

/// How many alerts the dashboard summary shows.
const RECENT_ALERTS: usize = 4;

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil surveillance appliance CLI", version)]
struct Cli {
    /// TOML config file (default: $VIGIL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend base URL, overriding config and environment
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend health and a dashboard summary
    Status,
    /// Follow detections and alerts until Ctrl-C
    Watch,
    /// Show who is in front of the camera
    Detection {
        #[arg(long)]
        json: bool,
    },
    /// List alerts, newest first
    Alerts {
        /// all, motion, emergency, security, reminder or unknown
        #[arg(short, long, default_value = "all")]
        filter: AlertFilter,
        /// Show at most this many
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List enrolled users and their reminders
    Users {
        #[arg(long)]
        json: bool,
    },
    /// Enroll a new face
    Enroll {
        #[arg(short, long)]
        name: String,
        /// Photo of the face
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Replace the face of an enrolled user
    #[command(name = "re-enroll")]
    ReEnroll {
        /// Must match an enrolled user exactly
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Delete an enrolled user
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or edit a user's reminders
    Reminders {
        #[command(subcommand)]
        action: ReminderAction,
    },
}

#[derive(Subcommand)]
enum ReminderAction {
    /// List a user's reminders
    List { name: String },
    /// Append a reminder
    Add { name: String, item: String },
    /// Remove a reminder by its number in `list`
    Remove { name: String, index: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url.as_deref() {
        config.base_url = resolve_base_url(Some(url), None);
    }
    tracing::debug!(base_url = %config.base_url, "configuration loaded");

    let api = ApiClient::http(&config.base_url, config.request_timeout)?;
    match cli.command {
        Commands::Status => status(&api).await,
        Commands::Watch => watch(api, &config).await,
        Commands::Detection { json } => detection(&api, json).await,
        Commands::Alerts {
            filter,
            limit,
            json,
        } => alerts(&api, filter, limit, json).await,
        Commands::Users { json } => users(&api, json).await,
        Commands::Enroll { name, image } => enroll(api, EnrollMode::Enroll, name, &image).await,
        Commands::ReEnroll { name, image } => {
            enroll(api, EnrollMode::ReEnroll, name, &image).await
        }
        Commands::Delete { name, yes } => delete(api, &name, yes).await,
        Commands::Reminders { action } => reminders(api, action).await,
    }
}

async fn status(api: &ApiClient) -> Result<()> {
    let status = api
        .health()
        .await
        .with_context(|| format!("checking {}", api.base_url()))?;
    println!("{}: {status}", api.base_url());

    let detection = api.current_detection().await?;
    println!("now: {}", detection_line(&DetectionState::from_payload(detection)));

    let list = api.alerts().await?;
    println!(
        "alerts: {} unread ({})",
        alert::unread(&list).len(),
        counts_line(&AlertCounts::tally(&list))
    );
    let now = Utc::now();
    for a in alert::recent(&list, RECENT_ALERTS) {
        println!("  {}", alert_line(a, now));
    }
    Ok(())
}

async fn watch(api: ApiClient, config: &Config) -> Result<()> {
    let session = Session::with_api(api, &config.session_options());
    println!("watching {} (Ctrl-C to stop)", session.api().base_url());

    let mut detection = session.detection().subscribe();
    let mut alert_list = session.alerts().subscribe();
    let mut last_counts = AlertCounts::default();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = detection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = detection.borrow_and_update().clone();
                println!("{} {}", clock(Utc::now()), detection_line(&state));
            }
            changed = alert_list.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = alert_list.borrow_and_update().clone();
                let counts = AlertCounts::tally(&list);
                if counts != last_counts {
                    println!("{} alerts: {}", clock(Utc::now()), counts_line(&counts));
                    last_counts = counts;
                }
            }
            signal = &mut shutdown => {
                signal.context("listening for Ctrl-C")?;
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

async fn detection(api: &ApiClient, json: bool) -> Result<()> {
    let payload = api.current_detection().await?;
    let state = DetectionState::from_payload(payload);
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", detection_line(&state));
    }
    Ok(())
}

async fn alerts(api: &ApiClient, filter: AlertFilter, limit: Option<usize>, json: bool) -> Result<()> {
    let list = api.alerts().await?;
    let shown: Vec<&Alert> = filter
        .apply(&list)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    let counts = AlertCounts::tally(&list);
    println!(
        "{} alerts, {} unread ({})",
        list.len(),
        alert::unread(&list).len(),
        counts_line(&counts)
    );
    if shown.is_empty() {
        println!("no {filter} alerts");
    }
    let now = Utc::now();
    for a in shown {
        println!("{}", alert_line(a, now));
    }
    Ok(())
}

async fn users(api: &ApiClient, json: bool) -> Result<()> {
    let users = api.users().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    if users.is_empty() {
        println!("No users enrolled");
    }
    for u in &users {
        println!("{}", user_line(u));
    }
    Ok(())
}

async fn enroll(api: ApiClient, mode: EnrollMode, name: String, image: &Path) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let directory = spawn_reminder_sync(api.clone());
    let mut workflow = EnrollmentWorkflow::enter(api, directory, mode).await;
    let form = workflow.form_mut();
    form.set_name(name);
    form.select_file(ImageFile::from_bytes(file_name, bytes));

    if let Some(preview) = workflow.form().preview() {
        println!(
            "image: {}x{} {:?}",
            preview.width, preview.height, preview.format
        );
    }

    match workflow.submit().await {
        Ok(name) => {
            let verb = match mode {
                EnrollMode::Enroll => "Enrolled",
                EnrollMode::ReEnroll => "Re-enrolled",
            };
            println!("{verb} {name}");
            Ok(())
        }
        Err(SyncError::Validation(ValidationError::UnknownUser(name))) => {
            let known = workflow.directory_names();
            if known.is_empty() {
                bail!("{name} is not an enrolled user (directory is empty or unreachable)");
            }
            bail!(
                "{name} is not an enrolled user; choose one of: {}",
                known.join(", ")
            )
        }
        Err(error) => Err(error.into()),
    }
}

async fn delete(api: ApiClient, name: &str, yes: bool) -> Result<()> {
    let directory = spawn_reminder_sync(api.clone());
    let mut workflow = EnrollmentWorkflow::enter(api, directory, EnrollMode::Enroll).await;
    if !workflow.directory_names().iter().any(|n| n == name) {
        tracing::warn!(name, "user not in directory; sending delete anyway");
    }

    let pending = workflow.request_delete(name);
    if !yes && !confirm(&format!("Delete user {name}?"))? {
        println!("Aborted");
        return Ok(());
    }
    workflow.confirm_delete(pending).await?;
    println!("Deleted {name}");
    Ok(())
}

async fn reminders(api: ApiClient, action: ReminderAction) -> Result<()> {
    match action {
        ReminderAction::List { name } => {
            let users = api.users().await?;
            let found = user::find(&users, &name)
                .ok_or_else(|| ValidationError::UnknownUser(name.clone()))?;
            print_reminders(&found.reminders);
        }
        ReminderAction::Add { name, item } => {
            let directory = spawn_reminder_sync(api);
            directory.refresh().await?;
            let next = directory.add_reminder(&name, &item).await?;
            print_reminders(&next);
        }
        ReminderAction::Remove { name, index } => {
            let position = position_from_display(index)?;
            let directory = spawn_reminder_sync(api);
            directory.refresh().await?;
            let next = directory.remove_reminder(&name, position).await?;
            print_reminders(&next);
        }
    }
    Ok(())
}

fn print_reminders(items: &[String]) {
    if items.is_empty() {
        println!("No reminders");
    }
    for (i, item) in items.iter().enumerate() {
        println!("{:>3}. {item}", i + 1);
    }
}

/// 1-based numbers as shown by `reminders list` to list positions.
fn position_from_display(index: usize) -> Result<usize> {
    match index.checked_sub(1) {
        Some(position) => Ok(position),
        None => bail!("reminder numbers start at 1"),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn clock(now: DateTime<Utc>) -> String {
    now.with_timezone(&chrono::Local).format("%H:%M:%S").to_string()
}

fn detection_line(state: &DetectionState) -> String {
    let Some(snapshot) = state.snapshot() else {
        return state.summary();
    };
    let class = snapshot.classify();
    let mut line = format!("[{}] {}", class.badge(), state.summary());
    if let Some(confidence) = snapshot.confidence {
        line.push_str(&format!(" {:.0}%", confidence * 100.0));
    }
    if !snapshot.reminders.is_empty() {
        line.push_str(&format!(" - reminders: {}", snapshot.reminders.join(", ")));
    }
    line
}

fn alert_line(alert: &Alert, now: DateTime<Utc>) -> String {
    let marker = if alert.is_unread() { '*' } else { ' ' };
    format!(
        "{marker} {:<9} {:<10} {}",
        alert.kind.as_str().to_uppercase(),
        alert.age_label(now),
        alert.message
    )
}

fn counts_line(counts: &AlertCounts) -> String {
    let mut parts: Vec<String> = AlertKind::KNOWN
        .iter()
        .map(|kind| format!("{kind} {}", counts.get(*kind)))
        .collect();
    if counts.unknown > 0 {
        parts.push(format!("other {}", counts.unknown));
    }
    parts.join(", ")
}

fn user_line(u: &User) -> String {
    if u.reminders.is_empty() {
        u.name.clone()
    } else {
        format!("{} ({})", u.name, u.reminders.join(", "))
    }
}
