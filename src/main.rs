//! Eclipse Tasks - a command-line client for the Eclipse task manager.
//!
//! Handles login/registration against the backend, keeps the session token
//! and its expiry persisted locally, and manages the signed-in user's task
//! list. Session expiry is enforced by a background watcher; see the `auth`
//! module.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eclipse_tasks::api::{self, ApiClient, AuthRequest};
use eclipse_tasks::auth::{ExpirationWatcher, SessionStore, WatcherState};
use eclipse_tasks::config::Config;
use eclipse_tasks::models::{filter_and_sort, NewTask, TaskSort};
use eclipse_tasks::storage::FileStorage;
use eclipse_tasks::utils::{format_countdown, format_due_distance};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("Eclipse Tasks");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  eclipse login [username]       Sign in and start a session");
    eprintln!("  eclipse register               Create an account and sign in");
    eprintln!("  eclipse status                 Show session state and countdown");
    eprintln!("  eclipse watch                  Live countdown until the session expires");
    eprintln!("  eclipse logout                 End the session");
    eprintln!("  eclipse tasks list [--sort created|due] [--category NAME]");
    eprintln!("  eclipse tasks add <title> <description> <category> <due YYYY-MM-DD>");
    eprintln!("  eclipse tasks delete <id>");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("login") => cmd_login(args.get(2).cloned()).await,
        Some("register") => cmd_register().await,
        Some("logout") => cmd_logout(),
        Some("status") => cmd_status(),
        Some("watch") => cmd_watch().await,
        Some("tasks") => cmd_tasks(&args[2..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// Open the session store over the durable state directory.
fn open_session(config: &Config) -> Result<SessionStore> {
    let storage = FileStorage::new(config.state_dir()?)?;
    Ok(SessionStore::new(Arc::new(storage)))
}

/// Restore the session and return its token, or print the sign-in hint.
/// Task commands never call the API without a token.
fn restored_token(store: &mut SessionStore) -> Result<Option<String>> {
    match store.restore()? {
        Some(session) => Ok(Some(session.token)),
        None => {
            eprintln!("Not logged in. Run `eclipse login` to sign in.");
            Ok(None)
        }
    }
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();

    if value.is_empty() {
        if let Some(default) = default {
            return Ok(default.to_string());
        }
    }
    Ok(value)
}

fn prompt_credentials(config: &Config, username_arg: Option<String>) -> Result<AuthRequest> {
    let username = match username_arg {
        Some(username) => username,
        None => prompt("Username", config.last_username.as_deref())?,
    };
    if username.is_empty() {
        anyhow::bail!("Username is required");
    }
    let email = prompt("Email", None)?;
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    Ok(AuthRequest {
        username,
        email,
        password,
    })
}

/// Hand a backend auth response to the session store and remember the user.
fn begin_session(
    config: &mut Config,
    credentials: &AuthRequest,
    response: api::AuthResponse,
) -> Result<()> {
    // The store's preconditions: non-empty token, positive ttl.
    if response.token.is_empty() || response.expire_time == 0 {
        anyhow::bail!("Backend returned an unusable session (empty token or zero expiry)");
    }

    let mut store = open_session(config)?;
    store.login(&response.token, response.expire_time)?;

    config.last_username = Some(credentials.username.clone());
    config.save()?;

    info!(username = %credentials.username, "Logged in");
    println!(
        "Logged in. Session expires in {}.",
        format_countdown(store.remaining_ms())
    );
    Ok(())
}

async fn cmd_login(username_arg: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    let credentials = prompt_credentials(&config, username_arg)?;

    let client = ApiClient::new(config.api_base_url())?;
    let response = client
        .login(&credentials)
        .await
        .context("Login failed, please check your credentials")?;

    begin_session(&mut config, &credentials, response)
}

async fn cmd_register() -> Result<()> {
    let mut config = Config::load()?;
    let credentials = prompt_credentials(&config, None)?;

    let client = ApiClient::new(config.api_base_url())?;
    let response = client
        .register(&credentials)
        .await
        .context("Registration failed")?;

    begin_session(&mut config, &credentials, response)
}

fn cmd_logout() -> Result<()> {
    let config = Config::load()?;
    let mut store = open_session(&config)?;
    store.logout()?;
    println!("Logged out. Run `eclipse login` to sign in.");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load()?;
    let mut store = open_session(&config)?;
    match store.restore()? {
        Some(session) => {
            println!(
                "Logged in. Session expires in {}.",
                format_countdown(session.remaining_ms())
            );
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn cmd_watch() -> Result<()> {
    let config = Config::load()?;
    let mut store = open_session(&config)?;
    if store.restore()?.is_none() {
        eprintln!("Not logged in. Run `eclipse login` to sign in.");
        return Ok(());
    }

    let store = Arc::new(Mutex::new(store));
    let watcher = ExpirationWatcher::start(store);
    let mut ticks = watcher.subscribe();

    while ticks.changed().await.is_ok() {
        let tick = *ticks.borrow_and_update();
        match tick.state {
            WatcherState::Active => {
                print!("\rSession expires in {}   ", format_countdown(tick.remaining_ms));
                io::stdout().flush()?;
            }
            WatcherState::Expiring | WatcherState::Idle => {
                println!();
                println!("Session expired. Run `eclipse login` to sign in.");
                break;
            }
        }
    }
    Ok(())
}

async fn cmd_tasks(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let mut store = open_session(&config)?;
    let Some(token) = restored_token(&mut store)? else {
        return Ok(());
    };

    let client = ApiClient::new(config.api_base_url())?.with_token(token);

    match args.first().map(String::as_str) {
        Some("list") => cmd_tasks_list(&client, &args[1..]).await,
        Some("add") => cmd_tasks_add(&client, &args[1..]).await,
        Some("delete") => cmd_tasks_delete(&client, &args[1..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn cmd_tasks_list(client: &ApiClient, args: &[String]) -> Result<()> {
    let mut sort = None;
    let mut category = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sort" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--sort requires a value"))?;
                sort = Some(
                    TaskSort::parse(value)
                        .ok_or_else(|| anyhow::anyhow!("Unknown sort order: {}", value))?,
                );
            }
            "--category" => {
                category = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--category requires a value"))?
                        .clone(),
                );
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    let tasks = client.fetch_tasks().await.context("Failed to fetch tasks")?;
    let tasks = filter_and_sort(tasks, category.as_deref(), sort);

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    let now = Utc::now();
    for task in &tasks {
        println!(
            "{}  [{}] {} - due {} ({})",
            task.id,
            task.category,
            task.title,
            task.due_date.format("%Y-%m-%d"),
            format_due_distance(task.due_date, now)
        );
        if !task.description.is_empty() {
            println!("      {}", task.description);
        }
    }
    Ok(())
}

async fn cmd_tasks_add(client: &ApiClient, args: &[String]) -> Result<()> {
    let [title, description, category, due] = args else {
        anyhow::bail!("Usage: eclipse tasks add <title> <description> <category> <due YYYY-MM-DD>");
    };

    let due_date = NaiveDate::parse_from_str(due, "%Y-%m-%d")
        .with_context(|| format!("Invalid due date (expected YYYY-MM-DD): {}", due))?
        .and_time(NaiveTime::MIN)
        .and_utc();

    let draft = NewTask::new(title.clone(), description.clone(), category.clone(), due_date);
    let created = client.create_task(&draft).await.context("Failed to add task")?;

    println!("Added task {} ({}).", created.id, created.title);
    Ok(())
}

async fn cmd_tasks_delete(client: &ApiClient, args: &[String]) -> Result<()> {
    let [task_id] = args else {
        anyhow::bail!("Usage: eclipse tasks delete <id>");
    };

    client
        .delete_task(task_id)
        .await
        .context("Failed to delete task")?;
    println!("Deleted task {}.", task_id);
    Ok(())
}
