//! # DialDesk: call worklist for sales outreach
//!
//! Usage:
//!   dialdesk serve                          # Scheduler + HTTP gateway (default port 3300)
//!   dialdesk worklist                       # Print the ordered worklist
//!   dialdesk lead add --name Ada --phone +1-555-0100
//!   dialdesk call not-connected <lead-id> --yes
//!   dialdesk call schedule <lead-id> --at 2026-03-02T15:00:00Z
//!   dialdesk init                           # Write a default config file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dialdesk_core::traits::{FixedAnswer, OperatorPrompt};
use dialdesk_core::{DialDeskConfig, LeadFilter, SystemClock};
use dialdesk_scheduler::{NotifyRouter, SqliteStore, WorklistEngine, spawn_scheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dialdesk",
    version,
    about = "📞 DialDesk: who to call next, and when"
)]
struct Cli {
    /// Config file (default: ~/.dialdesk/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP gateway
    Serve {
        /// Override the gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the ordered worklist
    Worklist {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Lead management
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },
    /// Call outcomes and scheduling
    Call {
        #[command(subcommand)]
        action: CallAction,
    },
    /// Write a default config file
    Init,
}

#[derive(Subcommand)]
enum LeadAction {
    /// Add a lead
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        assigned_to: Option<String>,
    },
}

#[derive(Subcommand)]
enum CallAction {
    /// The call went through
    Connected { lead_id: String },
    /// The call did not go through; offers a follow-up in two hours
    NotConnected {
        lead_id: String,
        /// Book the follow-up without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Schedule a call, or move the pending auto follow-up
    Schedule {
        lead_id: String,
        /// RFC 3339 time, e.g. 2026-03-02T15:00:00Z
        #[arg(long)]
        at: String,
    },
    /// Delete a scheduled call
    Delete { call_id: String },
    /// Close the lead
    Complete { lead_id: String },
}

/// Asks on the terminal.
struct TerminalPrompt;

#[async_trait]
impl OperatorPrompt for TerminalPrompt {
    async fn confirm(&self, question: &str) -> bool {
        println!("{question} [y/N]");
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(DialDeskConfig::default_path)
}

fn load_config(path: &std::path::Path) -> Result<DialDeskConfig> {
    if path.exists() {
        DialDeskConfig::load_from(path).with_context(|| format!("loading {}", path.display()))
    } else {
        tracing::debug!("no config at {}, using defaults", path.display());
        Ok(DialDeskConfig::default())
    }
}

async fn build_engine(
    config: &DialDeskConfig,
) -> Result<(Arc<WorklistEngine>, Arc<NotifyRouter>)> {
    let clock = Arc::new(SystemClock);
    let db_path = config.store.resolved_db_path();
    let store = Arc::new(SqliteStore::open(&db_path, clock.clone())?);
    tracing::debug!("💾 Store: {}", db_path.display());

    let router = Arc::new(NotifyRouter::from_config(&config.notify, clock.clone()));
    let filter = LeadFilter {
        assigned_to: config.worklist.assigned_to.clone(),
        ..LeadFilter::default()
    };
    let engine = Arc::new(WorklistEngine::new(
        store.clone(),
        store,
        router.clone(),
        clock,
        config.scheduler.clone(),
        filter,
    ));
    engine.start().await?;
    Ok((engine, router))
}

fn print_worklist(entries: &[dialdesk_scheduler::WorklistEntry]) {
    if entries.is_empty() {
        println!("📭 Worklist is empty");
        return;
    }
    println!(
        "{:<3} {:<38} {:<20} {:<16} {:<10} {}",
        "#", "LEAD", "NAME", "PHONE", "STATUS", "PRIORITY"
    );
    for (i, e) in entries.iter().enumerate() {
        let countdown = e
            .countdown
            .as_deref()
            .map(|c| format!(" ⏳ {c}"))
            .unwrap_or_default();
        println!(
            "{:<3} {:<38} {:<20} {:<16} {:<10} [{}] {}{}",
            i + 1,
            e.lead.id,
            e.lead.name,
            e.lead.phone,
            e.lead.status.as_str(),
            e.priority.status.to_string(),
            e.priority.text,
            countdown
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dialdesk=debug,dialdesk_scheduler=debug,dialdesk_gateway=debug,tower_http=debug"
    } else {
        "dialdesk=info,dialdesk_scheduler=info,dialdesk_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    match cli.command {
        Command::Init => {
            if path.exists() {
                println!("⚠️  Config already exists: {}", path.display());
            } else {
                DialDeskConfig::default().save_to(&path)?;
                println!("✅ Config written: {}", path.display());
            }
        }
        command => run(command, load_config(&path)?).await?,
    }

    Ok(())
}

async fn run(command: Command, config: DialDeskConfig) -> Result<()> {
    match command {
        Command::Init => {}
        Command::Serve { port } => {
            let mut gateway = config.gateway.clone();
            if let Some(port) = port {
                gateway.port = port;
            }
            let (engine, router) = build_engine(&config).await?;
            let scheduler = spawn_scheduler(engine.clone());

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("⚠️ Could not listen for Ctrl-C: {e}");
                }
                tracing::info!("🛑 Shutting down");
            };
            let served = dialdesk_gateway::start(&gateway, engine, router, shutdown).await;
            scheduler.shutdown().await;
            served?;
        }
        Command::Worklist { json } => {
            let (engine, _) = build_engine(&config).await?;
            engine.countdown_tick().await;
            let entries = engine.snapshot().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_worklist(&entries);
            }
        }
        Command::Lead { action } => match action {
            LeadAction::Add {
                name,
                phone,
                assigned_to,
            } => {
                let (engine, _) = build_engine(&config).await?;
                let lead = engine.add_lead(&name, &phone, assigned_to).await?;
                println!("✅ Lead added: {} ({})", lead.name, lead.id);
            }
        },
        Command::Call { action } => {
            let (engine, _) = build_engine(&config).await?;
            match action {
                CallAction::Connected { lead_id } => {
                    engine.mark_connected(&lead_id).await?;
                    println!("📞 {lead_id} marked connected");
                }
                CallAction::NotConnected { lead_id, yes } => {
                    let outcome = if yes {
                        engine.mark_not_connected(&lead_id, &FixedAnswer(true)).await?
                    } else {
                        engine.mark_not_connected(&lead_id, &TerminalPrompt).await?
                    };
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                CallAction::Schedule { lead_id, at } => {
                    let time = chrono::DateTime::parse_from_rfc3339(&at)
                        .with_context(|| format!("invalid time '{at}'"))?
                        .with_timezone(&chrono::Utc);
                    let call = engine.schedule_or_update(&lead_id, Some(time)).await?;
                    println!(
                        "📅 {} scheduled for {} ({})",
                        call.id,
                        call.scheduled_time.format("%Y-%m-%d %H:%M UTC"),
                        call.origin.as_str()
                    );
                }
                CallAction::Delete { call_id } => {
                    engine.delete_scheduled_call(&call_id).await?;
                    println!("🗑️  {call_id} deleted");
                }
                CallAction::Complete { lead_id } => {
                    let lead = engine.complete_call(&lead_id).await?;
                    println!("✅ {} ({}) completed", lead.name, lead.id);
                }
            }
        }
    }

    Ok(())
}
