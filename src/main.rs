//! # Steward
//!
//! Chat-group automation bot for OneBot gateways: cron-scheduled messages and
//! mutes, plus automatic join-request verification.
//!
//! Usage:
//!   steward                          # Run with ~/.steward/config.toml
//!   steward --config bot.toml        # Custom config file
//!   steward --check                  # Validate the config and exit

mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use steward_core::{StewardConfig, TaskCatalog};
use steward_gateway::{Gateway, GatewayClient};
use steward_requests::JoinRequestCoordinator;
use steward_scheduler::{ExecutionRecord, RecordStore, Scheduler, TaskExecutor};

use console::Command;

#[derive(Parser)]
#[command(name = "steward", version, about = "🤖 Steward: chat-group automation bot")]
struct Cli {
    /// Config file (default: ~/.steward/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Validate the config and exit
    #[arg(long)]
    check: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Explicitly wired services shared by the console.
struct App {
    config_path: PathBuf,
    gateway: Arc<GatewayClient>,
    catalog: Arc<TaskCatalog>,
    executor: Arc<TaskExecutor>,
    scheduler: Scheduler,
    coordinator: Arc<JoinRequestCoordinator>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(StewardConfig::default_path);

    // Logging comes up before the config so config problems are visible.
    let config_debug = StewardConfig::load_from(&config_path)
        .map(|c| c.log.debug)
        .unwrap_or(false);
    let filter = if cli.verbose || config_debug {
        "steward=debug,steward_core=debug,steward_gateway=debug,steward_requests=debug,steward_scheduler=debug"
    } else {
        "steward=info,steward_core=info,steward_gateway=info,steward_requests=info,steward_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = StewardConfig::load_or_init(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if config.uses_placeholders() {
        tracing::warn!(
            "⚠️  Config still uses placeholder values (websocket {} or example ids). Edit {} before going live.",
            config.bot.websocket,
            config_path.display()
        );
    }

    let tasks = config.tasks();
    if cli.check {
        println!("✅ {} valid task(s) in {}", tasks.len(), config_path.display());
        for task in &tasks {
            println!("   • {} ({}) → {} {:?}", task.name, task.kind(), task.target, task.target_ids);
        }
        return Ok(());
    }

    let gateway = Arc::new(GatewayClient::new(&config));
    let catalog = Arc::new(TaskCatalog::default());
    let records = RecordStore::from_config(&config.storage);
    let executor = Arc::new(TaskExecutor::new(
        gateway.clone() as Arc<dyn Gateway>,
        Arc::clone(&catalog),
        records,
        &config.safety,
    ));
    let scheduler = Scheduler::new(Arc::clone(&executor), Arc::clone(&catalog));
    let coordinator = Arc::new(JoinRequestCoordinator::new(
        gateway.clone() as Arc<dyn Gateway>,
        Arc::clone(&catalog),
        gateway.default_timeout(),
    ));

    // Subscribe before connecting so no join request is missed.
    let _worker = coordinator.spawn(gateway.subscribe());
    let _connection = gateway.spawn();
    scheduler.load(tasks);

    let app = App {
        config_path,
        gateway,
        catalog,
        executor,
        scheduler,
        coordinator,
    };

    println!("🤖 Steward v{}", env!("CARGO_PKG_VERSION"));
    println!("   🔌 Gateway: {}", config.bot.websocket);
    println!("   📂 Config:  {}", app.config_path.display());
    println!("   💾 Records: {}", app.executor.records().dir().display());
    println!("   Type 'help' for commands.\n");

    tokio::select! {
        result = app.console() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    app.scheduler.shutdown();
    tracing::info!("👋 Steward stopped");
    Ok(())
}

impl App {
    /// Read commands from stdin until `exit` or EOF.
    async fn console(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match console::parse(&line) {
                Command::Exit => break,
                command => self.run(command).await,
            }
        }
        Ok(())
    }

    async fn run(&self, command: Command) {
        match command {
            Command::Help => println!("{}", console::HELP),
            Command::Empty => {}
            Command::Unknown(line) => println!("❓ Unknown command: '{line}' (try 'help')"),
            Command::Exit => {}
            Command::Reload => self.reload(),
            Command::Tasks => {
                let entries = self.scheduler.entries();
                println!(
                    "📅 {} task(s), {} timer(s), gateway {}",
                    self.catalog.len(),
                    entries.len(),
                    if self.gateway.is_connected() { "connected" } else { "disconnected" }
                );
                for entry in entries {
                    let next = entry
                        .next_fire
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!("   • {} [{}] next: {next}", entry.name, entry.cron);
                }
            }
            Command::LogsRecent(n) => {
                print_records(&self.executor.records().recent(n));
            }
            Command::LogsTask(name) => {
                print_records(&self.executor.records().task_records(&name, 0));
            }
            Command::LogsExport(name) => match self.executor.records().export(&name, 0) {
                Ok(path) => println!("📤 Exported to {}", path.display()),
                Err(e) => println!("❌ Export failed: {e}"),
            },
            Command::RequestsList => print_requests(&self.coordinator.suspended()),
            Command::RequestsGroup(group_id) => {
                print_requests(&self.coordinator.suspended_for_group(group_id))
            }
            Command::RequestsApprove(flag) => match self.coordinator.approve(&flag).await {
                Ok(req) => println!("✅ Approved {} (user {} → group {})", flag, req.user_id, req.group_id),
                Err(e) => println!("❌ {e}"),
            },
            Command::RequestsReject { flag, reason } => {
                match self.coordinator.reject(&flag, reason.as_deref()).await {
                    Ok(req) => println!("🚫 Rejected {} (user {} → group {})", flag, req.user_id, req.group_id),
                    Err(e) => println!("❌ {e}"),
                }
            }
            Command::RequestsClean => {
                let removed = self.coordinator.cleanup_expired();
                println!("🧹 Removed {removed} expired request(s)");
            }
            Command::RequestsStats => {
                let stats = self.coordinator.stats();
                println!("📊 {} suspended request(s)", stats.total);
                for (group_id, count) in stats.per_group {
                    println!("   • group {group_id}: {count}");
                }
            }
        }
    }

    /// Re-read the config file and replace the task set.
    fn reload(&self) {
        match StewardConfig::load_from(&self.config_path) {
            Ok(config) => {
                let installed = self.scheduler.load(config.tasks());
                println!(
                    "🔄 Reloaded {} task(s), {installed} timer(s). Gateway and safety settings apply after restart.",
                    self.catalog.len()
                );
            }
            Err(e) => {
                tracing::error!("❌ Reload failed, keeping current tasks: {e}");
                println!("❌ Reload failed: {e}");
            }
        }
    }
}

fn print_records(records: &[ExecutionRecord]) {
    if records.is_empty() {
        println!("(no execution records)");
        return;
    }
    for r in records {
        let mark = if r.success { "✅" } else { "❌" };
        println!(
            "{mark} {} {} [{}] {}",
            r.fired_at.format("%Y-%m-%d %H:%M:%S"),
            r.task_name,
            r.task_kind,
            r.detail
        );
        if let Some(error) = &r.error {
            println!("     error: {error}");
        }
    }
}

fn print_requests(requests: &[steward_requests::PendingGroupRequest]) {
    if requests.is_empty() {
        println!("(no suspended requests)");
        return;
    }
    for r in requests {
        println!(
            "⏸️  flag={} group={} user={} at {} reason: {}",
            r.flag,
            r.group_id,
            r.user_id,
            r.received_at.format("%Y-%m-%d %H:%M:%S"),
            r.reason
        );
        if !r.comment.is_empty() {
            println!("     comment: {}", r.comment);
        }
    }
}
