use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use cmdledger::config::{AppConfig, StoreBackend};
use cmdledger::exec::ExecService;
use cmdledger::forward::HistoryClient;
use cmdledger::rpc::ExecCmdResponse;

#[derive(Parser)]
#[command(
    name = "cmdledger",
    about = "Remote shell command execution with a history audit trail",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $CMDLEDGER_CONFIG, then /etc/cmdledger/cmdledger.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the executor HTTP service (POST /exec-cmd)
    ServeExec {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Comma-separated history store instances; empty disables forwarding
        #[arg(long, env = "CMDLEDGER_STORE_INSTANCES")]
        store_instances: Option<String>,
    },

    /// Start the history store HTTP service (POST /store, POST /get-from-to)
    ServeStore {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Persist to this SQLite file instead of memory
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Execute one command locally and print the outcome as JSON
    Run {
        /// Forward the outcome to these store instances (comma-separated)
        #[arg(long, env = "CMDLEDGER_STORE_INSTANCES")]
        store_instances: Option<String>,

        /// The command line; words are joined with single spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },

    /// Query a history store
    History {
        /// Store instance to query
        #[arg(long, default_value = "127.0.0.1:8081")]
        store: String,

        /// Window start, exclusive (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Window end, exclusive (RFC 3339); defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    cmdledger::init_tracing(&config.logging);

    match cli.command {
        Commands::ServeExec {
            bind,
            store_instances,
        } => {
            if let Some(bind) = bind {
                config.exec.listen_address = bind;
            }
            if let Some(list) = store_instances {
                config.forward.set_instances(&list);
            }
            tracing::info!(
                bind = %config.exec.listen_address,
                instances = ?config.forward.instances,
                "Starting executor"
            );
            cmdledger::serve_exec(&config).await?;
        }
        Commands::ServeStore { bind, db } => {
            if let Some(bind) = bind {
                config.store.listen_address = bind;
            }
            if let Some(db) = db {
                config.store.backend = StoreBackend::Sqlite;
                config.store.db_path = db;
            }
            tracing::info!(
                bind = %config.store.listen_address,
                backend = ?config.store.backend,
                "Starting history store"
            );
            cmdledger::serve_store(&config).await?;
        }
        Commands::Run {
            store_instances,
            cmd,
        } => {
            if let Some(list) = store_instances {
                config.forward.set_instances(&list);
            }
            let (service, _) = cmdledger::build_exec_service(&config)?;
            let outcome = service.exec_cmd(&cmd.join(" ")).await;

            let response = ExecCmdResponse {
                std_out: outcome.stdout,
                std_err: outcome.stderr,
                exit_code: outcome.exit_code,
                err: outcome.error.map(|e| e.to_string()),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::History { store, from, to } => {
            let client = HistoryClient::new(&store)?;
            let records = match (from, to) {
                (None, None) => client.get_all().await?,
                (from, to) => {
                    let from = from.unwrap_or(DateTime::UNIX_EPOCH);
                    let to = to.unwrap_or_else(Utc::now);
                    client.get_from_to(from, to).await?
                }
            };

            if records.is_empty() {
                println!("No records found.");
            } else {
                println!("{:<32} | {:<7} | {:>4} | Command", "Executed at", "OK", "Exit");
                println!("{:-<32}-|-{:-<7}-|-{:->4}-|-{:-<30}", "", "", "", "");
                for r in &records {
                    println!(
                        "{:<32} | {:<7} | {:>4} | {}",
                        r.timestamp_exec.to_rfc3339(),
                        r.success,
                        r.exit_code,
                        r.cmd
                    );
                }
            }
        }
    }

    Ok(())
}
