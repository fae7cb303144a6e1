//! Thin HTTP client over `repl-daemon`'s control-plane surface. Mirrors
//! `START SLAVE` / `STOP SLAVE` / `CHANGE MASTER TO` / `RESET SLAVE` /
//! `SHOW SLAVE STATUS` / `skip-errors` as subcommands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "repl-cli")]
#[command(about = "Replication slave control client", long_about = None)]
struct Cli {
    /// Base URL of the repl-daemon instance to talk to.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8911")]
    daemon_url: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// START SLAVE [IO_THREAD|SQL_THREAD]
    Start {
        #[arg(long)]
        io_only: bool,
        #[arg(long)]
        sql_only: bool,
    },

    /// STOP SLAVE [IO_THREAD|SQL_THREAD]
    Stop {
        #[arg(long)]
        io_only: bool,
        #[arg(long)]
        sql_only: bool,
    },

    /// CHANGE MASTER TO ...
    ChangeMaster {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        auto_position: Option<bool>,
        #[arg(long)]
        log_file: Option<String>,
        #[arg(long)]
        log_pos: Option<u64>,
    },

    /// RESET SLAVE [ALL]
    Reset {
        /// Purge relay log files too (RESET SLAVE ALL).
        #[arg(long)]
        purge: bool,
    },

    /// SHOW SLAVE STATUS
    ShowSlaveStatus,

    /// Set the skip-errors policy: "all", "ddl_exist_errors", or a
    /// comma-separated list of error codes.
    SetSkipErrors {
        spec: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.cmd {
        Commands::Start { io_only, sql_only } => {
            let body = thread_mask_body(io_only, sql_only);
            post(&client, &cli.daemon_url, "/v1/start", &body).await?;
            println!("started");
        }
        Commands::Stop { io_only, sql_only } => {
            let body = thread_mask_body(io_only, sql_only);
            let resp = post(&client, &cli.daemon_url, "/v1/stop", &body).await?;
            println!("{resp}");
        }
        Commands::ChangeMaster { host, port, user, auto_position, log_file, log_pos } => {
            let body = json!({
                "master_host": host,
                "master_port": port,
                "master_user": user,
                "master_auto_position": auto_position,
                "master_log_file": log_file,
                "master_log_pos": log_pos,
            });
            let resp = post(&client, &cli.daemon_url, "/v1/change-master", &body).await?;
            println!("{resp}");
        }
        Commands::Reset { purge } => {
            let body = json!({ "purge": purge });
            let resp = post(&client, &cli.daemon_url, "/v1/reset", &body).await?;
            println!("{resp}");
        }
        Commands::ShowSlaveStatus => {
            let url = format!("{}/v1/status", cli.daemon_url);
            let resp: Value = client.get(url).send().await.context("GET /v1/status")?.json().await.context("decode status response")?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::SetSkipErrors { spec } => {
            let body = json!({ "spec": spec });
            post(&client, &cli.daemon_url, "/v1/set-skip-errors", &body).await?;
            println!("skip-errors updated");
        }
    }

    Ok(())
}

fn thread_mask_body(io_only: bool, sql_only: bool) -> Value {
    if io_only {
        json!({ "io": true, "sql": false })
    } else if sql_only {
        json!({ "io": false, "sql": true })
    } else {
        json!({})
    }
}

async fn post(client: &reqwest::Client, base: &str, path: &str, body: &Value) -> Result<String> {
    let url = format!("{base}{path}");
    let response = client.post(url).json(body).send().await.with_context(|| format!("POST {path}"))?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() && status.as_u16() != 409 && status.as_u16() != 504 {
        anyhow::bail!("{path} failed: {status}: {text}");
    }
    Ok(if text.is_empty() { status.to_string() } else { text })
}
