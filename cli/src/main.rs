//! tokensync CLI: run the block and token-transfer sync.
//!
//! Usage:
//! ```bash
//! RPC_URL=https://public-en.node.kaia.io tokensync run
//! tokensync info
//! ```
//!
//! Configuration comes from the environment (and `.env` when present).

mod telemetry;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tokensync_core::{KvStore, SyncConfig};
use tokensync_evm::SyncBuilder;
use tokensync_rpc::HttpRpcClient;
use tokensync_storage::{InMemoryStore, SqliteStore};

use crate::telemetry::{init_tracing, LogConfig};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "run" => {
            if let Err(e) = cmd_run().await {
                eprintln!("error: {e:#}");
                process::exit(1);
            }
        }
        "info" => cmd_info(),
        "version" | "--version" | "-V" => {
            println!("tokensync {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("tokensync {}", env!("CARGO_PKG_VERSION"));
    println!("Block and token-transfer ingestion for EVM / Kaia chains\n");
    println!("USAGE:");
    println!("    tokensync <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run      Sync blocks until interrupted (Ctrl-C)");
    println!("    info     Show the resolved configuration");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    dotenvy::dotenv().ok();
    println!("TokenSync v{}", env!("CARGO_PKG_VERSION"));
    match SyncConfig::from_env() {
        Ok(cfg) => {
            println!("  RPC endpoint:     {}", cfg.rpc_url);
            println!("  Store:            {} (table {})", cfg.store_url, cfg.table_name);
            println!("  Chain label:      {}", cfg.chain);
            match cfg.start_block {
                Some(n) => println!("  Start block:      {n}"),
                None => println!("  Start block:      watermark, else chain head"),
            }
            println!("  Block method:     {}", cfg.block_method);
            match cfg.council_interval {
                Some(every) => println!("  Council snapshot: every {}s", every.as_secs()),
                None => println!("  Council snapshot: disabled"),
            }
            println!("  Metadata TTL:     {}s", cfg.metadata_ttl.as_secs());
            println!(
                "  Pacing:           {}ms (floor {}ms, ceiling {}ms, step {}ms)",
                cfg.pacing.baseline.as_millis(),
                cfg.pacing.floor.as_millis(),
                cfg.pacing.ceiling.as_millis(),
                cfg.pacing.step.as_millis()
            );
        }
        Err(e) => println!("  Configuration:    {e}"),
    }
    println!("  Storage backends: memory, SQLite");
    println!("  Token standards:  ERC-20, ERC-721, ERC-1155, KIP-37");
}

async fn open_store(cfg: &SyncConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    if cfg.store_url == "memory" {
        tracing::warn!("using the in-memory store; nothing will be persisted");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let store = SqliteStore::open(&cfg.store_url, &cfg.table_name)
        .await
        .with_context(|| format!("opening store {}", cfg.store_url))?;
    Ok(Arc::new(store))
}

async fn cmd_run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&LogConfig::from_env());

    let config = SyncConfig::from_env().context("loading configuration")?;
    let transport = HttpRpcClient::default_for(config.rpc_url.clone())
        .with_context(|| format!("creating RPC client for {}", config.rpc_url))?;
    let store = open_store(&config).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            on_signal.cancel();
        }
    });

    let mut driver = SyncBuilder::from_config(config).build(Arc::new(transport), store)?;
    driver.run(cancel).await?;
    Ok(())
}
