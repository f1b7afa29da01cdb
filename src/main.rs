//! Local LLM failover proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 FAILOVER PROXY                    │
//!                        │                                                   │
//!     Coding assistant   │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!     ───────────────────┼─▶│  http   │──▶│ routing  │──▶│  failover    │   │
//!                        │  │ server  │   │ matcher  │   │ queue walk   │   │
//!                        │  └─────────┘   └──────────┘   └──────┬───────┘   │
//!                        │                                      │           │
//!                        │                     ┌────────────────▼────────┐  │
//!                        │                     │ health store + breaker  │  │
//!                        │                     └────────────────┬────────┘  │
//!                        │                                      ▼           │
//!     Response           │  ┌─────────┐   ┌──────────────────────────────┐  │
//!     ◀──────────────────┼──│response │◀──│ router: timeouts, retries,   │◀─┼── Upstream
//!                        │  │ headers │   │ outcome recording            │  │   provider
//!                        │  └─────────┘   └──────────────────────────────┘  │
//!                        │                                                   │
//!                        │  admin API ──▶ control plane (queues, takeover,   │
//!                        │                tunables, start/stop)              │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use failover_proxy::lifecycle::startup;

#[derive(Parser)]
#[command(name = "failover-proxy")]
#[command(about = "Local failover proxy for LLM API providers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FAILOVER_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    startup::run(args.config).await?;
    Ok(())
}
