//! RPC gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                   RPC GATEWAY                     │
//!                     │                                                   │
//!   HTTP/2 RPC ───────┼─▶┌──────────┐    ┌───────────┐    ┌───────────┐  │
//!                     │  │   net    │───▶│ http::mux │───▶│ RpcServer │  │
//!   HTTP/1.1 JSON ────┼─▶│ listener │    └─────┬─────┘    └─────┬─────┘  │
//!                     │  └──────────┘          │                │        │
//!                     │                        ▼                ▼        │
//!                     │                 ┌────────────┐   ┌────────────┐  │
//!                     │                 │  assets +  │   │interceptors│  │
//!                     │                 │ JSON bridge│   │ + handlers │  │
//!                     │                 └─────┬──────┘   └────────────┘  │
//!                     │                       │ loop-back RPC call  ▲    │
//!                     │                       └─────────────────────┘    │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use rpc_gateway::config::load_config;
use rpc_gateway::ComponentFactory;

#[derive(Parser)]
#[command(name = "rpc-gateway")]
#[command(about = "Serve RPC procedures over binary RPC and JSON on one listener", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    debug: bool,

    /// Directory holding the single-page app
    #[arg(long)]
    assets: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.debug {
        return match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to render configuration: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match rpc_gateway::run(config, ComponentFactory::default(), cli.assets).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
