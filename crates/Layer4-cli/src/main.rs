//! warden CLI - Main entry point

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Command};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_server::{Runtime, StdioServer, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout 은 프로토콜 전용이라 로그는 stderr 로
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = args
        .resolve_config()
        .context("failed to load configuration")?;

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Tools => {
            let registry = ToolRegistry::with_builtins();
            for tool in registry.schemas() {
                println!(
                    "{:<24} {}",
                    tool["name"].as_str().unwrap_or_default(),
                    tool["description"].as_str().unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: warden_foundation::WardenConfig) -> anyhow::Result<()> {
    let runtime = Runtime::start(config)
        .await
        .context("failed to start runtime")?;
    let server = StdioServer::new(runtime.clone());

    tokio::select! {
        result = server.run_stdio() => {
            result.context("stdio server failed")?;
        }
        _ = shutdown_signal() => {
            info!("Signal received");
            runtime.shutdown().await;
        }
    }

    info!("warden stopped");
    Ok(())
}

/// ctrl-c, unix 에서는 SIGTERM 도
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
