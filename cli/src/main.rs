use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use syncbridge_cli::commands::cli::{self, Commands, ServeArgs};
use syncbridge_cli::commands::{call, serve};
use syncbridge_cli::error::CliError;
use syncbridge_core::api::{AppConfig, LoggingConfig, SurfaceSet, SyncBridge, COMMANDS};
use syncbridge_core::config::{apply_env_overrides, load_default, load_from_file};
use syncbridge_plugins::factory;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let (cfg, ignored_overrides) = load_config(&args)?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;
    for msg in &ignored_overrides {
        tracing::warn!("{}", msg);
    }

    if let Some(Commands::Commands) = args.command {
        for name in COMMANDS {
            println!("{name}");
        }
        return Ok(0);
    }

    let engine = factory::build_engine(&cfg)
        .await
        .map_err(CliError::Startup)?;
    let surfaces = Arc::new(SurfaceSet::new());
    let mut events_out_task = None;
    if let Some((surface, task)) = factory::build_events_out(&cfg.events_out)
        .await
        .map_err(CliError::Startup)?
    {
        surfaces.open(surface);
        events_out_task = Some(task);
    }

    let bridge = Arc::new(SyncBridge::new(engine, surfaces.clone(), &cfg.conflict));
    bridge.initialize();

    let result = match args.command {
        Some(Commands::Call(call_args)) => call::run_call(&bridge, &call_args).await,
        Some(Commands::Serve(serve_args)) => serve::run_serve(bridge.clone(), &serve_args).await,
        _ => serve::run_serve(bridge.clone(), &ServeArgs::default()).await,
    };

    bridge.destroy();
    drop(bridge);
    // closing every surface drops the last events_out writer handle
    for surface in surfaces.snapshot() {
        surfaces.close(surface.id());
    }
    if let Some(task) = events_out_task {
        let _ = task.await;
    }
    result
}

/// Config plus the env overrides that were ignored, to be logged once
/// tracing is up.
fn load_config(args: &cli::Args) -> Result<(AppConfig, Vec<String>), CliError> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => load_from_file(Path::new(path))
            .map_err(|e| CliError::Config(format!("{path}: {e}")))?,
        None => load_default().map_err(|e| CliError::Config(e.to_string()))?,
    };
    let ignored = apply_env_overrides(&mut cfg);

    if let Some(dir) = args.data_dir.as_deref() {
        cfg.engine.data_dir = dir.to_string();
    }
    if let Some(secs) = args.conflict_timeout_secs {
        if secs == 0 {
            return Err(CliError::Config(
                "conflict timeout must be at least one second".to_string(),
            ));
        }
        cfg.conflict.timeout_secs = secs;
    }
    Ok((cfg, ignored))
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("syncbridge"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("syncbridge.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    // stdout carries the protocol, so console logs always go to stderr
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
