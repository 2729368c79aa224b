use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wanrelay::{daemon, start_ipc_server, Args, RelayConfig, RelayError};

fn main() -> ExitCode {
    let args = Args::parse();

    // Forking has to happen while the process is still single-threaded,
    // so the runtime is only built afterwards.
    if args.detach {
        if let Err(e) = daemon::daemonize() {
            eprintln!("daemonize: {}", e);
            return ExitCode::FAILURE;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), RelayError> {
    let config = RelayConfig::from_args(args).with_env_overrides()?;
    tracing::debug!("Configuration: {:?}", config);

    let task = start_ipc_server(&config)?;

    // The dispatch loop never returns; the process ends on a signal.
    task.await
        .map_err(|e| RelayError::Critical(e.to_string()))?;
    Err(RelayError::Critical("dispatch loop exited".to_string()))
}
