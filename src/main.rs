//! Mio server binary.
//!
//! Composes the service synchronously, then starts the runtime and serves
//! it until SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mio::compose::{ComposeRequest, Composer};
use mio::error::ComposeError;
use mio::lifecycle::{signals, Shutdown};
use mio::modules::ModuleRegistry;
use mio::{HttpServer, ServiceHandle};

#[derive(Parser)]
#[command(name = "mio-server")]
#[command(about = "Compose and serve a Mio application", long_about = None)]
struct Args {
    /// Configuration profile (development, testing, production, default)
    #[arg(short, long)]
    profile: Option<String>,

    /// Project root every configured path must stay under
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration selector, e.g. `config` or `config.prod`
    #[arg(short, long)]
    selector: Option<String>,

    /// Compose without manifest and routes (tooling mode)
    #[arg(long)]
    tooling: bool,
}

fn main() {
    let args = Args::parse();

    let composer = Composer::new(ModuleRegistry::with_builtins());
    let mut request = ComposeRequest::new(&args.root).tooling(args.tooling);
    if let Some(profile) = args.profile {
        request = request.profile(profile);
    }
    if let Some(selector) = args.selector {
        request = request.selector(selector);
    }

    let (handle, logger) = match composer.compose(request) {
        Ok(composed) => composed,
        Err(failure) => {
            // Every other failure was already logged through the composition logger.
            if matches!(failure.error, ComposeError::LoggerInit(_)) {
                eprintln!("mio-server: {failure}");
            }
            std::process::exit(failure.exit_code());
        }
    };

    if let Err(e) = logger.install() {
        eprintln!("mio-server: {e}");
    }

    let env = composer.environment();
    let addr = format!("{}:{}", env.host(), env.port());
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(env.cpu_limit())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            std::process::exit(mio::error::STARTUP_FAILURE_EXIT_CODE);
        }
    };

    let result = runtime.block_on(serve(handle, addr, env.cpu_limit()));

    match result {
        Ok(()) => tracing::info!("Shutdown complete"),
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            std::process::exit(mio::error::STARTUP_FAILURE_EXIT_CODE);
        }
    }
}

async fn serve(handle: ServiceHandle, addr: String, workers: usize) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        instance = %handle.instance_id(),
        workers,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&handle);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::supervise(server_task, signals::shutdown_signal(), &shutdown).await
}
