use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use simbridge::cli::{self, Command, RunArgs};
use simbridge::config::{Config, ConfigError};
use simbridge::dispatch::{Dispatcher, Namespace};
use simbridge::net::TcpTransport;
use simbridge::script::{CallScanner, Interpreter};
use simbridge::server::Server;
use simbridge::store::SharedStore;

fn main() -> ExitCode {
    let args = match cli::parse_argv(std::env::args_os()) {
        Ok(a) => a,
        Err(e) => {
            // clap renders help/version through the same path.
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("simbridge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    let (config, warnings) = command.endpoint().resolve()?;
    let quiet = matches!(&command, Command::Run(args) if args.quiet);
    init_logging(quiet || !config.logging);
    report_config_warnings(&warnings);

    match command {
        Command::Serve(_) => serve(config),
        Command::Run(args) => run_script(&args, config),
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn report_config_warnings(warnings: &[ConfigError]) {
    for w in warnings {
        warn!("config: {w}");
    }
}

// ── Roles ─────────────────────────────────────────────────────────────────────

fn serve(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;

    runtime.block_on(serve_until_interrupted(config))
}

async fn serve_until_interrupted(config: Config) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(SharedStore::new(), Namespace::with_stock_procedures())
        .with_prefix(config.prefix.clone());
    let mut server = Server::bind((config.host.as_str(), config.port), dispatcher)
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?
        .with_max_frame(config.max_frame);

    tokio::select! {
        result = server.run() => result.context("accept loop failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

fn run_script(args: &RunArgs, config: Config) -> anyhow::Result<()> {
    let src = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;

    let transport = TcpTransport::connect(&config.host, config.port)
        .context("is the server running?")?
        .with_max_frame(config.max_frame);

    let mut interp = Interpreter::with_scanner(transport, CallScanner::new(config.prefix));
    interp.output_sink = Some(Arc::new(|line: &str| println!("{line}")));
    interp.run_script(&src);

    if !interp.failures.is_empty() {
        info!("{} statement(s) failed and were skipped", interp.failures.len());
    }
    interp.transport_mut().close();
    Ok(())
}
