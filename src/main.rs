use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use flowcap::backend::create_path_io;
use flowcap::cli::args::{Cli, Commands, LimitArgs, ServeArgs};
use flowcap::config::paths::flowcap_config_dir;
use flowcap::config::types::{ThrottleConfig, Verbosity};
use flowcap::error::FlowError;
use flowcap::net::data::{fetch, serve_file};
use flowcap::progress::bar::create_transfer_progress;
use flowcap::transfer::copy::copy_file;
use flowcap::transfer::group::GlobalThrottles;

fn main() {
    let cli = Cli::parse();

    // Convert CLI flags to verbosity level
    let verbosity = Verbosity::from((cli.quiet, cli.verbose));

    // RUST_LOG env var overrides CLI flags
    let filter = verbosity.as_tracing_filter();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr) // Keep stdout clean for output
        .init();

    tracing::debug!("Verbosity level: {:?}", verbosity);

    if let Err(err) = run(cli) {
        display_error(&err);
        std::process::exit(1);
    }
}

/// Execute the dispatched command on a single-threaded runtime.
fn run(cli: Cli) -> Result<(), FlowError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Cp(args) => {
            let config = load_config(cli.config.as_deref(), &args.limits)?;
            let globals = GlobalThrottles::from_config(&config);
            let progress = create_transfer_progress(None, quiet);
            let stats = rt.block_on(copy_file(
                create_path_io(config.storage_rate),
                &args.source,
                &args.dest,
                &config,
                &globals,
                &progress,
                &CancellationToken::new(),
            ))?;
            progress.finish_and_clear();
            stats.print_summary(quiet);
            Ok(())
        }
        Commands::Serve(args) => {
            let config = load_config(cli.config.as_deref(), &args.limits)?;
            rt.block_on(serve(args, config, quiet))
        }
        Commands::Fetch(args) => {
            let config = load_config(cli.config.as_deref(), &args.limits)?;
            let globals = GlobalThrottles::from_config(&config);
            let progress = create_transfer_progress(None, quiet);
            let stats = rt.block_on(fetch(
                &args.addr,
                &args.dest,
                create_path_io(config.storage_rate),
                &config,
                &globals,
                &progress,
                &CancellationToken::new(),
            ))?;
            progress.finish_and_clear();
            stats.print_summary(quiet);
            Ok(())
        }
    }
}

/// Serve a file until Ctrl+C.
async fn serve(args: ServeArgs, config: ThrottleConfig, quiet: bool) -> Result<(), FlowError> {
    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|e| FlowError::ConnectionFailed {
            host: args.bind.clone(),
            reason: format!("cannot listen: {}", e),
        })?;
    let local_addr = listener.local_addr()?;
    if !quiet {
        eprintln!("Serving {} on {}", args.file.display(), local_addr);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let globals = GlobalThrottles::from_config(&config);
    serve_file(
        listener,
        args.file,
        create_path_io(config.storage_rate),
        config,
        globals,
        cancel,
    )
    .await
}

/// Load the config file (explicit or default location) and apply CLI flags.
fn load_config(
    explicit: Option<&std::path::Path>,
    limits: &LimitArgs,
) -> Result<ThrottleConfig, FlowError> {
    let mut config = match explicit {
        Some(path) => ThrottleConfig::load(path)?,
        None => ThrottleConfig::load_or_default(&flowcap_config_dir()?)?,
    };
    limits.apply(&mut config);
    config.validate()?;
    tracing::debug!(?config, "Effective configuration");
    Ok(config)
}

/// Display a FlowError with optional suggestion hint to stderr.
fn display_error(err: &FlowError) {
    eprintln!("error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {}", suggestion);
    }
}
