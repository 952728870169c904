//! nvstream - real-time GPU telemetry broadcaster
//!
//! Samples an NVIDIA GPU and pushes each snapshot to WebSocket subscribers.

use std::sync::Arc;

use clap::Parser;
use nvstream::cli::args::{generate_completions, Cli, Commands};
use nvstream::config::ConfigBuilder;
use nvstream::error::{AppError, ConfigError};
use nvstream::nvml::NvmlSource;
use nvstream::server::{self, AppState};
use nvstream::services::{Broadcaster, LifecycleController};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate_completions(*shell);
            Ok(())
        }
        _ => run_serve(cli),
    }
}

fn run_serve(cli: &Cli) -> Result<(), AppError> {
    let args = cli.serve_args().unwrap_or_default();

    let config = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_gpu_index(args.gpu)
        .with_interval_ms(args.interval_ms)
        .with_channels(args.channels)
        .with_host(args.host)
        .with_port(args.port)
        .build()?;
    let addr = config.bind_addr()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    // Bind before touching the device so a busy port leaves NVML alone
    let listener = runtime.block_on(server::bind(addr))?;

    let broadcaster = Arc::new(Broadcaster::new(config.server.subscriber_buffer));
    let mut controller = LifecycleController::start(
        NvmlSource::new(),
        config.device.index,
        config.sampler_config(),
        Arc::clone(&broadcaster),
    );
    log::info!("Telemetry mode: {}", controller.mode());

    let state = AppState::new(broadcaster, config.sampling.channels.clone());
    let result = runtime.block_on(server::serve(listener, state, server::shutdown_signal()));

    controller.shutdown();
    result?;
    Ok(())
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Config(ConfigError::FileNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Pass --config with an existing file or unset NVSTREAM_CONFIG.");
        }
        AppError::Config(ConfigError::InvalidValue { .. }) => {
            eprintln!();
            eprintln!("Hint: Check the [device], [sampling] and [server] sections.");
        }
        AppError::Io(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            eprintln!();
            eprintln!("Hint: Another process is using the port. Try --port.");
        }
        _ => {}
    }
}
