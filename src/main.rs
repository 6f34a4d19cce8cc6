use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tumor_scan::{
    config::{Config, DEFAULT_ARCHIVE, DEFAULT_ARTIFACT},
    web::serve,
};

#[derive(Parser)]
#[command(name = "tumor-scan")]
#[command(about = "MRI brain tumor screening service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8501")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Serialized classifier file name (.json or .onnx)
    #[arg(long, default_value = DEFAULT_ARTIFACT)]
    artifact: String,

    /// Zip archive holding the classifier, extracted on first run
    #[arg(long, default_value = DEFAULT_ARCHIVE)]
    archive: String,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting brain tumor detection service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    let config = Config::new(
        args.bind,
        args.models_dir,
        args.artifact,
        Some(args.archive),
        args.workers,
        args.dev,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
