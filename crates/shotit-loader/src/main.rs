use std::{process, sync::Arc};

use shotit_loader::cli::{Cli, Commands, InitCollectionArgs, LoadArgs, RunArgs};
use shotit_loader::error::AppError;
use shotit_loader::pipeline::Job;
use shotit_loader::services::{
    JobChannel, JobOutcome, WorkerDeps, ensure_collection, flush_once, run_scheduled_flush,
    spawn_unit,
};
use shotit_loader::{config, server, shutdown};
use shotit_store::{CollectionSchema, StoreConnector};
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command {
        Some(_) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        None => LevelFilter::WARN,
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Run(args)) => run_worker(args).await?,
        Some(Commands::Load(args)) => run_load(args).await?,
        Some(Commands::Flush(_)) => run_flush().await?,
        Some(Commands::InitCollection(args)) => run_init_collection(args).await?,
        None => Cli::print_help(),
    }
    Ok(())
}

async fn run_worker(args: RunArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let connector: Arc<dyn StoreConnector> = Arc::new(config.store.clone());
    let deps = Arc::new(WorkerDeps::new(
        config.media.clone(),
        connector.clone(),
        config.worker.clone(),
    ));
    let channel = JobChannel::new(deps.clone())?;

    let (trigger, shutdown) = shutdown::channel();

    let maintenance = if config.maintenance.enabled && !args.no_maintenance {
        let schedule = config.maintenance.schedule()?;
        Some(tokio::spawn(run_scheduled_flush(
            connector.clone(),
            config.worker.collection.clone(),
            schedule,
            shutdown.clone(),
        )))
    } else {
        None
    };

    let health = config.server.enabled.then(|| {
        tokio::spawn(server::serve(
            config.server.clone(),
            deps.status.clone(),
            shutdown.clone(),
        ))
    });

    let _signals = trigger.trigger_on_signal();

    tracing::info!(
        url = %channel.url(),
        collection = %config.worker.collection,
        dimension = config.worker.dimension,
        "load worker starting"
    );
    channel.run(shutdown).await;

    if let Some(handle) = maintenance {
        handle.await?;
    }
    if let Some(handle) = health {
        handle.await??;
    }
    tracing::info!(status = ?deps.status.snapshot(), "load worker stopped");
    Ok(())
}

async fn run_load(args: LoadArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let job = Job::parse(serde_json::json!({ "file": args.file }).to_string())?;
    let deps = Arc::new(WorkerDeps::new(
        config.media,
        Arc::new(config.store),
        config.worker,
    ));

    let (job, outcome) = spawn_unit(job, deps)?.wait().await;
    match outcome {
        JobOutcome::Loaded { frames, inserted } => {
            tracing::info!(job = %job, frames, inserted, "job loaded");
            Ok(())
        }
        JobOutcome::Rejected { reason } => Err(AppError::Rejected {
            job: job.to_string(),
            reason,
        }),
    }
}

async fn run_flush() -> Result<(), AppError> {
    let config = config::load()?;
    flush_once(&config.store, &config.worker.collection).await?;
    Ok(())
}

async fn run_init_collection(args: InitCollectionArgs) -> Result<(), AppError> {
    let config = config::load()?;
    if !args.yes {
        return Err(AppError::ConfirmationRequired(config.worker.collection));
    }
    let store = config.store.connect()?;
    let schema = CollectionSchema::frame_index(&config.worker.collection, config.worker.dimension);
    ensure_collection(store.as_ref(), &schema).await?;
    Ok(())
}
