use std::{process, sync::Arc};

use restodb::{
    application::{
        checkpoint::CheckpointError,
        context::{AppContext, Repositories},
        error::AppError,
    },
    config,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.render(), source = report.source, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.render(), source = report.source, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Checkpoint(_) => run_checkpoint(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = AppContext::build(
        Repositories::postgres(repositories, &settings.cache),
        &settings.checkpoint,
        &settings.read_path,
    );

    // Pick up whatever an earlier process left pending before taking new work.
    match app.engine.drain_all().await {
        Ok(reports) => {
            let recovered: usize = reports.iter().map(|report| report.committed()).sum();
            info!(recovered, "Startup drain complete");
        }
        Err(CheckpointError::Busy) => {
            info!("Another process is draining the buffer; skipping startup drain");
        }
        Err(err) => return Err(err.into()),
    }

    let scheduler = app.spawn_scheduler(&settings.checkpoint);
    if scheduler.is_none() {
        info!("No checkpoint interval configured; waiting for shutdown");
    }

    let signal = tokio::signal::ctrl_c().await;

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    signal.map_err(|err| AppError::unexpected(format!("failed to listen for ctrl-c: {err}")))?;

    info!("Shutting down");
    Ok(())
}

async fn run_checkpoint(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = AppContext::build(
        Repositories::postgres(repositories, &settings.cache),
        &settings.checkpoint,
        &settings.read_path,
    );

    let reports = app.engine.drain_all().await?;
    let committed: usize = reports.iter().map(|report| report.committed()).sum();
    let failed: usize = reports.iter().map(|report| report.failed.len()).sum();
    info!(runs = reports.len(), committed, failed, "Checkpoint drain finished");

    if let Some(commit_error) = reports.iter().find_map(|report| report.commit_error.clone()) {
        return Err(AppError::unexpected(format!(
            "failed to mark applied entries committed: {commit_error}"
        )));
    }
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}
