use std::{process, sync::Arc};

use townsfolk::{
    application::{
        directory::{DirectoryService, DirectorySources},
        error::AppError,
        media::{CachedMediaUrls, PublicMediaUrls},
        repos::{GeoSummaryService, HomepageRepo, PeopleRepo, PermissionResolver, TownsRepo},
    },
    cache::{CacheConfig, CacheManager},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let cache = Arc::new(CacheManager::init(&CacheConfig::from(&settings.cache)).await);
    let directory = Arc::new(build_directory(&repositories, Arc::clone(&cache), &settings));

    let state = HttpState {
        directory,
        db: Some((*repositories).clone()),
    };
    let result = serve_http(&settings, state).await;

    cache.shutdown();
    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;
    info!(target = "townsfolk::migrate", "migrations applied");
    Ok(())
}

async fn connect_pool(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = connect_pool(settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_directory(
    repositories: &Arc<PostgresRepositories>,
    cache: Arc<CacheManager>,
    settings: &config::Settings,
) -> DirectoryService {
    let towns: Arc<dyn TownsRepo> = repositories.clone();
    let people: Arc<dyn PeopleRepo> = repositories.clone();
    let homepage: Arc<dyn HomepageRepo> = repositories.clone();
    let geo: Arc<dyn GeoSummaryService> = repositories.clone();
    let permissions: Arc<dyn PermissionResolver> = repositories.clone();
    let media = Arc::new(CachedMediaUrls::new(
        PublicMediaUrls::new(settings.media.base_url.clone()),
        settings.media.url_cache_capacity,
    ));

    DirectoryService::new(
        cache,
        DirectorySources {
            towns,
            people,
            homepage,
            geo,
            media,
            permissions,
        },
    )
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(());
        },
    );

    let server = tokio::spawn(async move { server.await });
    let server_abort = server.abort_handle();

    // Bound the drain once a signal arrives.
    tokio::spawn(async move {
        if shutdown_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
            warn!(
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; aborting open connections"
            );
            server_abort.abort();
        }
    });

    match server.await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(join) if join.is_cancelled() => Ok(()),
        Err(join) => Err(AppError::unexpected(format!("server task failed: {join}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
