use std::{process, sync::Arc};

use docvault::{
    application::{
        auth::{AuthPolicy, UserService},
        documents::DocumentService,
        error::AppError,
        repos::{BlobStore, DocumentsRepo, TokensRepo, UsersRepo},
    },
    cache::{CacheConfig, DocumentCache, TtlDocumentCache},
    config,
    infra::{
        blobs::FsBlobStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState, HttpLimits},
        telemetry,
    },
};
use tokio::signal;
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

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect_repositories(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(InfraError::from)?;
    info!(target = "docvault::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect_repositories(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(InfraError::from)?;

    let state = build_app_state(repositories, &settings)?;
    serve_http(&settings, state).await
}

async fn connect_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_app_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<AppState, AppError> {
    let documents_repo: Arc<dyn DocumentsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let tokens_repo: Arc<dyn TokensRepo> = repositories;

    let blobs: Arc<dyn BlobStore> = Arc::new(
        FsBlobStore::new(settings.storage.directory.clone()).map_err(InfraError::from)?,
    );
    let cache: Arc<dyn DocumentCache> =
        Arc::new(TtlDocumentCache::new(&CacheConfig::from(&settings.cache)));

    let token_ttl = time::Duration::try_from(settings.auth.token_ttl)
        .map_err(|err| InfraError::configuration(format!("auth.token_ttl_hours: {err}")))?;
    let policy = AuthPolicy {
        admin_token: settings.auth.admin_token.clone(),
        token_ttl,
        password_cost: settings.auth.password_cost,
    };
    if policy.admin_token.is_none() {
        warn!(
            target = "docvault::auth",
            "auth.admin_token is not set; registration is disabled"
        );
    }

    Ok(AppState {
        documents: Arc::new(DocumentService::new(documents_repo, blobs, cache)),
        users: Arc::new(UserService::new(users_repo, tokens_repo, policy)),
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let limits = HttpLimits {
        max_request_bytes: settings.storage.body_limit(),
        request_timeout: settings.server.request_timeout,
    };
    let router = http::build_router(state, limits);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(target = "docvault::http", %addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    // Bound the drain phase: once the signal fires, in-flight requests get `grace` to finish.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "docvault::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "docvault::http", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "docvault::http", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "docvault::http", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
