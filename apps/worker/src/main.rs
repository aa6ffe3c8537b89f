//! Rolesync reconcile worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rolesync_application::{
    BatchSummary, ReconcileQueueService, RetryPolicy, RoleReconcileService,
};
use rolesync_core::{AppError, AppResult};
use rolesync_infrastructure::{
    AwsCallerIdentityProvider, AwsIamRoleGateway, InMemoryIamService,
    PostgresReconcileEventSink, PostgresReconcileRequestQueue, PostgresRoleSpecRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const IN_MEMORY_ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IamBackend {
    Aws,
    InMemory,
}

impl IamBackend {
    fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "memory" => Ok(Self::InMemory),
            other => Err(AppError::Validation(format!(
                "invalid WORKER_IAM_BACKEND value '{other}', expected 'aws' or 'memory'"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::InMemory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    worker_id: String,
    iam_backend: IamBackend,
    claim_limit: usize,
    lease_seconds: u32,
    poll_interval_ms: u64,
    reconcile_timeout_seconds: u64,
    resync_interval_seconds: u64,
    retry_base_seconds: u32,
    retry_max_seconds: u32,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_and_migrate(config.database_url.as_str()).await?;
    let queue_service = build_queue_service(&config, pool).await;
    let mut shutdown = shutdown_signal();

    info!(
        worker_id = %config.worker_id,
        iam_backend = config.iam_backend.as_str(),
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        reconcile_timeout_seconds = config.reconcile_timeout_seconds,
        resync_interval_seconds = config.resync_interval_seconds,
        "rolesync-worker started"
    );

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let resync_interval = Duration::from_secs(config.resync_interval_seconds);
    let reconcile_timeout = Duration::from_secs(config.reconcile_timeout_seconds);
    let mut last_resync: Option<Instant> = None;

    while !*shutdown.borrow() {
        if last_resync.is_none_or(|at| at.elapsed() >= resync_interval) {
            match queue_service.enqueue_resync().await {
                Ok(enqueued) => {
                    info!(worker_id = %config.worker_id, enqueued, "enqueued role resync");
                    last_resync = Some(Instant::now());
                }
                Err(error) => {
                    warn!(
                        worker_id = %config.worker_id,
                        error = %error,
                        "failed to enqueue role resync"
                    );
                }
            }
        }

        let idle = match queue_service
            .run_batch(
                config.worker_id.as_str(),
                config.claim_limit,
                config.lease_seconds,
                reconcile_timeout,
            )
            .await
        {
            Ok(summary) => {
                log_batch(config.worker_id.as_str(), summary);
                summary.claimed == 0
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim reconcile requests"
                );
                true
            }
        };

        if idle {
            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    info!(worker_id = %config.worker_id, "rolesync-worker stopped");
    Ok(())
}

fn log_batch(worker_id: &str, summary: BatchSummary) {
    if summary.claimed == 0 {
        return;
    }

    info!(
        worker_id,
        claimed = summary.claimed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        discarded = summary.discarded,
        lost = summary.lost,
        "reconcile batch finished"
    );
}

fn shutdown_signal() -> watch::Receiver<bool> {
    let (sender, receiver) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for shutdown signal");
            // Keep the sender alive so the idle wait does not spin.
            std::future::pending::<()>().await;
        }

        info!("shutdown requested, finishing current batch");
        sender.send_replace(true);
    });

    receiver
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

async fn build_queue_service(config: &WorkerConfig, pool: PgPool) -> ReconcileQueueService {
    let spec_repository = Arc::new(PostgresRoleSpecRepository::new(pool.clone()));
    let event_sink = Arc::new(PostgresReconcileEventSink::new(pool.clone()));
    let queue = Arc::new(PostgresReconcileRequestQueue::new(pool));

    let reconcile_service = match config.iam_backend {
        IamBackend::Aws => {
            let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            RoleReconcileService::new(
                spec_repository,
                Arc::new(AwsIamRoleGateway::new(aws_sdk_iam::Client::new(&sdk_config))),
                Arc::new(AwsCallerIdentityProvider::new(aws_sdk_sts::Client::new(
                    &sdk_config,
                ))),
                event_sink,
            )
        }
        IamBackend::InMemory => {
            let iam = Arc::new(InMemoryIamService::new(IN_MEMORY_ACCOUNT_ID));
            RoleReconcileService::new(spec_repository, iam.clone(), iam, event_sink)
        }
    };

    ReconcileQueueService::new(
        queue,
        reconcile_service,
        RetryPolicy::new(config.retry_base_seconds, config.retry_max_seconds),
    )
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let iam_backend = match env::var("WORKER_IAM_BACKEND") {
            Ok(value) => IamBackend::parse(value.as_str())?,
            Err(_) => IamBackend::Aws,
        };
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 10)?;
        let lease_seconds = parse_env_u32("WORKER_LEASE_SECONDS", 60)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1500)?;
        let reconcile_timeout_seconds = parse_env_u64("WORKER_RECONCILE_TIMEOUT_SECONDS", 45)?;
        let resync_interval_seconds = parse_env_u64("WORKER_RESYNC_INTERVAL_SECONDS", 300)?;
        let retry_base_seconds = parse_env_u32("WORKER_RETRY_BASE_SECONDS", 5)?;
        let retry_max_seconds = parse_env_u32("WORKER_RETRY_MAX_SECONDS", 300)?;

        for (name, value) in [
            ("WORKER_CLAIM_LIMIT", u64::try_from(claim_limit).unwrap_or(u64::MAX)),
            ("WORKER_LEASE_SECONDS", u64::from(lease_seconds)),
            ("WORKER_POLL_INTERVAL_MS", poll_interval_ms),
            ("WORKER_RECONCILE_TIMEOUT_SECONDS", reconcile_timeout_seconds),
            ("WORKER_RESYNC_INTERVAL_SECONDS", resync_interval_seconds),
            ("WORKER_RETRY_BASE_SECONDS", u64::from(retry_base_seconds)),
            ("WORKER_RETRY_MAX_SECONDS", u64::from(retry_max_seconds)),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if retry_max_seconds < retry_base_seconds {
            return Err(AppError::Validation(
                "WORKER_RETRY_MAX_SECONDS must not be lower than WORKER_RETRY_BASE_SECONDS"
                    .to_owned(),
            ));
        }

        if reconcile_timeout_seconds >= u64::from(lease_seconds) {
            return Err(AppError::Validation(
                "WORKER_RECONCILE_TIMEOUT_SECONDS must be lower than WORKER_LEASE_SECONDS"
                    .to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            worker_id,
            iam_backend,
            claim_limit,
            lease_seconds,
            poll_interval_ms,
            reconcile_timeout_seconds,
            resync_interval_seconds,
            retry_base_seconds,
            retry_max_seconds,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
