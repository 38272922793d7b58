#![forbid(unsafe_code)]

use std::{process::exit, sync::Arc};

use convection::{
    directory::GravityDirectory,
    notifier::{SmtpConfig, SmtpNotifier},
    partner_submission_service::PartnerSubmissionService,
    repository::{PartnerRepository, PartnerSubmissionRepository, SubmissionRepository},
    utils::daily_time::DailyTime,
};
use serde::Deserialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::macros::time;
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_DAILY_BATCH_AT: DailyTime = DailyTime::new(time!(10:00));

#[derive(Debug, Deserialize)]
struct AppConfig {
    database_url: String,
    gravity_api_url: String,
    gravity_app_token: String,
    consignment_communication_id: String,
    smtp_host: String,
    smtp_port: Option<u16>,
    smtp_username: String,
    smtp_password: String,
    digest_from_email: String,
    daily_batch_at: Option<String>,
    run_daily_batch_once: Option<bool>,
}

#[tracing::instrument]
#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        warn!("Could not load config from .env file: {err}");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(
                    "convection=info"
                        .parse()
                        .expect("Hard-coded default directive should be correct"),
                )
                .from_env_lossy(),
        )
        .init();

    let app_config = match envy::from_env::<AppConfig>() {
        Ok(config) => config,
        Err(err) => {
            error!("Could not load app config: {err}");
            exit(255);
        }
    };

    let daily_batch_at = match app_config.daily_batch_at.as_deref() {
        Some(value) => match value.parse::<DailyTime>() {
            Ok(time) => time,
            Err(err) => {
                error!("Invalid DAILY_BATCH_AT: {err}");
                exit(255);
            }
        },
        None => DEFAULT_DAILY_BATCH_AT,
    };

    let notifier = match SmtpNotifier::new(SmtpConfig {
        host: app_config.smtp_host,
        port: app_config.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
        username: app_config.smtp_username,
        password: app_config.smtp_password,
        from: app_config.digest_from_email,
    }) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!("Could not set up the mailer: {err}");
            exit(255);
        }
    };

    let directory = match GravityDirectory::new(
        &app_config.gravity_api_url,
        app_config.gravity_app_token,
        app_config.consignment_communication_id,
    ) {
        Ok(directory) => directory,
        Err(err) => {
            error!("Could not set up the partner directory: {err}");
            exit(255);
        }
    };

    let db_pool = match setup_database(&app_config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            error!("Could not setup database: {err}");
            exit(255);
        }
    };

    let service = Arc::new(PartnerSubmissionService::new(
        Arc::new(SubmissionRepository::new(db_pool.clone())),
        Arc::new(PartnerRepository::new(db_pool.clone())),
        Arc::new(PartnerSubmissionRepository::new(db_pool.clone())),
        Arc::new(directory),
        Arc::new(notifier),
    ));

    if let Some(true) = app_config.run_daily_batch_once {
        let result = service.daily_batch().await;
        db_pool.close().await;

        match result {
            Ok(report) => info!("Daily batch done: {report:?}"),
            Err(err) => {
                error!("Daily batch failed: {err}");
                exit(1);
            }
        }

        return;
    }

    let shutdown_notify = Arc::new(Notify::new());
    let service_handle = service.start(daily_batch_at, shutdown_notify.clone());

    if let Err(err) = signal::ctrl_c().await {
        error!("Could not listen for Ctrl-C: {err}");
    }

    info!("Ctrl-C received, shutting down");
    shutdown_notify.notify_one();
    if let Err(err) = service_handle.await {
        error!("Service task failed: {err}");
    }
    db_pool.close().await;
}

#[tracing::instrument(skip(url))]
async fn setup_database(url: &str) -> anyhow::Result<SqlitePool> {
    info!("Connecting to SQLite database at {url}");
    let pool = SqlitePoolOptions::new().connect(url).await?;
    info!("Running migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Done!");
    Ok(pool)
}
