use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prefix_migrate::{
    AppError, Cli, Config, MigrationRequest, S3Config, S3ObjectStorage, execute_migration,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries narration and the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prefix_migrate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.error_code(), error = %e, "Prefix migration failed");
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env()?;
    let s3_config = S3Config::from_env()?;

    // All argument checks happen before the store is touched
    let request = MigrationRequest::from_options(cli.into_options(), s3_config.bucket.as_deref())?;

    let storage = Arc::new(S3ObjectStorage::new(s3_config).await?);
    info!(
        bucket = %request.bucket,
        endpoint = storage.config().endpoint.as_deref().unwrap_or("aws"),
        "Object storage client ready"
    );

    execute_migration(storage, &config, request).await?;
    Ok(())
}
