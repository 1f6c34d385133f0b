//! Backend creation and utility functions.

use std::sync::Arc;

use positioning::{
    Instance, Registry,
    backend::database::{Postgres, Sqlite},
    config::{EntityType, PositionedOptions},
};

use crate::cli::{Backend, BackendConfig, ColumnArgs};

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

/// Human-readable description of the configured backend
pub fn backend_label(config: &BackendConfig) -> String {
    match config.backend {
        Backend::Sqlite => match &config.database {
            Some(path) => format!("sqlite ({})", path.display()),
            None => "sqlite".to_string(),
        },
        Backend::Postgres => match &config.postgres_url {
            Some(url) => format!("postgres ({})", redact_postgres_url(url)),
            None => "postgres".to_string(),
        },
    }
}

/// Connect to the configured backend
pub async fn create_backend(
    config: &BackendConfig,
) -> Result<Arc<dyn positioning::backend::Backend>, Box<dyn std::error::Error>> {
    match config.backend {
        Backend::Sqlite => {
            let path = config
                .database
                .as_ref()
                .ok_or("SQLite backend requires --database or POSITIONING_DATABASE")?;
            if !path.exists() {
                return Err(format!("SQLite database {} does not exist", path.display()).into());
            }
            tracing::info!("Using SQLite backend at {}", path.display());
            Ok(Arc::new(Sqlite::open_sqlite(path).await?))
        }
        Backend::Postgres => {
            let url = config
                .postgres_url
                .as_ref()
                .ok_or("PostgreSQL backend requires --postgres-url or POSITIONING_POSTGRES_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!("Connecting to PostgreSQL backend at {}", display_url);

            match Postgres::connect_postgres(url).await {
                Ok(backend) => {
                    tracing::info!("Connected to PostgreSQL successfully");
                    Ok(Arc::new(backend))
                }
                Err(e) => {
                    Err(format!("Failed to connect to PostgreSQL at {display_url}: {e}").into())
                }
            }
        }
    }
}

/// Declares the column described on the command line. The table name doubles
/// as the entity name.
pub fn registry_for(args: &ColumnArgs) -> positioning::Result<Registry> {
    let mut registry = Registry::new();
    registry.define(
        EntityType::new(args.table.as_str())
            .table(args.table.as_str())
            .primary_key(args.primary_key.as_str()),
    )?;
    registry.positioned(
        &args.table,
        PositionedOptions::on_many(args.scope.iter().cloned()).column(args.column.as_str()),
    )?;
    Ok(registry)
}

/// Connects and declares the column in one step.
pub async fn open_instance(
    config: &BackendConfig,
    args: &ColumnArgs,
) -> Result<Instance, Box<dyn std::error::Error>> {
    let registry = registry_for(args)?;
    let backend = create_backend(config).await?;
    Ok(Instance::from_parts(backend, Arc::new(registry)))
}
