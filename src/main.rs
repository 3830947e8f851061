//! Sobes admin back office - storage bootstrap
//!
//! Loads configuration, connects to the database, synchronises entity
//! tables and reports how many rows each entity holds.

use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sobes_admin::Config;
use sobes_admin::db::Database;
use sobes_admin::db::entities::ALL_SCHEMAS;
use sobes_admin::orm::{Projection, Query, StatementBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sobes_admin=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(debug = config.debug, "Starting sobes-admin");

    let db = Database::connect_with_retry(
        &config.database_url,
        config.database_max_connections,
        Duration::from_secs(5),
        12,
    )
    .await?;
    info!("Connected to database");

    let sync = db.sync_schemas().await;
    for message in &sync.errors {
        error!("{}", message);
    }
    info!(
        tables_created = sync.tables_created.len(),
        columns_added = sync.columns_added.len(),
        "Schema synchronised"
    );

    let session = db.session();
    for schema in ALL_SCHEMAS {
        let statement = StatementBuilder::new(schema).build(&Query::new(), Projection::Count)?;
        match session.fetch_one(&statement).await {
            Ok(row) => {
                let count: i64 = sqlx::Row::try_get(&row, 0)?;
                info!(entity = schema.verbose_name, rows = count, "Entity ready");
            }
            Err(e) => warn!(entity = schema.verbose_name, error = %e, "Could not count rows"),
        }
    }
    session.close().await?;

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}
