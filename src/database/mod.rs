use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub mod models;
pub mod queries;

static DATABASE_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

pub async fn initialize_database() -> Result<Arc<PgPool>, Box<dyn std::error::Error + Send + Sync>>
{
    let pool = DATABASE_POOL
        .get_or_try_init(|| async {
            let database_url = std::env::var("DATABASE_URL")
                .map_err(|_| "DATABASE_URL environment variable is not set")?;

            let pool = connect_with_retry(&database_url).await?;

            info!("running database migrations");
            sqlx::migrate!("./migrations").run(&pool).await?;

            Ok::<Arc<PgPool>, Box<dyn std::error::Error + Send + Sync>>(Arc::new(pool))
        })
        .await?;

    let pool = pool.clone();
    sqlx::query("SELECT 1").execute(pool.as_ref()).await?;
    info!("database initialized");

    Ok(pool.clone())
}

async fn connect_with_retry(
    database_url: &str,
) -> Result<PgPool, Box<dyn std::error::Error + Send + Sync>> {
    let max_retries = 10;
    let mut retry_count = 0;

    let pool_options = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(300));

    loop {
        retry_count += 1;

        match pool_options.clone().connect(database_url).await {
            Ok(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => return Ok(pool),
                Err(e) => {
                    warn!("database connection test failed: {}", e);
                    if retry_count >= max_retries {
                        return Err(format!(
                            "database connection test failed after {} attempts: {}",
                            max_retries, e
                        )
                        .into());
                    }
                }
            },
            Err(e) => {
                warn!("connection attempt {} failed: {}", retry_count, e);
                if retry_count >= max_retries {
                    return Err(format!(
                        "failed to connect to database after {} attempts: {}",
                        max_retries, e
                    )
                    .into());
                }
            }
        }

        // Exponential backoff, capped at ~6.4 seconds.
        let delay = Duration::from_millis(100 * (1 << (retry_count - 1).min(6)));
        tokio::time::sleep(delay).await;
    }
}

pub fn get_database_pool() -> Result<Arc<PgPool>, sqlx::Error> {
    DATABASE_POOL
        .get()
        .cloned()
        .ok_or_else(|| sqlx::Error::Configuration("database pool is not initialized".into()))
}
