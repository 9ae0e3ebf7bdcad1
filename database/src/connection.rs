use deadpool_postgres::{Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bundled schema, applied in order and recorded in `schema_migrations`
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_pipeline_runs",
    include_str!("../migrations/001_pipeline_runs.sql"),
)];

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub max_connections: Option<usize>,
    pub application_name: String,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    /// `DATABASE_HOST`, `DATABASE_PORT`, `DATABASE_NAME`, `DATABASE_USER`, `DB_PASSWORD`,
    /// `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let env_or = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());

        Self {
            host: env_or("DATABASE_HOST", "localhost"),
            port: env_or("DATABASE_PORT", "5432").parse().unwrap_or(5432),
            database: env_or("DATABASE_NAME", "pipelines"),
            user: env_or("DATABASE_USER", "pipelines"),
            password: std::env::var("DB_PASSWORD").ok(),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", "4").parse().ok(),
            application_name: "dag-trigger".to_string(),
            connect_timeout: Duration::from_secs(
                env_or("DATABASE_CONNECT_TIMEOUT_SECS", "10")
                    .parse()
                    .unwrap_or(10),
            ),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pooled connection to the run history database
pub struct Database {
    pub(crate) pool: Pool,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Result<Self, BoxError> {
        let mut pool_config = deadpool_postgres::Config::new();
        pool_config.host = Some(config.host);
        pool_config.port = Some(config.port);
        pool_config.user = Some(config.user);
        pool_config.password = config.password;
        pool_config.dbname = Some(config.database);
        pool_config.application_name = Some(config.application_name);
        pool_config.connect_timeout = Some(config.connect_timeout);
        pool_config.pool = Some(PoolConfig {
            max_size: config.max_connections.unwrap_or(4),
            timeouts: Timeouts {
                wait: Some(config.connect_timeout),
                create: Some(config.connect_timeout),
                recycle: None,
            },
            ..Default::default()
        });

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| format!("Failed to create connection pool: {}", e))?;

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> bool {
        let client = match self.pool.get().await {
            Ok(client) => client,
            Err(e) => {
                error!(error = ?e, "Database health check failed - couldn't get client");
                return false;
            }
        };

        match client.query_one("SELECT 1", &[]).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = ?e, "Database health check query failed");
                false
            }
        }
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close();
    }

    /// Execute raw SQL
    pub async fn execute_sql(&self, sql: &str) -> Result<(), BoxError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        client
            .batch_execute(sql)
            .await
            .map_err(|e| format!("Failed to execute SQL: {}", e))?;

        Ok(())
    }

    /// Apply every bundled migration that is not yet recorded, each in its own transaction
    pub async fn migrate(&self) -> Result<(), BoxError> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    name TEXT PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .await
            .map_err(|e| format!("Failed to create schema_migrations: {}", e))?;

        for (name, sql) in MIGRATIONS {
            let applied = client
                .query_opt("SELECT 1 FROM schema_migrations WHERE name = $1", &[name])
                .await
                .map_err(|e| format!("Failed to read schema_migrations: {}", e))?
                .is_some();
            if applied {
                debug!(migration = name, "Migration already applied");
                continue;
            }

            let tx = client
                .transaction()
                .await
                .map_err(|e| format!("Failed to start migration {}: {}", name, e))?;
            tx.batch_execute(sql)
                .await
                .map_err(|e| format!("Migration {} failed: {}", name, e))?;
            tx.execute("INSERT INTO schema_migrations (name) VALUES ($1)", &[name])
                .await
                .map_err(|e| format!("Failed to record migration {}: {}", name, e))?;
            tx.commit()
                .await
                .map_err(|e| format!("Failed to commit migration {}: {}", name, e))?;

            info!(migration = name, "Applied migration");
        }

        Ok(())
    }
}
