//! # docent-db
//!
//! PostgreSQL persistence layer for docent.
//!
//! This crate provides:
//! - Connection pool management with env-tunable [`PoolConfig`]
//! - [`PgUploadStore`]: the persisted upload cache mapping
//!   `(project, identity)` to the provider file handle last seen active
//! - A [`Database`] aggregate for hosts that want one handle to
//!   everything
//!
//! ## Example
//!
//! ```rust,ignore
//! use docent_db::Database;
//! use docent_core::UploadStore;
//!
//! #[tokio::main]
//! async fn main() -> docent_core::Result<()> {
//!     let db = Database::connect("postgres://localhost/docent").await?;
//!     let cached = db.uploads.get("plant-a", "docs/plant-a/pump.pdf").await?;
//!     println!("cached handle: {:?}", cached.map(|r| r.handle));
//!     Ok(())
//! }
//! ```

pub mod pool;
pub mod uploads;

pub use pool::PoolConfig;
pub use uploads::PgUploadStore;

use docent_core::Result;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Persisted upload cache.
    pub uploads: PgUploadStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            uploads: PgUploadStore::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL
    /// with default pool tuning.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = config.connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| docent_core::Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
