use crate::config::DatabaseConfig;
use crate::error::FunctionError;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A mirrored image to be recorded in the gallery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImageRecord {
    pub user_id: String,
    pub link_id: String,
    /// Public URL of the mirrored object
    pub image_url: String,
    /// Object key inside the gallery bucket
    pub storage_path: String,
    /// Post the image was discovered in
    pub instagram_post_url: String,
    /// Position of the image within the post's carousel
    pub image_index: i32,
}

/// Record store for gallery image references
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one image record, returning its row id
    async fn insert_image(&self, record: &StoredImageRecord) -> Result<Uuid, FunctionError>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<(), FunctionError>;
}

/// PostgreSQL-backed gallery store
pub struct GalleryStore {
    pool: PgPool,
}

impl GalleryStore {
    /// Create a new gallery store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for GalleryStore {
    #[instrument(skip(self, record), fields(link_id = %record.link_id, image_index = record.image_index))]
    async fn insert_image(&self, record: &StoredImageRecord) -> Result<Uuid, FunctionError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO gallery_images (
                id, user_id, link_id, image_url, storage_path,
                instagram_post_url, image_index, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, NOW()
            )
            "#,
        )
        .bind(id)
        .bind(&record.user_id)
        .bind(&record.link_id)
        .bind(&record.image_url)
        .bind(&record.storage_path)
        .bind(&record.instagram_post_url)
        .bind(record.image_index)
        .execute(&self.pool)
        .await
        .map_err(|e| FunctionError::Persist(e.to_string()))?;

        debug!(id = %id, storage_path = %record.storage_path, "Gallery image recorded");

        Ok(id)
    }

    async fn ping(&self) -> Result<(), FunctionError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| FunctionError::Persist(e.to_string()))
    }
}
