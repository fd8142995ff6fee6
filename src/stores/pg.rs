//! Postgres catalog backend.
//!
//! The remote-backed variant: catalog rows live in `platforms` and
//! `services` (service → platform by id, `ON DELETE CASCADE`); fanout to
//! other contexts rides the notifier's NATS path since storage events do
//! not cross hosts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::platform::Platform;
use crate::domain::aggregates::service::{PriceTier, ServicePackage};
use crate::stores::catalog::CatalogBackend;
use crate::{Result, StoreError};

pub struct PgCatalogBackend {
    pool: PgPool,
}

impl PgCatalogBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlatformRow {
    id: Uuid,
    name: String,
    icon: String,
    description: String,
    color: String,
    is_active: bool,
    order_index: i32,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PlatformRow> for Platform {
    fn from(row: PlatformRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            icon: row.icon,
            description: row.description,
            color: row.color,
            is_active: row.is_active,
            order_index: row.order_index,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    description: String,
    category: String,
    platform_id: Uuid,
    prices: serde_json::Value,
    features: Vec<String>,
    delivery_time: String,
    quality: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for ServicePackage {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self> {
        let prices: Vec<PriceTier> = serde_json::from_value(row.prices)
            .map_err(|e| StoreError::Storage(format!("decode prices for {}: {e}", row.id)))?;
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            platform_id: row.platform_id,
            prices,
            features: row.features,
            delivery_time: row.delivery_time,
            quality: row.quality,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

#[async_trait]
impl CatalogBackend for PgCatalogBackend {
    async fn list_platforms(&self) -> Result<Vec<Platform>> {
        let rows = sqlx::query_as::<_, PlatformRow>(
            "SELECT * FROM platforms ORDER BY order_index, created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Platform::from).collect())
    }

    async fn list_services(&self) -> Result<Vec<ServicePackage>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT * FROM services ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ServicePackage::try_from).collect()
    }

    async fn insert_platform(&self, p: &Platform) -> Result<()> {
        sqlx::query(
            "INSERT INTO platforms (id, name, icon, description, color, is_active, order_index, image, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.icon)
        .bind(&p.description)
        .bind(&p.color)
        .bind(p.is_active)
        .bind(p.order_index)
        .bind(&p.image)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_platform(&self, p: &Platform) -> Result<()> {
        let result = sqlx::query(
            "UPDATE platforms SET name = $2, icon = $3, description = $4, color = $5, \
             is_active = $6, order_index = $7, image = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.icon)
        .bind(&p.description)
        .bind(&p.color)
        .bind(p.is_active)
        .bind(p.order_index)
        .bind(&p.image)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("platform {}", p.id)));
        }
        Ok(())
    }

    async fn delete_platform(&self, id: Uuid) -> Result<()> {
        // services cascade via the FK
        let result = sqlx::query("DELETE FROM platforms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("platform {id}")));
        }
        Ok(())
    }

    async fn insert_service(&self, s: &ServicePackage) -> Result<()> {
        let prices = serde_json::to_value(&s.prices)
            .map_err(|e| StoreError::Storage(format!("encode prices: {e}")))?;
        sqlx::query(
            "INSERT INTO services (id, name, description, category, platform_id, prices, features, \
             delivery_time, quality, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.description)
        .bind(&s.category)
        .bind(s.platform_id)
        .bind(prices)
        .bind(&s.features)
        .bind(&s.delivery_time)
        .bind(&s.quality)
        .bind(s.is_active)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_service(&self, s: &ServicePackage) -> Result<()> {
        let prices = serde_json::to_value(&s.prices)
            .map_err(|e| StoreError::Storage(format!("encode prices: {e}")))?;
        let result = sqlx::query(
            "UPDATE services SET name = $2, description = $3, category = $4, platform_id = $5, \
             prices = $6, features = $7, delivery_time = $8, quality = $9, is_active = $10, \
             updated_at = $11 WHERE id = $1",
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.description)
        .bind(&s.category)
        .bind(s.platform_id)
        .bind(prices)
        .bind(&s.features)
        .bind(&s.delivery_time)
        .bind(&s.quality)
        .bind(s.is_active)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("service {}", s.id)));
        }
        Ok(())
    }

    async fn delete_service(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("service {id}")));
        }
        Ok(())
    }
}
