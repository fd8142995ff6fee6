//! Platform Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, StoreError};

/// A social-media platform the store sells services for.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub color: String,
    pub is_active: bool,
    pub order_index: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-supplied fields for creating a platform.
#[derive(Clone, Debug, Deserialize)]
pub struct NewPlatform {
    pub name: String,
    pub icon: String,
    pub description: String,
    pub color: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Partial update; omitted fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlatformUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub order_index: Option<i32>,
    pub image: Option<String>,
}

impl Platform {
    pub fn create(new: NewPlatform) -> Result<Self> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Validation("platform name is required".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            name,
            icon: new.icon,
            description: new.description,
            color: new.color,
            is_active: new.is_active,
            order_index: new.order_index,
            image: new.image,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, update: PlatformUpdate) -> Result<()> {
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(StoreError::Validation("platform name is required".into()));
            }
            self.name = name;
        }
        if let Some(icon) = update.icon {
            self.icon = icon;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(order_index) = update.order_index {
            self.order_index = order_index;
        }
        if update.image.is_some() {
            self.image = update.image;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Platform-name matching is case-insensitive because the storefront
    /// passes names taken from lower-cased URL slugs.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}
