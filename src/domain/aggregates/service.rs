//! Service Package Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, StoreError};

/// One purchasable quantity tier, e.g. 1000 followers for ₺120.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub amount: u32,
    pub price: Decimal,
}

/// A sellable service (followers, likes, views...) owned by a platform.
///
/// The platform is referenced by id. Renaming a platform therefore never
/// orphans its services.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServicePackage {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub platform_id: Uuid,
    pub prices: Vec<PriceTier>,
    pub features: Vec<String>,
    pub delivery_time: String,
    pub quality: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewService {
    pub name: String,
    pub description: String,
    pub category: String,
    pub platform_id: Uuid,
    pub prices: Vec<PriceTier>,
    #[serde(default)]
    pub features: Vec<String>,
    pub delivery_time: String,
    pub quality: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub platform_id: Option<Uuid>,
    pub prices: Option<Vec<PriceTier>>,
    pub features: Option<Vec<String>>,
    pub delivery_time: Option<String>,
    pub quality: Option<String>,
    pub is_active: Option<bool>,
}

impl ServicePackage {
    pub fn create(new: NewService) -> Result<Self> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Validation("service name is required".into()));
        }
        validate_prices(&new.prices)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            name,
            description: new.description,
            category: new.category,
            platform_id: new.platform_id,
            prices: new.prices,
            features: new.features,
            delivery_time: new.delivery_time,
            quality: new.quality,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, update: ServiceUpdate) -> Result<()> {
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(StoreError::Validation("service name is required".into()));
            }
            self.name = name;
        }
        if let Some(prices) = update.prices {
            validate_prices(&prices)?;
            self.prices = prices;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(platform_id) = update.platform_id {
            self.platform_id = platform_id;
        }
        if let Some(features) = update.features {
            self.features = features;
        }
        if let Some(delivery_time) = update.delivery_time {
            self.delivery_time = delivery_time;
        }
        if let Some(quality) = update.quality {
            self.quality = quality;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Price for a given quantity tier, if that tier exists.
    pub fn price_for(&self, amount: u32) -> Option<Decimal> {
        self.prices.iter().find(|t| t.amount == amount).map(|t| t.price)
    }
}

/// Tiers must be non-empty, positively priced, and unique by quantity.
fn validate_prices(prices: &[PriceTier]) -> Result<()> {
    if prices.is_empty() {
        return Err(StoreError::Validation(
            "service needs at least one price tier".into(),
        ));
    }
    for tier in prices {
        if tier.amount == 0 {
            return Err(StoreError::Validation("tier amount must be positive".into()));
        }
        if tier.price <= Decimal::ZERO {
            return Err(StoreError::Validation("tier price must be positive".into()));
        }
    }
    let mut amounts: Vec<u32> = prices.iter().map(|t| t.amount).collect();
    amounts.sort_unstable();
    amounts.dedup();
    if amounts.len() != prices.len() {
        return Err(StoreError::Validation(
            "tier amounts must be unique within a service".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers(pairs: &[(u32, i64)]) -> Vec<PriceTier> {
        pairs
            .iter()
            .map(|&(amount, price)| PriceTier {
                amount,
                price: Decimal::new(price, 0),
            })
            .collect()
    }

    fn new_service(prices: Vec<PriceTier>) -> NewService {
        NewService {
            name: "Premium Takipçi".into(),
            description: "desc".into(),
            category: "Takipçi".into(),
            platform_id: Uuid::now_v7(),
            prices,
            features: vec!["Drop koruması".into()],
            delivery_time: "0-2 saat".into(),
            quality: "Premium".into(),
            is_active: true,
        }
    }

    #[test]
    fn test_create_requires_tiers() {
        assert!(ServicePackage::create(new_service(vec![])).is_err());
    }

    #[test]
    fn test_duplicate_tier_amounts_rejected() {
        let svc = new_service(tiers(&[(100, 15), (100, 25)]));
        assert!(ServicePackage::create(svc).is_err());
    }

    #[test]
    fn test_price_lookup_by_tier() {
        let svc = ServicePackage::create(new_service(tiers(&[(100, 15), (250, 35)]))).unwrap();
        assert_eq!(svc.price_for(250), Some(Decimal::new(35, 0)));
        assert_eq!(svc.price_for(500), None);
    }
}
