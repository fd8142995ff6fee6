//! Catalog store: platforms and service packages.
//!
//! Reads serve an in-memory snapshot refreshed through the change notifier;
//! writes go to the backend first, then refresh the snapshot, then
//! `publish()` so every other context re-reads. Backends are swappable: the
//! local document store by default, Postgres when a database URL is set.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::aggregates::platform::{NewPlatform, Platform, PlatformUpdate};
use crate::domain::aggregates::service::{NewService, PriceTier, ServicePackage, ServiceUpdate};
use crate::storage::{keys, KvStore};
use crate::sync::ChangeNotifier;
use crate::{Result, StoreError};

#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn list_platforms(&self) -> Result<Vec<Platform>>;
    async fn list_services(&self) -> Result<Vec<ServicePackage>>;
    async fn insert_platform(&self, platform: &Platform) -> Result<()>;
    async fn update_platform(&self, platform: &Platform) -> Result<()>;
    /// Deletes the platform and, cascading, every service that references it.
    async fn delete_platform(&self, id: Uuid) -> Result<()>;
    async fn insert_service(&self, service: &ServicePackage) -> Result<()>;
    async fn update_service(&self, service: &ServicePackage) -> Result<()>;
    async fn delete_service(&self, id: Uuid) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct CatalogSnapshot {
    pub platforms: Vec<Platform>,
    pub services: Vec<ServicePackage>,
}

pub struct CatalogStore {
    backend: Arc<dyn CatalogBackend>,
    notifier: Arc<ChangeNotifier>,
    snapshot: RwLock<CatalogSnapshot>,
}

impl CatalogStore {
    pub async fn new(
        backend: Arc<dyn CatalogBackend>,
        notifier: Arc<ChangeNotifier>,
    ) -> Result<Arc<Self>> {
        let store = Arc::new(Self {
            backend,
            notifier,
            snapshot: RwLock::new(CatalogSnapshot::default()),
        });
        store.force_refresh().await?;
        Ok(store)
    }

    /// Re-read persisted state into the snapshot.
    pub async fn force_refresh(&self) -> Result<()> {
        let platforms = self.backend.list_platforms().await?;
        let services = self.backend.list_services().await?;
        let mut snapshot = self.snapshot.write().expect("catalog lock poisoned");
        snapshot.platforms = platforms;
        snapshot.services = services;
        Ok(())
    }

    /// Keep the snapshot converged with other writing contexts: wake on any
    /// notifier signal and re-read. Runs until the notifier is dropped.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut sub = store.notifier.subscribe();
        tokio::spawn(async move {
            while let Some(signal) = sub.recv().await {
                if let Err(e) = store.force_refresh().await {
                    tracing::warn!(error = %e, ?signal, "catalog refresh failed");
                }
            }
        })
    }

    pub fn list_platforms(&self) -> Vec<Platform> {
        self.snapshot.read().expect("catalog lock poisoned").platforms.clone()
    }

    /// Active platforms in display order.
    pub fn active_platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self
            .list_platforms()
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        platforms.sort_by_key(|p| p.order_index);
        platforms
    }

    pub fn list_services(&self) -> Vec<ServicePackage> {
        self.snapshot.read().expect("catalog lock poisoned").services.clone()
    }

    pub fn get_platform(&self, id: Uuid) -> Result<Platform> {
        self.list_platforms()
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("platform {id}")))
    }

    pub fn get_service(&self, id: Uuid) -> Result<ServicePackage> {
        self.list_services()
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("service {id}")))
    }

    /// Active services of the named platform. The name comparison is
    /// case-insensitive because callers pass lower-cased URL slugs.
    pub fn services_by_platform(&self, name: &str) -> Vec<ServicePackage> {
        let snapshot = self.snapshot.read().expect("catalog lock poisoned");
        let Some(platform) = snapshot.platforms.iter().find(|p| p.matches_name(name)) else {
            return Vec::new();
        };
        snapshot
            .services
            .iter()
            .filter(|s| s.platform_id == platform.id && s.is_active)
            .cloned()
            .collect()
    }

    pub async fn add_platform(&self, new: NewPlatform) -> Result<Platform> {
        let platform = Platform::create(new)?;
        self.ensure_unique_name(&platform.name, None)?;
        self.backend.insert_platform(&platform).await?;
        self.committed("platform added", platform.id).await?;
        Ok(platform)
    }

    pub async fn update_platform(&self, id: Uuid, update: PlatformUpdate) -> Result<Platform> {
        let mut platform = self.get_platform(id)?;
        platform.apply(update)?;
        self.ensure_unique_name(&platform.name, Some(id))?;
        self.backend.update_platform(&platform).await?;
        self.committed("platform updated", id).await?;
        Ok(platform)
    }

    pub async fn delete_platform(&self, id: Uuid) -> Result<()> {
        self.get_platform(id)?;
        self.backend.delete_platform(id).await?;
        self.committed("platform deleted", id).await?;
        Ok(())
    }

    pub async fn add_service(&self, new: NewService) -> Result<ServicePackage> {
        self.get_platform(new.platform_id)
            .map_err(|_| StoreError::Validation("unknown platform for service".into()))?;
        let service = ServicePackage::create(new)?;
        self.backend.insert_service(&service).await?;
        self.committed("service added", service.id).await?;
        Ok(service)
    }

    pub async fn update_service(&self, id: Uuid, update: ServiceUpdate) -> Result<ServicePackage> {
        let mut service = self.get_service(id)?;
        service.apply(update)?;
        self.get_platform(service.platform_id)
            .map_err(|_| StoreError::Validation("unknown platform for service".into()))?;
        self.backend.update_service(&service).await?;
        self.committed("service updated", id).await?;
        Ok(service)
    }

    pub async fn delete_service(&self, id: Uuid) -> Result<()> {
        self.get_service(id)?;
        self.backend.delete_service(id).await?;
        self.committed("service deleted", id).await?;
        Ok(())
    }

    fn ensure_unique_name(&self, name: &str, except: Option<Uuid>) -> Result<()> {
        let taken = self
            .list_platforms()
            .iter()
            .any(|p| p.matches_name(name) && Some(p.id) != except);
        if taken {
            return Err(StoreError::Conflict(format!("platform '{name}' already exists")));
        }
        Ok(())
    }

    async fn committed(&self, action: &'static str, id: Uuid) -> Result<()> {
        self.force_refresh().await?;
        self.notifier.publish()?;
        tracing::info!(%id, "{action}");
        Ok(())
    }
}

// =============================================================================
// Local document-store backend
// =============================================================================

pub struct KvCatalogBackend {
    kv: Arc<KvStore>,
}

impl KvCatalogBackend {
    /// Opens the backend, seeding the built-in dataset on first run.
    pub fn new(kv: Arc<KvStore>) -> Result<Self> {
        if matches!(kv.get::<Vec<Platform>>(keys::PLATFORMS), Ok(None)) {
            let (platforms, services) = default_catalog();
            kv.with(|txn| {
                txn.put(keys::PLATFORMS, &platforms)?;
                txn.put(keys::SERVICES, &services)
            })?;
            tracing::info!(
                platforms = platforms.len(),
                services = services.len(),
                "seeded default catalog"
            );
        }
        Ok(Self { kv })
    }
}

#[async_trait]
impl CatalogBackend for KvCatalogBackend {
    async fn list_platforms(&self) -> Result<Vec<Platform>> {
        // Reload from disk so a refresh converges on writes made by another
        // process sharing the data dir. A corrupt document must not take
        // the storefront down; readers get the built-in dataset while
        // writers keep surfacing the error.
        match self.kv.reload(keys::PLATFORMS) {
            Ok(Some(platforms)) => Ok(platforms),
            Ok(None) => Ok(default_catalog().0),
            Err(e) => {
                tracing::warn!(error = %e, "platforms unreadable, serving defaults");
                Ok(default_catalog().0)
            }
        }
    }

    async fn list_services(&self) -> Result<Vec<ServicePackage>> {
        match self.kv.reload(keys::SERVICES) {
            Ok(Some(services)) => Ok(services),
            Ok(None) => Ok(default_catalog().1),
            Err(e) => {
                tracing::warn!(error = %e, "services unreadable, serving defaults");
                Ok(default_catalog().1)
            }
        }
    }

    async fn insert_platform(&self, platform: &Platform) -> Result<()> {
        self.kv.with(|txn| {
            let mut platforms: Vec<Platform> = txn.get(keys::PLATFORMS)?.unwrap_or_default();
            platforms.push(platform.clone());
            txn.put(keys::PLATFORMS, &platforms)
        })
    }

    async fn update_platform(&self, platform: &Platform) -> Result<()> {
        self.kv.with(|txn| {
            let mut platforms: Vec<Platform> = txn.get(keys::PLATFORMS)?.unwrap_or_default();
            let slot = platforms
                .iter_mut()
                .find(|p| p.id == platform.id)
                .ok_or_else(|| StoreError::NotFound(format!("platform {}", platform.id)))?;
            *slot = platform.clone();
            txn.put(keys::PLATFORMS, &platforms)
        })
    }

    async fn delete_platform(&self, id: Uuid) -> Result<()> {
        self.kv.with(|txn| {
            let mut platforms: Vec<Platform> = txn.get(keys::PLATFORMS)?.unwrap_or_default();
            let before = platforms.len();
            platforms.retain(|p| p.id != id);
            if platforms.len() == before {
                return Err(StoreError::NotFound(format!("platform {id}")));
            }
            let mut services: Vec<ServicePackage> = txn.get(keys::SERVICES)?.unwrap_or_default();
            services.retain(|s| s.platform_id != id);
            txn.put(keys::PLATFORMS, &platforms)?;
            txn.put(keys::SERVICES, &services)
        })
    }

    async fn insert_service(&self, service: &ServicePackage) -> Result<()> {
        self.kv.with(|txn| {
            let mut services: Vec<ServicePackage> = txn.get(keys::SERVICES)?.unwrap_or_default();
            services.push(service.clone());
            txn.put(keys::SERVICES, &services)
        })
    }

    async fn update_service(&self, service: &ServicePackage) -> Result<()> {
        self.kv.with(|txn| {
            let mut services: Vec<ServicePackage> = txn.get(keys::SERVICES)?.unwrap_or_default();
            let slot = services
                .iter_mut()
                .find(|s| s.id == service.id)
                .ok_or_else(|| StoreError::NotFound(format!("service {}", service.id)))?;
            *slot = service.clone();
            txn.put(keys::SERVICES, &services)
        })
    }

    async fn delete_service(&self, id: Uuid) -> Result<()> {
        self.kv.with(|txn| {
            let mut services: Vec<ServicePackage> = txn.get(keys::SERVICES)?.unwrap_or_default();
            let before = services.len();
            services.retain(|s| s.id != id);
            if services.len() == before {
                return Err(StoreError::NotFound(format!("service {id}")));
            }
            txn.put(keys::SERVICES, &services)
        })
    }
}

// =============================================================================
// Built-in dataset
// =============================================================================

/// Fallback and first-run catalog. Regenerated ids on every call, which is
/// fine: the seeded copy is written once and then owns the ids.
pub fn default_catalog() -> (Vec<Platform>, Vec<ServicePackage>) {
    let defs: [(&str, &str, &str, &str); 8] = [
        ("Instagram", "📷", "Takipçi, beğeni ve daha fazlası", "from-pink-500 to-purple-600"),
        ("YouTube", "🎥", "Abone ve izlenme hizmetleri", "from-red-500 to-red-600"),
        ("TikTok", "🎵", "Takipçi ve beğeni hizmetleri", "from-gray-800 to-gray-900"),
        ("Facebook", "👥", "Sayfa beğeni hizmetleri", "from-blue-600 to-blue-800"),
        ("WhatsApp", "💬", "Grup üyesi hizmetleri", "from-green-500 to-green-600"),
        ("Snapchat", "👻", "Takipçi hizmetleri", "from-yellow-400 to-yellow-500"),
        ("Telegram", "✈️", "Kanal üyesi hizmetleri", "from-blue-400 to-blue-500"),
        ("Twitter/X", "🐦", "Takipçi ve beğeni hizmetleri", "from-blue-500 to-cyan-500"),
    ];

    let platforms: Vec<Platform> = defs
        .iter()
        .enumerate()
        .map(|(i, (name, icon, description, color))| {
            Platform::create(NewPlatform {
                name: (*name).into(),
                icon: (*icon).into(),
                description: (*description).into(),
                color: (*color).into(),
                is_active: true,
                order_index: i as i32 + 1,
                image: None,
            })
            .expect("default platform is valid")
        })
        .collect();

    let platform_id = |name: &str| {
        platforms
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .expect("default platform exists")
    };

    let tiers = |pairs: &[(u32, i64, u32)]| -> Vec<PriceTier> {
        pairs
            .iter()
            .map(|&(amount, mantissa, scale)| PriceTier {
                amount,
                price: Decimal::new(mantissa, scale),
            })
            .collect()
    };

    let service = |platform: &str, name: &str, category: &str, delivery: &str, quality: &str, prices: Vec<PriceTier>| {
        ServicePackage::create(NewService {
            name: name.into(),
            description: format!("{name} - güvenli ve hızlı teslimat"),
            category: category.into(),
            platform_id: platform_id(platform),
            prices,
            features: vec!["Hızlı teslimat".into(), "Drop koruması".into()],
            delivery_time: delivery.into(),
            quality: quality.into(),
            is_active: true,
        })
        .expect("default service is valid")
    };

    let services = vec![
        service(
            "Instagram",
            "Premium Türk Takipçi",
            "Takipçi",
            "0-2 saat",
            "Premium",
            tiers(&[(100, 1500, 2), (250, 3500, 2), (500, 6500, 2), (1000, 12000, 2)]),
        ),
        service(
            "Instagram",
            "Instagram Beğeni",
            "Beğeni",
            "0-1 saat",
            "Yüksek",
            tiers(&[(100, 500, 2), (500, 2000, 2), (1000, 3500, 2), (2500, 8000, 2)]),
        ),
        service(
            "YouTube",
            "YouTube Abone",
            "Abone",
            "1-6 saat",
            "Premium",
            tiers(&[(100, 2500, 2), (250, 5500, 2), (500, 10000, 2), (1000, 18000, 2)]),
        ),
        service(
            "YouTube",
            "YouTube İzlenme",
            "İzlenme",
            "0-4 saat",
            "Yüksek",
            tiers(&[(1000, 1500, 2), (5000, 6500, 2), (10000, 12000, 2), (25000, 28000, 2)]),
        ),
        service(
            "TikTok",
            "TikTok Takipçi",
            "Takipçi",
            "0-3 saat",
            "Premium",
            tiers(&[(100, 1200, 2), (500, 5500, 2), (1000, 10000, 2), (2500, 23000, 2)]),
        ),
        service(
            "TikTok",
            "TikTok Beğeni",
            "Beğeni",
            "0-2 saat",
            "Yüksek",
            tiers(&[(100, 800, 2), (500, 3500, 2), (1000, 6500, 2), (2500, 15000, 2)]),
        ),
    ];

    (platforms, services)
}
