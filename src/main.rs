//! SMM Storefront - Self-hosted Social Media Marketing Store

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smm_storefront::api::{self, AppState};
use smm_storefront::config::Config;
use smm_storefront::storage::KvStore;
use smm_storefront::stores::auth::AuthStore;
use smm_storefront::stores::cart::CartStore;
use smm_storefront::stores::catalog::{CatalogBackend, CatalogStore, KvCatalogBackend};
use smm_storefront::stores::orders::{OrderStore, SimulatedFulfillment};
use smm_storefront::stores::payments::PaymentStore;
use smm_storefront::stores::pg::PgCatalogBackend;
use smm_storefront::sync::ChangeNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let kv = Arc::new(KvStore::open(&config.data_dir)?);

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, running single-host");
                None
            }
        },
        None => None,
    };

    let notifier = ChangeNotifier::new(Arc::clone(&kv), nats.clone());
    notifier.start();

    let backend: Arc<dyn CatalogBackend> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgCatalogBackend::new(db))
        }
        None => Arc::new(KvCatalogBackend::new(Arc::clone(&kv))?),
    };

    let catalog = CatalogStore::new(backend, Arc::clone(&notifier)).await?;
    catalog.spawn_sync();

    let auth = Arc::new(AuthStore::new(Arc::clone(&kv)));
    auth.seed_admin(&config)?;

    let carts = Arc::new(CartStore::new(Arc::clone(&kv)));
    let payments = Arc::new(PaymentStore::new(
        Arc::clone(&kv),
        nats.clone(),
        config.min_topup,
        config.max_topup,
    ));
    let orders = OrderStore::new(
        Arc::clone(&kv),
        Arc::new(SimulatedFulfillment::default()),
        nats,
    );
    orders.run_progression(Duration::from_secs(1));

    let app = api::router(AppState {
        catalog,
        carts,
        orders,
        payments,
        auth,
        notifier,
        config: config.clone(),
    });

    tracing::info!("smm-storefront listening on 0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
