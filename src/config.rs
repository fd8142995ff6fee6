//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    /// When set, the catalog is backed by Postgres instead of the local store.
    pub database_url: Option<String>,
    /// Optional cross-process sync and event fanout.
    pub nats_url: Option<String>,
    pub min_topup: Decimal,
    pub max_topup: Decimal,
    pub admin_name: String,
    pub admin_email: String,
    /// Seed password for the first-run admin account. No seed happens without it.
    pub admin_password: Option<String>,
    pub support_phone: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8083),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            database_url: std::env::var("DATABASE_URL").ok(),
            nats_url: std::env::var("NATS_URL").ok(),
            min_topup: env_parse("MIN_TOPUP", Decimal::from(10u32)),
            max_topup: env_parse("MAX_TOPUP", Decimal::from(10_000u32)),
            admin_name: std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Store Admin".into()),
            admin_email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@example.com".into()),
            admin_password: std::env::var("ADMIN_PASSWORD").ok(),
            support_phone: std::env::var("SUPPORT_PHONE").unwrap_or_else(|_| "+905000000000".into()),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
