//! Durable JSON document store.
//!
//! One document per namespaced key, one file per document. Every mutation
//! rewrites the whole document for its key, which is safe at storefront
//! write rates. Multi-key updates run under a single lock with snapshot
//! rollback, so a payment approval can flip a request status and append a
//! ledger entry atomically.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{Result, StoreError};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Well-known keys. Everything lives under the `smm/` namespace next to a
/// schema version tag so future layouts can migrate safely.
pub mod keys {
    pub const SCHEMA_VERSION: &str = "smm/schema_version";
    pub const PLATFORMS: &str = "smm/platforms";
    pub const SERVICES: &str = "smm/services";
    pub const LAST_UPDATE: &str = "smm/last_update";
    pub const ORDERS: &str = "smm/orders";
    pub const PAYMENT_REQUESTS: &str = "smm/payment_requests";
    pub const USERS: &str = "smm/users";
    pub const LEDGER: &str = "smm/ledger";

    /// Per-session cart document. Session ids are caller-supplied, so they
    /// are reduced to a filename-safe alphabet before keying.
    pub fn cart(session: &str) -> String {
        let safe: String = session
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("smm/cart/{safe}")
    }
}

pub struct KvStore {
    root: PathBuf,
    docs: Mutex<HashMap<String, Value>>,
}

impl KvStore {
    /// Open (or initialize) a store rooted at `root`.
    ///
    /// Unreadable documents are skipped with a warning instead of failing
    /// startup; readers see them as absent and fall back to their defaults.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| StoreError::Storage(format!("create {}: {e}", root.display())))?;

        let mut docs = HashMap::new();
        let entries = fs::read_dir(&root)
            .map_err(|e| StoreError::Storage(format!("read {}: {e}", root.display())))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = key_for_path(&path) else { continue };
            match fs::read(&path).ok().and_then(|b| serde_json::from_slice(&b).ok()) {
                Some(value) => {
                    docs.insert(key, value);
                }
                None => {
                    tracing::warn!(path = %path.display(), "skipping unreadable document");
                }
            }
        }

        let store = Self {
            root,
            docs: Mutex::new(docs),
        };
        store.check_schema_version()?;
        Ok(store)
    }

    fn check_schema_version(&self) -> Result<()> {
        match self.get::<u32>(keys::SCHEMA_VERSION)? {
            None => self.put(keys::SCHEMA_VERSION, &CURRENT_SCHEMA_VERSION),
            Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
            Some(v) if v < CURRENT_SCHEMA_VERSION => {
                // No migrations exist yet for v0 layouts; just restamp.
                tracing::warn!(found = v, current = CURRENT_SCHEMA_VERSION, "migrating schema tag");
                self.put(keys::SCHEMA_VERSION, &CURRENT_SCHEMA_VERSION)
            }
            Some(v) => Err(StoreError::Storage(format!(
                "data dir written by newer schema version {v}"
            ))),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let docs = self.docs.lock().expect("kv lock poisoned");
        match docs.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StoreError::Storage(format!("decode {key}: {e}"))),
        }
    }

    /// Re-read `key` from disk, replacing the cached copy. This is how the
    /// poll loop and the catalog backend observe writes made by another
    /// process on the same data dir; the tmp+rename write protocol means a
    /// reader always sees a complete document, old or new.
    pub fn reload<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let mut docs = self.docs.lock().expect("kv lock poisoned");
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                docs.remove(key);
                return Ok(None);
            }
            Err(e) => return Err(StoreError::Storage(format!("read {key}: {e}"))),
        };
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Storage(format!("decode {key}: {e}")))?;
        let out = serde_json::from_value(value.clone())
            .map_err(|e| StoreError::Storage(format!("decode {key}: {e}")))?;
        docs.insert(key.to_string(), value);
        Ok(Some(out))
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.with(|txn| txn.put(key, value))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.with(|txn| {
            txn.remove(key);
            Ok(())
        })
    }

    /// Run `f` with exclusive access to the document map. All keys touched
    /// by the closure are flushed together afterwards; on closure error or
    /// flush failure, the prior in-memory values are restored so memory
    /// never diverges from an error the caller saw surfaced.
    pub fn with<T>(&self, f: impl FnOnce(&mut KvTxn<'_>) -> Result<T>) -> Result<T> {
        let mut docs = self.docs.lock().expect("kv lock poisoned");
        let mut txn = KvTxn {
            docs: &mut docs,
            prior: HashMap::new(),
        };

        match f(&mut txn) {
            Ok(out) => {
                let touched = txn.prior;
                if let Err(e) = self.flush(&docs, touched.keys()) {
                    for (key, prior) in touched {
                        match prior {
                            Some(v) => docs.insert(key, v),
                            None => docs.remove(&key),
                        };
                    }
                    return Err(e);
                }
                Ok(out)
            }
            Err(e) => {
                for (key, prior) in txn.prior {
                    match prior {
                        Some(v) => docs.insert(key, v),
                        None => docs.remove(&key),
                    };
                }
                Err(e)
            }
        }
    }

    fn flush<'k>(
        &self,
        docs: &HashMap<String, Value>,
        touched: impl Iterator<Item = &'k String>,
    ) -> Result<()> {
        for key in touched {
            let path = self.path_for(key);
            match docs.get(key) {
                Some(value) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)
                            .map_err(|e| StoreError::Storage(format!("write {key}: {e}")))?;
                    }
                    let bytes = serde_json::to_vec_pretty(value)
                        .map_err(|e| StoreError::Storage(format!("encode {key}: {e}")))?;
                    let tmp = path.with_extension("json.tmp");
                    fs::write(&tmp, bytes)
                        .and_then(|_| fs::rename(&tmp, &path))
                        .map_err(|e| StoreError::Storage(format!("write {key}: {e}")))?;
                }
                None => {
                    if path.exists() {
                        fs::remove_file(&path)
                            .map_err(|e| StoreError::Storage(format!("remove {key}: {e}")))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key.replace('/', ".")))
    }
}

fn key_for_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.replace('.', "/"))
}

/// In-flight view of the document map inside [`KvStore::with`].
pub struct KvTxn<'a> {
    docs: &'a mut HashMap<String, Value>,
    /// Value of each touched key before this transaction, for rollback.
    prior: HashMap<String, Option<Value>>,
}

impl KvTxn<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.docs.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StoreError::Storage(format!("decode {key}: {e}"))),
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| StoreError::Storage(format!("encode {key}: {e}")))?;
        self.prior
            .entry(key.to_string())
            .or_insert_with(|| self.docs.get(key).cloned());
        self.docs.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.prior
            .entry(key.to_string())
            .or_insert_with(|| self.docs.get(key).cloned());
        self.docs.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::payment::{PaymentMethod, PaymentRequest};
    use crate::domain::aggregates::platform::{NewPlatform, Platform};
    use crate::domain::value_objects::Email;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn platform() -> Platform {
        Platform::create(NewPlatform {
            name: "Instagram".into(),
            icon: "📷".into(),
            description: "desc".into(),
            color: "pink".into(),
            is_active: true,
            order_index: 1,
            image: None,
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let expected = vec![platform()];
        {
            let kv = KvStore::open(dir.path()).unwrap();
            kv.put(keys::PLATFORMS, &expected).unwrap();
        }
        let kv = KvStore::open(dir.path()).unwrap();
        let loaded: Vec<Platform> = kv.get(keys::PLATFORMS).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, expected[0].id);
        assert_eq!(loaded[0].name, "Instagram");
    }

    #[test]
    fn test_payment_request_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let request = PaymentRequest::create(
            Uuid::now_v7(),
            "Ayşe".into(),
            Email::parse("ayse@example.com").unwrap(),
            Decimal::new(100, 0),
            PaymentMethod::Papara,
        );
        kv.put(keys::PAYMENT_REQUESTS, &vec![request.clone()]).unwrap();

        let loaded: Vec<PaymentRequest> = kv.get(keys::PAYMENT_REQUESTS).unwrap().unwrap();
        assert_eq!(loaded[0].id, request.id);
        assert_eq!(loaded[0].amount, request.amount);
        assert_eq!(loaded[0].status, request.status);
    }

    #[test]
    fn test_txn_error_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        kv.put("smm/ledger", &vec![1u32]).unwrap();

        let result: Result<()> = kv.with(|txn| {
            txn.put("smm/ledger", &vec![1u32, 2u32])?;
            Err(StoreError::Conflict("boom".into()))
        });
        assert!(result.is_err());

        let values: Vec<u32> = kv.get("smm/ledger").unwrap().unwrap();
        assert_eq!(values, vec![1]);
    }

    #[test]
    fn test_unreadable_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let kv = KvStore::open(dir.path()).unwrap();
            kv.put(keys::PLATFORMS, &vec![platform()]).unwrap();
        }
        fs::write(dir.path().join("smm.platforms.json"), b"{ not json").unwrap();

        let kv = KvStore::open(dir.path()).unwrap();
        let loaded: Option<Vec<Platform>> = kv.get(keys::PLATFORMS).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_reload_sees_other_store_write() {
        let dir = tempfile::tempdir().unwrap();
        let kv_a = KvStore::open(dir.path()).unwrap();
        let kv_b = KvStore::open(dir.path()).unwrap();

        kv_b.put(keys::LAST_UPDATE, &42i64).unwrap();

        // The cached view predates the write; reload goes back to the file
        // and updates the cache.
        assert_eq!(kv_a.get::<i64>(keys::LAST_UPDATE).unwrap(), None);
        assert_eq!(kv_a.reload::<i64>(keys::LAST_UPDATE).unwrap(), Some(42));
        assert_eq!(kv_a.get::<i64>(keys::LAST_UPDATE).unwrap(), Some(42));
    }

    #[test]
    fn test_reload_drops_removed_document() {
        let dir = tempfile::tempdir().unwrap();
        let kv_a = KvStore::open(dir.path()).unwrap();
        kv_a.put(keys::ORDERS, &vec![1u32]).unwrap();

        let kv_b = KvStore::open(dir.path()).unwrap();
        kv_b.remove(keys::ORDERS).unwrap();

        assert_eq!(kv_a.reload::<Vec<u32>>(keys::ORDERS).unwrap(), None);
        assert_eq!(kv_a.get::<Vec<u32>>(keys::ORDERS).unwrap(), None);
    }

    #[test]
    fn test_schema_version_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let version: u32 = kv.get(keys::SCHEMA_VERSION).unwrap().unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_cart_key_sanitizes_session() {
        assert_eq!(keys::cart("abc-123"), "smm/cart/abc-123");
        assert_eq!(keys::cart("../evil"), "smm/cart/___evil");
    }
}
