use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

use crate::internal::config::PoolConfig;

/// Where the catalog is loaded from and saved to.
///
/// The pool calls `save` once per mutating operation that changes persisted
/// data, while still holding its lock.
pub trait CatalogStore: Send + Sync + Debug {
    fn load(&self) -> crate::Result<Option<PoolConfig>>;
    fn save(&self, config: &PoolConfig) -> crate::Result<()>;
}

impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    fn load(&self) -> crate::Result<Option<PoolConfig>> {
        (**self).load()
    }

    fn save(&self, config: &PoolConfig) -> crate::Result<()> {
        (**self).save(config)
    }
}

/// Store that keeps nothing.
#[derive(Debug, Default)]
pub struct NoopStore;

impl CatalogStore for NoopStore {
    fn load(&self) -> crate::Result<Option<PoolConfig>> {
        Ok(None)
    }

    fn save(&self, _: &PoolConfig) -> crate::Result<()> {
        Ok(())
    }
}

/// Keeps the last saved catalog in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    config: Option<PoolConfig>,
    saves: usize,
}

impl MemoryStore {
    pub fn new(config: PoolConfig) -> Self {
        MemoryStore {
            inner: Mutex::new(MemoryStoreInner {
                config: Some(config),
                saves: 0,
            }),
        }
    }

    pub fn last_saved(&self) -> Option<PoolConfig> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).saves
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> crate::Result<Option<PoolConfig>> {
        Ok(self.last_saved())
    }

    fn save(&self, config: &PoolConfig) -> crate::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.config = Some(config.clone());
        inner.saves += 1;
        Ok(())
    }
}
