//! In-memory key-value stores handed to the L2 node.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::lifecycle::Lifecycle;

/// A byte-keyed store that lives for one run.
#[derive(Debug, Default)]
pub struct MemStore {
    name: String,
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.entries().get(key).cloned())
    }

    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        self.ensure_open()?;
        self.entries().insert(key.into(), value.into());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drop all entries. Closing twice is an error.
    pub fn close(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.closed.swap(true, Ordering::SeqCst),
            "{} store already closed",
            self.name
        );
        self.entries().clear();
        Ok(())
    }

    fn ensure_open(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.is_closed(), "{} store is closed", self.name);
        Ok(())
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The stores an L2 node is built from.
#[derive(Debug, Clone)]
pub struct L2Stores {
    pub app: Arc<MemStore>,
    pub block: Arc<MemStore>,
    pub tx: Arc<MemStore>,
    pub mempool: Arc<MemStore>,
}

impl L2Stores {
    /// Create the stores and register each one's close with `lifecycle`.
    pub fn open(lifecycle: &Lifecycle) -> Self {
        let open = |name: &str| {
            let store = Arc::new(MemStore::new(name));
            let handle = store.clone();
            lifecycle.defer_err(format!("close {name} db"), move || handle.close());
            store
        };

        Self {
            app: open("app"),
            block: open("block"),
            tx: open("tx"),
            mempool: open("mempool"),
        }
    }

    pub fn all(&self) -> [&Arc<MemStore>; 4] {
        [&self.app, &self.block, &self.tx, &self.mempool]
    }
}
