//! The loaded dump plus a per-record tree cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::DumpError;
use crate::record::{load_directory, Dump, LoadOptions, RawRecord};
use crate::registry::Registry;
use crate::tree::{get_tree, ProjectionConfig, TreeNode};

struct CachedTree {
    payload: Arc<[u8]>,
    tree: Arc<TreeNode>,
}

/// Holds the current [`Dump`] and lazily projects trees for its records.
///
/// A reload builds a complete new dump and swaps it in; readers holding the
/// previous `Arc<Dump>` keep a consistent view.
pub struct Inspector {
    registry: Arc<Registry>,
    config: ProjectionConfig,
    dump: RwLock<Arc<Dump>>,
    // Keyed by file name; a hit also requires the same payload allocation.
    cache: Mutex<HashMap<String, CachedTree>>,
}

impl Inspector {
    pub fn new(registry: Arc<Registry>, config: ProjectionConfig) -> Self {
        Self {
            registry,
            config,
            dump: RwLock::new(Arc::new(Dump::default())),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// The current dump. Empty until the first successful load.
    pub fn dump(&self) -> Arc<Dump> {
        Arc::clone(&self.dump.read())
    }

    /// Loads `dir` and replaces the current dump. On error the previous dump
    /// stays in place.
    pub fn load(
        &self,
        dir: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<Arc<Dump>, DumpError> {
        let dump = Arc::new(load_directory(dir, &self.registry, options)?);
        *self.dump.write() = Arc::clone(&dump);
        self.cache.lock().clear();
        Ok(dump)
    }

    /// Tree of `record`, projected on first request and cached after.
    pub fn tree(&self, record: &RawRecord) -> Arc<TreeNode> {
        if let Some(cached) = self.cache.lock().get(&record.file_name) {
            if Arc::ptr_eq(&cached.payload, &record.payload) {
                return Arc::clone(&cached.tree);
            }
        }
        let tree = Arc::new(get_tree(record, &self.registry, &self.config));
        self.cache.lock().insert(
            record.file_name.clone(),
            CachedTree {
                payload: Arc::clone(&record.payload),
                tree: Arc::clone(&tree),
            },
        );
        tree
    }

    /// Tree of the record with `sequence` in the current dump.
    pub fn tree_by_sequence(&self, sequence: u64) -> Option<Arc<TreeNode>> {
        let dump = self.dump();
        dump.get(sequence).map(|record| self.tree(record))
    }

    pub fn cached_trees(&self) -> usize {
        self.cache.lock().len()
    }
}
