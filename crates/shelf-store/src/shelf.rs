//! Dynamic facade over a store, keyed by name.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::directory::{validate_name, Directory, StoreOptions, StoreStats, TEMP_SUFFIX};
use crate::recovery::SweepReport;
use crate::shadow::Shadow;
use crate::shelved::Shelved;
use crate::value::{Shelvable, Value};
use crate::Result;

/// A store of named values
///
/// ```ignore
/// let shelf = Shelf::open(&StoreOptions::new("/var/lib/shelf"))?;
/// shelf.put("counter", 10i64)?;
/// assert_eq!(shelf.get("counter")?, Value::Integer(10));
/// ```
#[derive(Debug, Clone)]
pub struct Shelf {
    dir: Arc<Directory>,
}

impl Shelf {
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let dir = Directory::open(options)?;
        info!(root = %dir.root().display(), swap = dir.swap_strategy(), "opened shelf");
        Ok(Self { dir: Arc::new(dir) })
    }

    /// Store `value` under `name`, creating it or atomically replacing it.
    ///
    /// Replacing with a value of another kind fails with `TypeConflict`.
    #[instrument(skip(self, value), level = "debug")]
    pub fn put(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        validate_name(name)?;
        match self.dir.open_segment(name)? {
            Some(segment) => {
                let mut shelved = Shelved::<Value>::bind(&self.dir, segment, Some(value.type_tag()))?;
                shelved.commit(value)
            }
            None => Shelved::create(&self.dir, name, value).map(|_| ()),
        }
    }

    /// Current value of `name`, whatever its kind
    pub fn get(&self, name: &str) -> Result<Value> {
        Ok(self.open_value::<Value>(name)?.value().clone())
    }

    /// Typed proxy for `name`
    pub fn open_value<T: Shelvable>(&self, name: &str) -> Result<Shelved<T>> {
        Shelved::open(&self.dir, name)
    }

    /// Materialize `shadow` against this store
    pub fn materialize<T: Shelvable>(&self, shadow: Shadow<T>) -> Result<Shelved<T>> {
        shadow.materialize(&self.dir)
    }

    /// Public value names, sorted; leftover `-tmp` segments are not listed
    pub fn names(&self) -> Vec<String> {
        self.dir
            .names()
            .into_iter()
            .filter(|n| !n.ends_with(TEMP_SUFFIX))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.dir.exists(name)
    }

    pub fn erase(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.dir.erase(name)
    }

    pub fn stats(&self) -> StoreStats {
        self.dir.stats()
    }

    pub fn sweep(&self) -> Result<SweepReport> {
        self.dir.sweep()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.dir
    }
}
