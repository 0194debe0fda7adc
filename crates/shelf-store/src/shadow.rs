use std::sync::Arc;

use tracing::debug;

use crate::directory::{validate_name, Directory};
use crate::shelved::Shelved;
use crate::value::Shelvable;
use crate::Result;

/// Description of a value that should exist under `name`.
///
/// Owns no storage. Materializing it either binds to the segment already
/// stored under the name (whose content wins over `value`) or creates one.
#[derive(Debug, Clone)]
pub struct Shadow<T: Shelvable> {
    name: String,
    value: T,
}

impl<T: Shelvable> Shadow<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Bind to the stored value, or create it from this shadow.
    ///
    /// Fails with `TypeConflict` if the stored tag differs from the shadow's.
    pub fn materialize(self, dir: &Arc<Directory>) -> Result<Shelved<T>> {
        validate_name(&self.name)?;
        match dir.open_segment(&self.name)? {
            Some(segment) => {
                debug!(name = %self.name, "reopening stored value");
                Shelved::bind(dir, segment, Some(self.value.type_tag()))
            }
            None => Shelved::create(dir, &self.name, self.value),
        }
    }

    /// Always create a fresh segment; `NameExists` if the name is bound.
    pub fn build_from_copy(dir: &Arc<Directory>, name: &str, value: T) -> Result<Shelved<T>> {
        Shelved::create(dir, name, value)
    }
}
