//! Shelved values: live proxies bound to a segment.
//!
//! Reads return the cached value and never touch storage. The computed
//! helpers (`plus`, `concat`, `scale`, ...) are pure: they return a plain
//! value. The only way to change what is stored is [`Shelved::commit`],
//! which runs the atomic update protocol.
//!
//! ```ignore
//! let mut counter = Shadow::new("counter", 10i64).materialize(&dir)?;
//! let next = counter.plus(1).expect("no overflow");
//! counter.commit(next)?;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::directory::{validate_name, Directory};
use crate::header::{self, TypeTag, HEADER_SIZE};
use crate::segment::Segment;
use crate::update::{AtomicUpdate, UpdateStep};
use crate::value::{NdArray, Shelvable};
use crate::{Result, StoreError};

/// Live proxy for one named value
pub struct Shelved<T: Shelvable> {
    dir: Arc<Directory>,
    name: String,
    tag: TypeTag,
    segment: Segment,
    cached: T,
}

impl<T: Shelvable> Shelved<T> {
    /// Reopen an existing value by name
    pub fn open(dir: &Arc<Directory>, name: &str) -> Result<Self> {
        validate_name(name)?;
        let segment = dir.open_segment(name)?.ok_or_else(|| StoreError::not_found(name))?;
        Self::bind(dir, segment, None)
    }

    /// Wrap an opened segment, decoding its payload into the cache.
    ///
    /// `expected` is the tag the caller requires; otherwise `T` decides.
    pub(crate) fn bind(dir: &Arc<Directory>, segment: Segment, expected: Option<TypeTag>) -> Result<Self> {
        let name = segment.name().to_string();
        let (hdr, payload) = header::read_payload(&segment)?;

        let expected = expected.or(T::TAG);
        if !T::accepts(hdr.tag) || expected.map_or(false, |t| t != hdr.tag) {
            return Err(StoreError::TypeConflict {
                name,
                expected: expected.unwrap_or(hdr.tag),
                found: hdr.tag,
            });
        }

        let cached = T::decode(hdr.tag, payload).map_err(|e| StoreError::CorruptPayload {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            dir: Arc::clone(dir),
            name,
            tag: hdr.tag,
            segment,
            cached,
        })
    }

    /// Create a fresh segment for `value`; fails with `NameExists` if bound
    pub(crate) fn create(dir: &Arc<Directory>, name: &str, value: T) -> Result<Self> {
        validate_name(name)?;
        let tag = value.type_tag();
        let payload = value.encode();

        let pending = dir.create_pending(name, HEADER_SIZE + payload.len())?;
        let segment = pending.commit(tag, &payload)?;

        Ok(Self {
            dir: Arc::clone(dir),
            name: name.to_string(),
            tag,
            segment,
            cached: value,
        })
    }

    /// Current value, from the cache
    pub fn value(&self) -> &T {
        &self.cached
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    /// Size of the bound segment, header included
    pub fn segment_len(&self) -> usize {
        self.segment.len()
    }

    /// Durably replace the stored value
    pub fn commit(&mut self, value: T) -> Result<()> {
        self.commit_observed(value, |_| Ok(()))
    }

    /// [`commit`](Self::commit) with `hook` called before each protocol step.
    ///
    /// An error from the hook stops the update where it stands, with no
    /// cleanup, as a crash at that step would.
    pub fn commit_observed<F>(&mut self, value: T, mut hook: F) -> Result<()>
    where
        F: FnMut(UpdateStep) -> Result<()>,
    {
        let tag = value.type_tag();
        if tag != self.tag {
            return Err(StoreError::TypeConflict {
                name: self.name.clone(),
                expected: self.tag,
                found: tag,
            });
        }

        let (outcome, swapped) = {
            let mut update = AtomicUpdate::new(&self.dir, &self.name, self.tag);
            let outcome = update.run(&value, &mut hook);
            (outcome, update.swapped())
        };

        match outcome {
            Ok(segment) => {
                self.segment = segment;
                self.cached = value;
                Ok(())
            }
            Err(e) => {
                // Past the swap the name already holds the new value
                if swapped {
                    self.cached = value;
                    if let Ok(Some(segment)) = self.dir.open_segment(&self.name) {
                        self.segment = segment;
                    }
                }
                Err(e)
            }
        }
    }

    /// Drop the proxy. The segment stays in the store.
    pub fn release(self) {}
}

impl<T: Shelvable + PartialEq> PartialEq<T> for Shelved<T> {
    fn eq(&self, other: &T) -> bool {
        self.cached == *other
    }
}

impl<T: Shelvable + fmt::Debug> fmt::Debug for Shelved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelved")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("value", &self.cached)
            .finish()
    }
}

impl<T: Shelvable + fmt::Display> fmt::Display for Shelved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cached, f)
    }
}

// ============================================================================
// Computed results (pure, never persisted)
// ============================================================================

impl Shelved<i64> {
    pub fn plus(&self, x: i64) -> Option<i64> {
        self.cached.checked_add(x)
    }

    pub fn minus(&self, x: i64) -> Option<i64> {
        self.cached.checked_sub(x)
    }

    pub fn times(&self, x: i64) -> Option<i64> {
        self.cached.checked_mul(x)
    }

    /// True division, promoted to `f64`
    pub fn divide(&self, x: i64) -> f64 {
        self.cached as f64 / x as f64
    }

    /// Division truncated toward zero. Explicit opt-in: `divide` promotes.
    pub fn div_trunc(&self, x: i64) -> Option<i64> {
        self.cached.checked_div(x)
    }

    pub fn rem(&self, x: i64) -> Option<i64> {
        self.cached.checked_rem(x)
    }

    pub fn pow(&self, exp: u32) -> Option<i64> {
        self.cached.checked_pow(exp)
    }

    pub fn shl(&self, bits: u32) -> Option<i64> {
        self.cached.checked_shl(bits)
    }

    pub fn shr(&self, bits: u32) -> Option<i64> {
        self.cached.checked_shr(bits)
    }

    pub fn bitand(&self, x: i64) -> i64 {
        self.cached & x
    }

    pub fn bitor(&self, x: i64) -> i64 {
        self.cached | x
    }

    pub fn bitxor(&self, x: i64) -> i64 {
        self.cached ^ x
    }
}

impl Shelved<f64> {
    pub fn plus(&self, x: f64) -> f64 {
        self.cached + x
    }

    pub fn minus(&self, x: f64) -> f64 {
        self.cached - x
    }

    pub fn times(&self, x: f64) -> f64 {
        self.cached * x
    }

    pub fn divide(&self, x: f64) -> f64 {
        self.cached / x
    }
}

impl Shelved<String> {
    pub fn concat(&self, suffix: &str) -> String {
        let mut out = String::with_capacity(self.cached.len() + suffix.len());
        out.push_str(&self.cached);
        out.push_str(suffix);
        out
    }
}

impl Shelved<Vec<u8>> {
    pub fn concat(&self, suffix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.cached.len() + suffix.len());
        out.extend_from_slice(&self.cached);
        out.extend_from_slice(suffix);
        out
    }
}

impl Shelved<NdArray> {
    pub fn sum(&self) -> f64 {
        self.cached.sum()
    }

    pub fn scale(&self, factor: f64) -> NdArray {
        self.cached.scale(factor)
    }
}
