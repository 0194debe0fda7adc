//! Atomic update protocol.
//!
//! Replaces the segment bound to `name` so that, at every point a crash can
//! hit, `name` resolves to either the whole old value or the whole new one:
//!
//! 1. encode the new value, derive `<name>-tmp`
//! 2. create `<name>-tmp` (a stale one is erased and creation retried once)
//! 3. write payload then header into it and flush
//! 4. release the binding to the candidate without erasing it
//! 5. swap `<name>` and `<name>-tmp` in one durable step
//! 6. erase `<name>-tmp`, which now holds the old value (best effort)
//! 7. rebind to the segment now under `<name>`
//!
//! The candidate is complete and durable (step 3) strictly before it becomes
//! reachable under `<name>` (step 5). A crash before step 5 loses only the
//! candidate; a crash after it leaves a stale `<name>-tmp` that the recovery
//! sweep reclaims.

use std::fmt;

use tracing::{debug, info, warn};

use crate::directory::{Directory, TEMP_SUFFIX};
use crate::header::{TypeTag, HEADER_SIZE};
use crate::segment::{PendingSegment, Segment};
use crate::value::Shelvable;
use crate::{Result, StoreError};

/// Protocol steps, in order. A hook sees each one before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateStep {
    Encode = 1,
    CreateTemp = 2,
    WriteTemp = 3,
    ReleaseTemp = 4,
    Swap = 5,
    ReclaimOld = 6,
    Rebind = 7,
}

impl UpdateStep {
    pub const ALL: [UpdateStep; 7] = [
        UpdateStep::Encode,
        UpdateStep::CreateTemp,
        UpdateStep::WriteTemp,
        UpdateStep::ReleaseTemp,
        UpdateStep::Swap,
        UpdateStep::ReclaimOld,
        UpdateStep::Rebind,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({:?})", self.number(), self)
    }
}

/// Name of the candidate segment for an update of `name`
pub fn temp_name(name: &str) -> String {
    format!("{}{}", name, TEMP_SUFFIX)
}

/// One run of the protocol against a single name
pub(crate) struct AtomicUpdate<'d> {
    dir: &'d Directory,
    name: &'d str,
    tag: TypeTag,
    swapped: bool,
}

impl<'d> AtomicUpdate<'d> {
    pub(crate) fn new(dir: &'d Directory, name: &'d str, tag: TypeTag) -> Self {
        Self {
            dir,
            name,
            tag,
            swapped: false,
        }
    }

    /// Whether step 5 completed, i.e. `name` durably holds the new value
    pub(crate) fn swapped(&self) -> bool {
        self.swapped
    }

    /// Drive the protocol to completion, returning the new binding.
    ///
    /// Errors from `hook` stop the run on the spot with no cleanup, the way
    /// a crash would. Errors from the store roll back the candidate.
    pub(crate) fn run<T, F>(&mut self, value: &T, hook: &mut F) -> Result<Segment>
    where
        T: Shelvable,
        F: FnMut(UpdateStep) -> Result<()>,
    {
        hook(UpdateStep::Encode)?;
        let payload = value.encode();
        let tmp = temp_name(self.name);

        hook(UpdateStep::CreateTemp)?;
        let pending = self.create_temp(&tmp, HEADER_SIZE + payload.len())?;

        if let Err(e) = hook(UpdateStep::WriteTemp) {
            // The uncommitted candidate stays behind for the sweep
            pending.abandon();
            return Err(e);
        }
        let candidate = pending.commit(self.tag, &payload)?;

        hook(UpdateStep::ReleaseTemp)?;
        drop(candidate);

        hook(UpdateStep::Swap)?;
        if let Err(e) = self.dir.atomic_swap(self.name, &tmp) {
            self.rollback(&tmp);
            return Err(e);
        }
        self.swapped = true;

        hook(UpdateStep::ReclaimOld)?;
        if let Err(e) = self.dir.erase(&tmp) {
            warn!(segment = %tmp, error = %e, "could not reclaim old segment, leaving it for the sweep");
        }

        hook(UpdateStep::Rebind)?;
        let segment = self
            .dir
            .open_segment(self.name)?
            .ok_or_else(|| StoreError::not_found(self.name))?;

        info!(
            name = self.name,
            tag = %self.tag,
            bytes = payload.len(),
            "committed update"
        );
        Ok(segment)
    }

    fn create_temp(&self, tmp: &str, size: usize) -> Result<PendingSegment<'d>> {
        match self.dir.create_pending(tmp, size) {
            Err(StoreError::NameExists { .. }) => {
                warn!(segment = tmp, "stale temp segment from an interrupted update, erasing");
                match self.dir.erase(tmp) {
                    Ok(()) | Err(StoreError::NotFound { .. }) => {}
                    Err(e) => return Err(self.aborted(e)),
                }
                self.dir
                    .create_pending(tmp, size)
                    .map_err(|e| self.aborted(e))
            }
            other => other,
        }
    }

    fn rollback(&self, tmp: &str) {
        debug!(segment = tmp, "rolling back candidate segment");
        if let Err(e) = self.dir.erase(tmp) {
            warn!(segment = tmp, error = %e, "rollback could not erase candidate");
        }
    }

    fn aborted(&self, source: StoreError) -> StoreError {
        StoreError::UpdateAborted {
            name: self.name.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header;
    use crate::StoreOptions;
    use tempfile::tempdir;

    fn seed(dir: &Directory, name: &str, value: i64) {
        dir.create_pending(name, HEADER_SIZE + 8)
            .unwrap()
            .commit(TypeTag::Integer, &value.encode())
            .unwrap();
    }

    fn read_i64(dir: &Directory, name: &str) -> i64 {
        let seg = dir.open_segment(name).unwrap().unwrap();
        let (hdr, payload) = header::read_payload(&seg).unwrap();
        i64::decode(hdr.tag, payload).unwrap()
    }

    #[test]
    fn test_temp_name() {
        assert_eq!(temp_name("counter"), "counter-tmp");
    }

    #[test]
    fn test_run_replaces_value() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        seed(&dir, "n", 1);

        let mut steps = Vec::new();
        let mut update = AtomicUpdate::new(&dir, "n", TypeTag::Integer);
        let seg = update
            .run(&2i64, &mut |step| {
                steps.push(step);
                Ok(())
            })
            .unwrap();

        assert_eq!(steps, UpdateStep::ALL.to_vec());
        assert!(update.swapped());
        assert_eq!(seg.name(), "n");
        drop(seg);
        assert_eq!(read_i64(&dir, "n"), 2);
        assert!(!dir.exists("n-tmp"));
    }

    #[test]
    fn test_stale_temp_is_replaced() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        seed(&dir, "n", 1);
        seed(&dir, "n-tmp", 99);

        let mut update = AtomicUpdate::new(&dir, "n", TypeTag::Integer);
        update.run(&5i64, &mut |_| Ok(())).unwrap();

        assert_eq!(read_i64(&dir, "n"), 5);
        assert!(!dir.exists("n-tmp"));
    }

    #[test]
    fn test_out_of_space_keeps_old_value() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path()).size_mb(1)).unwrap();
        seed(&dir, "blob", 7);
        // Leave less room than a second integer segment needs
        let filler = 1024 * 1024 - 2 * (HEADER_SIZE + 8) + 1;
        dir.create("filler", filler, false).unwrap();

        let mut update = AtomicUpdate::new(&dir, "blob", TypeTag::Integer);
        let err = update.run(&8i64, &mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::OutOfSpace { .. }));
        assert!(!update.swapped());
        assert_eq!(read_i64(&dir, "blob"), 7);
        assert!(!dir.exists("blob-tmp"));
    }

    #[test]
    fn test_hook_error_before_write_leaves_uncommitted_temp() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        seed(&dir, "n", 1);

        let mut update = AtomicUpdate::new(&dir, "n", TypeTag::Integer);
        let err = update
            .run(&2i64, &mut |step| {
                if step == UpdateStep::WriteTemp {
                    Err(StoreError::not_found("halt"))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!update.swapped());

        let candidate = dir.open_segment("n-tmp").unwrap().unwrap();
        assert!(matches!(
            header::read_payload(&candidate),
            Err(StoreError::CorruptHeader {
                reason: crate::HeaderFault::Uncommitted,
                ..
            })
        ));
        drop(candidate);
        assert_eq!(read_i64(&dir, "n"), 1);

        let report = dir.sweep().unwrap();
        assert_eq!(report.reclaimed, vec!["n-tmp".to_string()]);
    }

    #[test]
    fn test_swap_failure_rolls_back_candidate() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        seed(&dir, "n", 1);

        // Remove the live name behind the protocol's back so the swap fails
        let mut update = AtomicUpdate::new(&dir, "n", TypeTag::Integer);
        let err = update
            .run(&2i64, &mut |step| {
                if step == UpdateStep::Swap {
                    dir.erase("n")?;
                }
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!dir.exists("n-tmp"));
    }
}
