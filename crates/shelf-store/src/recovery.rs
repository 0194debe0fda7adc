//! Recovery sweep.
//!
//! Reclaims what an interrupted process can leave behind:
//! - `<name>-tmp` segments whose `<name>` is bound (candidate of an update
//!   that crashed before the swap, or the old value after it)
//! - segments with an all-zero header, or shorter than a header (create
//!   that never committed)
//!
//! Segments with any other corruption are reported and left in place.
//!
//! The sweep must not run while an update is in flight on the same store: it
//! cannot tell an in-flight candidate from a leftover one.

use tracing::warn;

use crate::directory::{Directory, TEMP_SUFFIX};
use crate::header;
use crate::{HeaderFault, Result, StoreError};

/// What a sweep found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Segments erased
    pub reclaimed: Vec<String>,
    /// `-tmp` segments without a live base name, left alone
    pub orphans: Vec<String>,
    /// Corrupt segments, left alone: (name, reason)
    pub corrupt: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.reclaimed.is_empty() && self.orphans.is_empty() && self.corrupt.is_empty()
    }
}

pub(crate) fn sweep(dir: &Directory) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for name in dir.names() {
        if let Some(base) = name.strip_suffix(TEMP_SUFFIX) {
            if dir.exists(base) {
                dir.erase(&name)?;
                report.reclaimed.push(name);
            } else {
                warn!(segment = %name, "temp segment without base name");
                report.orphans.push(name);
            }
            continue;
        }

        let segment = match dir.open_segment(&name) {
            Ok(Some(segment)) => segment,
            Ok(None) => continue,
            Err(StoreError::CorruptHeader {
                reason: HeaderFault::Uncommitted,
                ..
            }) => {
                // Crashed between creating the file and sizing it
                dir.erase(&name)?;
                report.reclaimed.push(name);
                continue;
            }
            Err(e) if e.is_corruption() => {
                warn!(segment = %name, error = %e, "corrupt segment");
                report.corrupt.push((name, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        match header::read_payload(&segment) {
            Ok(_) => {}
            Err(StoreError::CorruptHeader {
                reason: HeaderFault::Uncommitted,
                ..
            }) => {
                drop(segment);
                dir.erase(&name)?;
                report.reclaimed.push(name);
            }
            Err(e) if e.is_corruption() => {
                warn!(segment = %name, error = %e, "corrupt segment");
                report.corrupt.push((name, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreOptions, TypeTag};
    use tempfile::tempdir;

    fn committed(dir: &Directory, name: &str, payload: &[u8]) {
        dir.create_pending(name, header::HEADER_SIZE + payload.len())
            .unwrap()
            .commit(TypeTag::Bytes, payload)
            .unwrap();
    }

    #[test]
    fn test_clean_store() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        committed(&dir, "a", b"one");
        assert!(dir.sweep().unwrap().is_clean());
    }

    #[test]
    fn test_reclaims_temp_and_uncommitted() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        committed(&dir, "a", b"one");
        committed(&dir, "a-tmp", b"stale");
        // Never committed
        dir.create("half", 64, false).unwrap();

        let report = dir.sweep().unwrap();
        let mut reclaimed = report.reclaimed.clone();
        reclaimed.sort();
        assert_eq!(reclaimed, vec!["a-tmp".to_string(), "half".to_string()]);
        assert_eq!(dir.names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_reclaims_segment_shorter_than_header() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        let seg = dir.create("stub", header::HEADER_SIZE + 8, false).unwrap();
        let path = seg.path().to_path_buf();
        drop(seg);
        drop(dir);
        std::fs::write(&path, b"").unwrap();

        let dir = Directory::open(&StoreOptions::new(temp.path()).sweep_on_open(false)).unwrap();
        let report = dir.sweep().unwrap();
        assert_eq!(report.reclaimed, vec!["stub".to_string()]);
        assert!(report.corrupt.is_empty());
        assert!(!path.exists());

        // The name is usable again
        committed(&dir, "stub", b"fresh");
        assert!(dir.sweep().unwrap().is_clean());
    }

    #[test]
    fn test_orphan_temp_is_kept() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        committed(&dir, "b-tmp", b"lonely");

        let report = dir.sweep().unwrap();
        assert_eq!(report.orphans, vec!["b-tmp".to_string()]);
        assert!(dir.exists("b-tmp"));
    }

    #[test]
    fn test_corrupt_segment_is_reported_not_erased() {
        let temp = tempdir().unwrap();
        let dir = Directory::open(&StoreOptions::new(temp.path())).unwrap();
        let mut seg = dir.create("bad", 40, false).unwrap();
        let mut bytes = header::Header::for_payload(TypeTag::Integer, &[0; 8]).to_bytes();
        bytes[6..8].copy_from_slice(&42u16.to_le_bytes());
        seg.write_at(0, &bytes).unwrap();
        seg.flush().unwrap();
        drop(seg);

        let report = dir.sweep().unwrap();
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.corrupt[0].0, "bad");
        assert!(dir.exists("bad"));
    }
}
