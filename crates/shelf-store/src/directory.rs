//! Segment Directory: name → segment mapping over a store root.
//!
//! Segment files live under `<root>/segments/` as `hex(name).seg`. The
//! directory keeps an in-memory table of names and sizes (rebuilt on open)
//! for capacity accounting; the filesystem is the source of truth.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use tracing::{debug, info, instrument, warn};

use crate::recovery::{self, SweepReport};
use crate::header::HEADER_SIZE;
use crate::segment::{PendingSegment, Segment};
use crate::swap::{self, SwapMode, SwapStrategy};
use crate::{HeaderFault, Result, StoreError};

/// Suffix reserved for the update protocol's candidate segments
pub const TEMP_SUFFIX: &str = "-tmp";

/// Longest accepted value name, in bytes
pub const MAX_NAME_LEN: usize = 96;

const SEGMENTS_DIR: &str = "segments";
const SEGMENT_EXT: &str = "seg";
const LOCK_FILE: &str = ".lock";

/// Options for opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Backing directory (the persistent region)
    pub root: PathBuf,
    /// Capacity of the region in MiB
    pub size_mb: u64,
    /// Discard all existing segments on open
    pub force_new: bool,
    /// Reclaim leftover temp and uncommitted segments on open
    pub sweep_on_open: bool,
    pub swap_mode: SwapMode,
}

impl StoreOptions {
    pub const DEFAULT_SIZE_MB: u64 = 32;

    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            size_mb: Self::DEFAULT_SIZE_MB,
            force_new: false,
            sweep_on_open: true,
            swap_mode: SwapMode::Auto,
        }
    }

    pub fn size_mb(mut self, size_mb: u64) -> Self {
        self.size_mb = size_mb;
        self
    }

    pub fn force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }

    pub fn sweep_on_open(mut self, sweep: bool) -> Self {
        self.sweep_on_open = sweep;
        self
    }

    pub fn swap_mode(mut self, mode: SwapMode) -> Self {
        self.swap_mode = mode;
        self
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.size_mb.saturating_mul(1024 * 1024)
    }
}

/// Store usage snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub segment_count: u64,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
}

impl StoreStats {
    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }
}

#[derive(Debug, Default)]
struct SegmentTable {
    sizes: HashMap<String, u64>,
    used: u64,
}

/// Validate a user-facing value name.
///
/// Names ending in [`TEMP_SUFFIX`] are reserved for the update protocol.
pub fn validate_name(name: &str) -> Result<()> {
    check_segment_name(name)?;
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(name, "too long"));
    }
    if name.ends_with(TEMP_SUFFIX) {
        return Err(invalid(name, "suffix -tmp is reserved"));
    }
    Ok(())
}

fn check_segment_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "empty"));
    }
    if name.len() > MAX_NAME_LEN + TEMP_SUFFIX.len() {
        return Err(invalid(name, "too long"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(invalid(name, "contains '/' or NUL"));
    }
    Ok(())
}

fn invalid(name: &str, reason: &'static str) -> StoreError {
    StoreError::InvalidName {
        name: name.to_string(),
        reason,
    }
}

/// Handle on an open store.
///
/// Holds an exclusive lock on `<root>/.lock` until dropped.
pub struct Directory {
    root: PathBuf,
    segments_dir: PathBuf,
    capacity: u64,
    table: Mutex<SegmentTable>,
    swap: Box<dyn SwapStrategy>,
    _lock: File,
}

impl Directory {
    /// Open (or create) the store described by `options`.
    ///
    /// Finishes any interrupted journaled swap before building the name
    /// table, then runs the recovery sweep if enabled.
    #[instrument(skip(options), fields(root = ?options.root), level = "debug")]
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let root = options.root.clone();
        let segments_dir = root.join(SEGMENTS_DIR);
        fs::create_dir_all(&segments_dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        match lock.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(StoreError::StoreLocked {
                    root: root.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if swap::replay_journal(&root)? {
            info!("replayed interrupted swap journal");
        }

        if options.force_new {
            let removed = wipe_segments(&segments_dir)?;
            info!(removed, "force_new: discarded existing segments");
        }

        let table = scan_segments(&segments_dir)?;
        let swap = swap::select_strategy(options.swap_mode, &root);
        debug!(
            segments = table.sizes.len(),
            used = table.used,
            strategy = swap.name(),
            "store opened"
        );

        let dir = Self {
            root,
            segments_dir,
            capacity: options.capacity_bytes(),
            table: Mutex::new(table),
            swap,
            _lock: lock,
        };

        if options.sweep_on_open {
            let report = dir.sweep()?;
            if !report.is_clean() {
                info!(
                    reclaimed = report.reclaimed.len(),
                    orphans = report.orphans.len(),
                    corrupt = report.corrupt.len(),
                    "recovery sweep"
                );
            }
        }

        Ok(dir)
    }

    fn table(&self) -> MutexGuard<'_, SegmentTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn segment_path(&self, name: &str) -> PathBuf {
        self.segments_dir
            .join(format!("{}.{}", hex::encode(name.as_bytes()), SEGMENT_EXT))
    }

    /// Create a segment of exactly `size` bytes bound to `name`.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&self, name: &str, size: usize, zero_init: bool) -> Result<Segment> {
        check_segment_name(name)?;
        let requested = size as u64;

        // Reserve the name and the bytes, then do the I/O unlocked
        {
            let mut table = self.table();
            if table.sizes.contains_key(name) {
                return Err(StoreError::NameExists {
                    name: name.to_string(),
                });
            }
            let available = self.capacity.saturating_sub(table.used);
            if requested > available {
                return Err(StoreError::OutOfSpace {
                    requested,
                    available,
                });
            }
            table.sizes.insert(name.to_string(), requested);
            table.used += requested;
        }

        let path = self.segment_path(name);
        let created = Segment::create(name, &path, size, zero_init)
            .and_then(|segment| swap::sync_dir(&self.segments_dir).map(|()| segment));

        match created {
            Ok(segment) => Ok(segment),
            Err(e) => {
                let available = {
                    let mut table = self.table();
                    if table.sizes.remove(name).is_some() {
                        table.used -= requested;
                    }
                    self.capacity.saturating_sub(table.used)
                };
                if e.kind() != io::ErrorKind::AlreadyExists {
                    discard_partial(name, &path);
                }
                Err(map_create_error(name, requested, available, e))
            }
        }
    }

    /// Create a segment wrapped in a write transaction that erases it unless committed
    pub fn create_pending(&self, name: &str, size: usize) -> Result<PendingSegment<'_>> {
        let segment = self.create(name, size, false)?;
        Ok(PendingSegment::new(self, segment))
    }

    /// Look up `name`. Never creates.
    ///
    /// The table lock is held across the path lookup and the mapping, so a
    /// journaled swap (three renames under the same lock) is never observed
    /// half done. A file shorter than the header cannot carry a committed
    /// header and is reported as [`HeaderFault::Uncommitted`].
    #[instrument(skip(self), level = "debug")]
    pub fn open_segment(&self, name: &str) -> Result<Option<Segment>> {
        let table = self.table();
        if !table.sizes.contains_key(name) {
            return Ok(None);
        }
        let path = self.segment_path(name);
        match fs::metadata(&path) {
            Ok(meta) if meta.len() < HEADER_SIZE as u64 => {
                return Err(StoreError::CorruptHeader {
                    name: name.to_string(),
                    reason: HeaderFault::Uncommitted,
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let opened = Segment::open(name, &path);
        drop(table);
        match opened {
            Ok(segment) => Ok(Some(segment)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `name` and reclaim its storage
    #[instrument(skip(self), level = "debug")]
    pub fn erase(&self, name: &str) -> Result<()> {
        let mut table = self.table();
        let size = table
            .sizes
            .remove(name)
            .ok_or_else(|| StoreError::not_found(name))?;
        table.used -= size;

        match fs::remove_file(self.segment_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(segment = name, "segment file already gone");
            }
            Err(e) => {
                table.sizes.insert(name.to_string(), size);
                table.used += size;
                return Err(e.into());
            }
        }
        swap::sync_dir(&self.segments_dir)?;
        Ok(())
    }

    /// Exchange the segments bound to `a` and `b` in one durable step
    #[instrument(skip(self), level = "debug")]
    pub fn atomic_swap(&self, a: &str, b: &str) -> Result<()> {
        let mut table = self.table();
        let size_a = *table.sizes.get(a).ok_or_else(|| StoreError::not_found(a))?;
        let size_b = *table.sizes.get(b).ok_or_else(|| StoreError::not_found(b))?;

        self.swap
            .exchange(&self.segment_path(a), &self.segment_path(b))?;

        table.sizes.insert(a.to_string(), size_b);
        table.sizes.insert(b.to_string(), size_a);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table().sizes.contains_key(name)
    }

    /// All bound names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table().sizes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> StoreStats {
        let table = self.table();
        StoreStats {
            segment_count: table.sizes.len() as u64,
            used_bytes: table.used,
            capacity_bytes: self.capacity,
        }
    }

    /// Reclaim leftovers from interrupted creates and updates
    pub fn sweep(&self) -> Result<SweepReport> {
        recovery::sweep(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn swap_strategy(&self) -> &'static str {
        self.swap.name()
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("root", &self.root)
            .field("capacity", &self.capacity)
            .field("swap", &self.swap.name())
            .finish()
    }
}

fn map_create_error(name: &str, requested: u64, available: u64, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::AlreadyExists {
        StoreError::NameExists {
            name: name.to_string(),
        }
    } else if e.raw_os_error() == Some(libc::ENOSPC) {
        StoreError::OutOfSpace {
            requested,
            available,
        }
    } else {
        StoreError::Io(e)
    }
}

/// Remove the file of a failed create. Returns whether nothing is left behind.
fn discard_partial(name: &str, path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(
                segment = name,
                path = ?path,
                error = %e,
                "failed to remove partially created segment"
            );
            false
        }
    }
}

fn decode_segment_file(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

fn scan_segments(segments_dir: &Path) -> Result<SegmentTable> {
    let mut table = SegmentTable::default();
    for entry in fs::read_dir(segments_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match decode_segment_file(&path) {
            Some(name) => {
                let size = entry.metadata()?.len();
                table.used += size;
                table.sizes.insert(name, size);
            }
            None => warn!(path = ?path, "ignoring unrecognized file in segments directory"),
        }
    }
    Ok(table)
}

fn wipe_segments(segments_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(segments_dir)? {
        let path = entry?.path();
        if decode_segment_file(&path).is_some() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    swap::sync_dir(segments_dir)?;
    Ok(removed)
}
