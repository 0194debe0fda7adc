//! Atomic name swap strategies.
//!
//! # Design
//!
//! - **Linux (glibc)**: `renameat2(RENAME_EXCHANGE)`, one kernel-atomic step
//! - **Fallback**: journaled three-rename, rolled forward on next open
//!
//! The journaled swap writes its intent to `swap.journal` before touching
//! either name. Until the journal is removed, the store must be opened
//! through [`replay_journal`], which finishes an interrupted swap.
//!
//! Between the renames one of the two paths does not exist. The directory
//! runs `exchange` under its table lock and resolves names under the same
//! lock, so lookups through it never see that window.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

pub const JOURNAL_FILE: &str = "swap.journal";
pub const ASIDE_FILE: &str = "swap.aside";

/// Which swap implementation a store uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapMode {
    /// Platform-native exchange when available, journaled otherwise
    #[default]
    Auto,
    /// Always use the journaled swap
    Journaled,
}

// ============================================================================
// SwapStrategy Trait
// ============================================================================

/// Exchanges the files behind two segment paths
pub trait SwapStrategy: Send + Sync {
    /// After return, the file previously at `a` is at `b` and vice versa,
    /// and the change is durable.
    fn exchange(&self, a: &Path, b: &Path) -> Result<()>;

    /// Name of this strategy (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// fsync a directory so renames inside it are durable
pub(crate) fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

// ============================================================================
// Journaled Implementation
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SwapJournal {
    a: PathBuf,
    b: PathBuf,
}

/// Portable swap: journal, `a → aside`, `b → a`, `aside → b`
#[derive(Debug, Clone)]
pub struct JournaledSwap {
    root: PathBuf,
}

impl JournaledSwap {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    fn aside_path(&self) -> PathBuf {
        self.root.join(ASIDE_FILE)
    }

    fn write_journal(&self, journal: &SwapJournal) -> Result<()> {
        let path = self.journal_path();
        let tmp_path = path.with_extension("journal.tmp");

        let file = File::create(&tmp_path)?;
        serde_json::to_writer(BufWriter::new(&file), journal)?;
        file.sync_all()?;

        fs::rename(&tmp_path, &path)?;
        sync_dir(&self.root)?;
        Ok(())
    }

    fn clear_journal(&self) -> Result<()> {
        fs::remove_file(self.journal_path())?;
        sync_dir(&self.root)?;
        Ok(())
    }
}

impl SwapStrategy for JournaledSwap {
    fn exchange(&self, a: &Path, b: &Path) -> Result<()> {
        self.write_journal(&SwapJournal {
            a: a.to_path_buf(),
            b: b.to_path_buf(),
        })?;

        let aside = self.aside_path();
        fs::rename(a, &aside)?;
        fs::rename(b, a)?;
        fs::rename(&aside, b)?;
        sync_dir(parent_of(a))?;
        sync_dir(&self.root)?;

        self.clear_journal()
    }

    fn name(&self) -> &'static str {
        "journaled"
    }
}

/// Finish a journaled swap interrupted by a crash.
///
/// Returns `true` if a journal was found. Always rolls forward: once the
/// journal is durable the swap is treated as decided.
pub fn replay_journal(root: &Path) -> Result<bool> {
    let swap = JournaledSwap::new(root);
    let journal_path = swap.journal_path();

    // A journal that never got renamed into place means no name was touched
    let tmp_path = journal_path.with_extension("journal.tmp");
    if tmp_path.exists() {
        fs::remove_file(&tmp_path)?;
    }

    if !journal_path.exists() {
        return Ok(false);
    }

    let journal: SwapJournal = serde_json::from_reader(BufReader::new(File::open(&journal_path)?))?;
    let aside = swap.aside_path();

    if aside.exists() {
        if !journal.a.exists() {
            fs::rename(&journal.b, &journal.a)?;
        }
        fs::rename(&aside, &journal.b)?;
        sync_dir(parent_of(&journal.a))?;
        sync_dir(root)?;
        info!(a = ?journal.a, b = ?journal.b, "rolled interrupted swap forward");
    } else {
        // Either nothing was renamed yet or everything was; both are whole
        debug!(a = ?journal.a, b = ?journal.b, "swap journal without aside file, discarding");
    }

    swap.clear_journal()?;
    Ok(true)
}

// ============================================================================
// Linux Implementation
// ============================================================================

/// Linux swap: `renameat2(RENAME_EXCHANGE)`, journaled fallback when the
/// filesystem rejects the flag
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub struct ExchangeSwap {
    fallback: JournaledSwap,
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl ExchangeSwap {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            fallback: JournaledSwap::new(root),
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl SwapStrategy for ExchangeSwap {
    fn exchange(&self, a: &Path, b: &Path) -> Result<()> {
        use nix::fcntl::{renameat2, RenameFlags};

        match renameat2(None, a, None, b, RenameFlags::RENAME_EXCHANGE) {
            Ok(()) => {
                sync_dir(parent_of(a))?;
                Ok(())
            }
            Err(errno) => {
                let err = io::Error::from(errno);
                match err.raw_os_error() {
                    Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP) => {
                        debug!(error = %err, "RENAME_EXCHANGE unsupported, using journaled swap");
                        self.fallback.exchange(a, b)
                    }
                    _ => Err(err.into()),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "linux-exchange"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Select the swap strategy for a store rooted at `root`
pub fn select_strategy(mode: SwapMode, root: &Path) -> Box<dyn SwapStrategy> {
    match mode {
        SwapMode::Journaled => Box::new(JournaledSwap::new(root)),
        SwapMode::Auto => native_strategy(root),
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn native_strategy(root: &Path) -> Box<dyn SwapStrategy> {
    Box::new(ExchangeSwap::new(root))
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn native_strategy(root: &Path) -> Box<dyn SwapStrategy> {
    Box::new(JournaledSwap::new(root))
}

// ============================================================================
// Tests
// ============================================================================
