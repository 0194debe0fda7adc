//! Memory-mapped segments.
//!
//! A [`Segment`] is a non-owning binding to one segment file: it can read and
//! write through the shared mapping, but only the [`Directory`] decides when
//! the file is created, renamed or erased.
//!
//! Freshly created segments are wrapped in a [`PendingSegment`]. The guard
//! writes payload then header, flushing each, and erases the segment if it
//! is dropped before commit.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::header::{self, TypeTag, HEADER_SIZE};
use crate::{Result, StoreError};

/// Binding to a mapped segment file
#[derive(Debug)]
pub struct Segment {
    name: String,
    path: PathBuf,
    file: File,
    map: MmapMut,
}

impl Segment {
    /// Create a new segment file of exactly `size` bytes. Fails if it exists.
    pub(crate) fn create(name: &str, path: &Path, size: usize, zero_init: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(size as u64)?;

        // Safety: the file was just created by us and is only resized by the
        // directory, which never resizes a mapped segment.
        let mut map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        if zero_init {
            map.fill(0);
        }

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            file,
            map,
        })
    }

    /// Map an existing, non-empty segment file
    pub(crate) fn open(name: &str, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        // Safety: see `create`.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            file,
            map,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total length (header + payload capacity)
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw segment bytes, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// Payload capacity: `len - HEADER_SIZE`
    pub fn payload_capacity(&self) -> usize {
        self.len().saturating_sub(HEADER_SIZE)
    }

    /// Bounds-checked raw write
    pub(crate) fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.map.len())
            .ok_or_else(|| {
                StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "write of {} bytes at offset {} exceeds segment {} ({} bytes)",
                        data.len(),
                        offset,
                        self.name,
                        self.map.len()
                    ),
                ))
            })?;
        self.map[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Write `payload` right after the header, checked against the payload capacity
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.payload_capacity() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "payload of {} bytes exceeds capacity {} of {}",
                    payload.len(),
                    self.payload_capacity(),
                    self.name
                ),
            )));
        }
        self.write_at(HEADER_SIZE, payload)
    }

    /// msync the mapping and fsync the file
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()?;
        self.file.sync_all()
    }
}

/// Scoped write transaction over a freshly created segment.
///
/// Dropping it uncommitted flushes what was written and erases the segment.
pub struct PendingSegment<'d> {
    dir: &'d Directory,
    segment: Option<Segment>,
}

impl<'d> PendingSegment<'d> {
    pub(crate) fn new(dir: &'d Directory, segment: Segment) -> Self {
        Self {
            dir,
            segment: Some(segment),
        }
    }

    pub fn name(&self) -> &str {
        self.segment.as_ref().map(Segment::name).unwrap_or_default()
    }

    /// Let go of the segment without committing or erasing it, as a crash
    /// would. The sweep reclaims what is left.
    pub(crate) fn abandon(mut self) {
        if let Some(segment) = self.segment.take() {
            debug!(segment = segment.name(), "abandoning uncommitted segment");
        }
    }

    /// Write `payload` then the header describing it, flushing each.
    ///
    /// The header lands strictly after the payload is durable, so a crash in
    /// between leaves a zero magic rather than a valid header over a partial
    /// payload.
    pub fn commit(mut self, tag: TypeTag, payload: &[u8]) -> Result<Segment> {
        let segment = self
            .segment
            .as_mut()
            .ok_or_else(|| StoreError::not_found("<released pending segment>"))?;

        segment.write_payload(payload)?;
        segment.flush()?;
        header::write_header(segment, tag, payload)?;
        segment.flush()?;

        self.segment
            .take()
            .ok_or_else(|| StoreError::not_found("<released pending segment>"))
    }
}

impl Drop for PendingSegment<'_> {
    fn drop(&mut self) {
        let Some(segment) = self.segment.take() else {
            return;
        };
        let name = segment.name().to_string();
        if let Err(e) = segment.flush() {
            warn!(segment = %name, error = %e, "flush of abandoned segment failed");
        }
        drop(segment);
        if let Err(e) = self.dir.erase(&name) {
            warn!(segment = %name, error = %e, "failed to erase abandoned segment");
        }
    }
}
