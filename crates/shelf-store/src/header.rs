//! Segment header and type tags.
//!
//! Every segment starts with a fixed 32-byte header (little-endian):
//!
//! ```text
//! 0      4        6        8               16                      32
//! +------+--------+--------+---------------+-----------------------+
//! | SHLV | version|   tag  |  payload_len  |  blake3(payload)[..16]|
//! +------+--------+--------+---------------+-----------------------+
//! ```
//!
//! A zero magic means the segment was created but its header never landed.
//! Writers flush the payload before the header, so a readable magic implies
//! a complete payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::segment::Segment;
use crate::{HeaderFault, Result, StoreError};

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Header magic
pub const MAGIC: [u8; 4] = *b"SHLV";

/// Current header format version
pub const FORMAT_VERSION: u16 = 1;

const CHECKSUM_LEN: usize = 16;

/// Logical kind of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum TypeTag {
    Integer = 1,
    Float = 2,
    String = 3,
    Bytes = 4,
    Array = 5,
}

impl TypeTag {
    /// Every known tag, in wire order
    pub const ALL: [TypeTag; 5] = [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::String,
        TypeTag::Bytes,
        TypeTag::Array,
    ];

    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(TypeTag::Integer),
            2 => Some(TypeTag::Float),
            3 => Some(TypeTag::String),
            4 => Some(TypeTag::Bytes),
            5 => Some(TypeTag::Array),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Bytes => "bytes",
            TypeTag::Array => "array",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded segment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: TypeTag,
    pub payload_len: u64,
    pub checksum: [u8; CHECKSUM_LEN],
}

impl Header {
    /// Build the header describing `payload`
    pub fn for_payload(tag: TypeTag, payload: &[u8]) -> Self {
        Self {
            tag,
            payload_len: payload.len() as u64,
            checksum: payload_checksum(payload),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.tag.as_raw().to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[16..32].copy_from_slice(&self.checksum);
        buf
    }

    /// Parse a header from the first bytes of a segment.
    ///
    /// `segment_len` is the full segment length; the declared payload must fit.
    pub fn parse(bytes: &[u8], segment_len: usize) -> std::result::Result<Self, HeaderFault> {
        if bytes.len() < HEADER_SIZE || segment_len < HEADER_SIZE {
            return Err(HeaderFault::Truncated);
        }
        let magic = &bytes[0..4];
        if magic == [0u8; 4] {
            return Err(HeaderFault::Uncommitted);
        }
        if magic != MAGIC {
            return Err(HeaderFault::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(HeaderFault::UnsupportedVersion(version));
        }
        let raw_tag = u16::from_le_bytes([bytes[6], bytes[7]]);
        let tag = TypeTag::from_raw(raw_tag).ok_or(HeaderFault::UnknownTag(raw_tag))?;

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..16]);
        let payload_len = u64::from_le_bytes(len);
        if payload_len > (segment_len - HEADER_SIZE) as u64 {
            return Err(HeaderFault::Truncated);
        }

        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[16..32]);
        Ok(Self {
            tag,
            payload_len,
            checksum,
        })
    }

    /// Check `payload` against the stored checksum
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() as u64 == self.payload_len && payload_checksum(payload) == self.checksum
    }
}

/// Truncated BLAKE3 digest of a payload
pub fn payload_checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = blake3::hash(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Write the header for `payload` at offset 0 of `segment`.
///
/// Does not flush; callers commit through [`crate::PendingSegment`].
pub fn write_header(segment: &mut Segment, tag: TypeTag, payload: &[u8]) -> Result<()> {
    let header = Header::for_payload(tag, payload);
    segment.write_at(0, &header.to_bytes())
}

/// Read and validate the header of `segment`
pub fn read_header(segment: &Segment) -> Result<Header> {
    Header::parse(segment.as_bytes(), segment.len()).map_err(|reason| StoreError::CorruptHeader {
        name: segment.name().to_string(),
        reason,
    })
}

/// Read the header and return the checksum-verified payload slice
pub fn read_payload(segment: &Segment) -> Result<(Header, &[u8])> {
    let header = read_header(segment)?;
    let end = HEADER_SIZE + header.payload_len as usize;
    let payload = &segment.as_bytes()[HEADER_SIZE..end];
    if !header.verify(payload) {
        return Err(StoreError::CorruptPayload {
            name: segment.name().to_string(),
            reason: "checksum mismatch".to_string(),
        });
    }
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header::for_payload(TypeTag::String, b"hello");
        let bytes = header.to_bytes();
        let parsed = Header::parse(&bytes, HEADER_SIZE + 5).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.verify(b"hello"));
        assert!(!parsed.verify(b"hellO"));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut bytes = Header::for_payload(TypeTag::Integer, &[0; 8]).to_bytes();
        bytes[6..8].copy_from_slice(&99u16.to_le_bytes());
        assert_eq!(
            Header::parse(&bytes, HEADER_SIZE + 8),
            Err(HeaderFault::UnknownTag(99))
        );
    }

    #[test]
    fn test_zero_magic_is_uncommitted() {
        let bytes = [0u8; HEADER_SIZE];
        assert_eq!(
            Header::parse(&bytes, HEADER_SIZE),
            Err(HeaderFault::Uncommitted)
        );
    }

    #[test]
    fn test_short_segment_is_truncated() {
        let bytes = Header::for_payload(TypeTag::Integer, &[0; 8]).to_bytes();
        assert_eq!(Header::parse(&bytes[..16], 16), Err(HeaderFault::Truncated));
        // Declared payload longer than the segment
        assert_eq!(
            Header::parse(&bytes, HEADER_SIZE + 4),
            Err(HeaderFault::Truncated)
        );
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = Header::for_payload(TypeTag::Float, &[0; 8]).to_bytes();
        bytes[0] = b'X';
        assert_eq!(
            Header::parse(&bytes, HEADER_SIZE + 8),
            Err(HeaderFault::BadMagic)
        );

        let mut bytes = Header::for_payload(TypeTag::Float, &[0; 8]).to_bytes();
        bytes[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert_eq!(
            Header::parse(&bytes, HEADER_SIZE + 8),
            Err(HeaderFault::UnsupportedVersion(7))
        );
    }

    #[test]
    fn test_tag_raw_values() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::from_raw(tag.as_raw()), Some(tag));
        }
        assert_eq!(TypeTag::from_raw(0), None);
    }
}
