//! Value kinds and their payload encodings.
//!
//! | tag     | payload                                          |
//! |---------|--------------------------------------------------|
//! | Integer | `i64` LE                                         |
//! | Float   | `f64` LE                                         |
//! | String  | UTF-8 bytes                                      |
//! | Bytes   | raw bytes                                        |
//! | Array   | `u32` rank, `rank × u64` dims, `f64` LE elements |
//!
//! Decoding dispatches on the header tag with a closed match; payloads are
//! never sniffed to guess their kind.

use std::fmt;

use thiserror::Error;

use crate::header::TypeTag;

/// Why a payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("tag {0} not accepted by this value type")]
    WrongTag(TypeTag),

    #[error("expected {expected} payload bytes, found {found}")]
    Length { expected: usize, found: usize },

    #[error("payload is not valid UTF-8")]
    Utf8,

    #[error("array shape {shape:?} does not describe {elements} elements")]
    Shape { shape: Vec<usize>, elements: usize },
}

/// A type that can live in a segment
pub trait Shelvable: Sized + Clone {
    /// Tag shared by every value of this type, `None` if it varies per value
    const TAG: Option<TypeTag>;

    /// Tag written to the header for this value
    fn type_tag(&self) -> TypeTag;

    /// Whether a segment tagged `tag` can be decoded as `Self`
    fn accepts(tag: TypeTag) -> bool {
        Self::TAG.map_or(true, |t| t == tag)
    }

    fn encode(&self) -> Vec<u8>;

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError>;
}

fn fixed8(payload: &[u8]) -> Result<[u8; 8], DecodeError> {
    payload.try_into().map_err(|_| DecodeError::Length {
        expected: 8,
        found: payload.len(),
    })
}

fn expect_tag(tag: TypeTag, wanted: TypeTag) -> Result<(), DecodeError> {
    if tag == wanted {
        Ok(())
    } else {
        Err(DecodeError::WrongTag(tag))
    }
}

impl Shelvable for i64 {
    const TAG: Option<TypeTag> = Some(TypeTag::Integer);

    fn type_tag(&self) -> TypeTag {
        TypeTag::Integer
    }

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        expect_tag(tag, TypeTag::Integer)?;
        Ok(i64::from_le_bytes(fixed8(payload)?))
    }
}

impl Shelvable for f64 {
    const TAG: Option<TypeTag> = Some(TypeTag::Float);

    fn type_tag(&self) -> TypeTag {
        TypeTag::Float
    }

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        expect_tag(tag, TypeTag::Float)?;
        Ok(f64::from_le_bytes(fixed8(payload)?))
    }
}

impl Shelvable for String {
    const TAG: Option<TypeTag> = Some(TypeTag::String);

    fn type_tag(&self) -> TypeTag {
        TypeTag::String
    }

    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        expect_tag(tag, TypeTag::String)?;
        String::from_utf8(payload.to_vec()).map_err(|_| DecodeError::Utf8)
    }
}

impl Shelvable for Vec<u8> {
    const TAG: Option<TypeTag> = Some(TypeTag::Bytes);

    fn type_tag(&self) -> TypeTag {
        TypeTag::Bytes
    }

    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        expect_tag(tag, TypeTag::Bytes)?;
        Ok(payload.to_vec())
    }
}

// ============================================================================
// NdArray
// ============================================================================

/// Elements in `shape`, `None` unless both the count and its byte size fit
fn element_count(shape: &[usize]) -> Option<usize> {
    let elements = shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))?;
    let bytes = elements.checked_mul(std::mem::size_of::<f64>())?;
    (bytes <= isize::MAX as usize).then_some(elements)
}

/// Dense row-major array of `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    /// Returns `None` if `shape` does not describe `data.len()` elements
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        let elements = element_count(&shape)?;
        if elements != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Returns `None` if the element count overflows
    pub fn filled(shape: Vec<usize>, value: f64) -> Option<Self> {
        let len = element_count(&shape)?;
        Some(Self {
            shape,
            data: vec![value; len],
        })
    }

    pub fn zeros(shape: Vec<usize>) -> Option<Self> {
        Self::filled(shape, 0.0)
    }

    pub fn ones(shape: Vec<usize>) -> Option<Self> {
        Self::filled(shape, 1.0)
    }

    /// `n × n` identity matrix, `None` if `n * n` elements overflow
    pub fn identity(n: usize) -> Option<Self> {
        let mut data = vec![0.0; element_count(&[n, n])?];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Some(Self {
            shape: vec![n, n],
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Element-wise product with `factor`
    pub fn scale(&self, factor: f64) -> NdArray {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|x| x * factor).collect(),
        }
    }
}

impl Shelvable for NdArray {
    const TAG: Option<TypeTag> = Some(TypeTag::Array);

    fn type_tag(&self) -> TypeTag {
        TypeTag::Array
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.shape.len() * 8 + self.data.len() * 8);
        out.extend_from_slice(&(self.shape.len() as u32).to_le_bytes());
        for dim in &self.shape {
            out.extend_from_slice(&(*dim as u64).to_le_bytes());
        }
        for x in &self.data {
            out.extend_from_slice(&x.to_le_bytes());
        }
        out
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        expect_tag(tag, TypeTag::Array)?;

        let short = |expected: usize| DecodeError::Length {
            expected,
            found: payload.len(),
        };
        let rank_bytes: [u8; 4] = payload
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| short(4))?;
        let rank = u32::from_le_bytes(rank_bytes) as usize;

        let dims_end = rank
            .checked_mul(8)
            .and_then(|n| n.checked_add(4))
            .ok_or_else(|| short(usize::MAX))?;
        let dims = payload.get(4..dims_end).ok_or_else(|| short(dims_end))?;
        let shape: Vec<usize> = dims
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap_or([0; 8])) as usize)
            .collect();

        let body = &payload[dims_end..];
        if body.len() % 8 != 0 {
            return Err(short(dims_end + (body.len() / 8 + 1) * 8));
        }
        let data: Vec<f64> = body
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
            .collect();

        let elements = data.len();
        NdArray::new(shape.clone(), data).ok_or(DecodeError::Shape { shape, elements })
    }
}

// ============================================================================
// Value
// ============================================================================

/// Any storable value; the kind is decided by the header tag
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(NdArray),
}

impl Shelvable for Value {
    const TAG: Option<TypeTag> = None;

    fn type_tag(&self) -> TypeTag {
        match self {
            Value::Integer(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Array(_) => TypeTag::Array,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Value::Integer(v) => v.encode(),
            Value::Float(v) => v.encode(),
            Value::String(v) => v.encode(),
            Value::Bytes(v) => v.encode(),
            Value::Array(v) => v.encode(),
        }
    }

    fn decode(tag: TypeTag, payload: &[u8]) -> Result<Self, DecodeError> {
        match tag {
            TypeTag::Integer => i64::decode(tag, payload).map(Value::Integer),
            TypeTag::Float => f64::decode(tag, payload).map(Value::Float),
            TypeTag::String => String::decode(tag, payload).map(Value::String),
            TypeTag::Bytes => Vec::<u8>::decode(tag, payload).map(Value::Bytes),
            TypeTag::Array => NdArray::decode(tag, payload).map(Value::Array),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::Array(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            Value::Array(v) => write!(f, "array{:?} {:?}", v.shape(), v.data()),
        }
    }
}
