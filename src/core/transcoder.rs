// Copyright (c) 2026 Cachering
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Envelope codec: encodes a [`CacheValue`] into a type-tagged `(flags, bytes)`
//! [`CacheItem`] and decodes the inverse.
//!
//! Class hierarchies in the source (a transcoder base class with virtual
//! per-type hooks) collapse here to a single [`DefaultTranscoder`] with a
//! dispatch table keyed by type code; per-type encoders are free functions.
//! Subtype customization is offered through the [`Transcoder`] trait rather
//! than inheritance.

use bson::Bson;
use thiserror::Error;

/// Envelope codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscoderError {
    /// The low byte of `flags` is outside the closed type-code enumeration.
    #[error("unknown type code {0}")]
    UnknownTypeCode(u8),
    /// The payload length did not match what the type code requires.
    #[error("malformed payload for type code {0}: {1}")]
    MalformedPayload(u8, &'static str),
    /// The payload claimed to be UTF-8 text but was not valid UTF-8.
    #[error("invalid utf-8 payload")]
    InvalidUtf8,
    /// BSON encoding/decoding of a structured object failed.
    #[error("bson codec error: {0}")]
    Bson(String),
}

/// Marks an envelope produced by this codec (as opposed to an opaque/raw or
/// foreign value). `flags = 0x0100 | typeCode`.
const HANDLED_BIT: u32 = 0x0100;

/// Sentinel flags value for opaque byte payloads with no further interpretation.
pub const RAW_FLAGS: u32 = 0xFA52;

/// Closed set of logical type codes, mirroring the historical `TypeCode`
/// enumeration this wire format was built against. Values are load-bearing:
/// they appear on the wire and must not be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeCode {
    /// Untyped legacy slot: empty payload is null, non-empty is UTF-8 text.
    Empty = 0,
    /// Structured object (BSON-encoded).
    Object = 1,
    /// Explicit null.
    DBNull = 2,
    /// Boolean.
    Boolean = 3,
    /// UTF-16 code unit.
    Char = 4,
    /// Signed 8-bit integer.
    SByte = 5,
    /// Unsigned 8-bit integer.
    Byte = 6,
    /// Signed 16-bit integer.
    Int16 = 7,
    /// Unsigned 16-bit integer.
    UInt16 = 8,
    /// Signed 32-bit integer.
    Int32 = 9,
    /// Unsigned 32-bit integer.
    UInt32 = 10,
    /// Signed 64-bit integer.
    Int64 = 11,
    /// Unsigned 64-bit integer.
    UInt64 = 12,
    /// IEEE-754 32-bit float.
    Single = 13,
    /// IEEE-754 64-bit float.
    Double = 14,
    /// Legacy structured object (BSON-encoded), its own closed-set code
    /// distinct from `Object` even though it shares the same wire payload.
    Decimal = 15,
    /// UTF-8 text.
    String = 18,
    /// 64-bit binary-form timestamp (see [`DateTimeValue`]).
    DateTime = 16,
}

impl TypeCode {
    fn from_u8(code: u8) -> Option<Self> {
        use TypeCode::*;
        Some(match code {
            0 => Empty,
            1 => Object,
            2 => DBNull,
            3 => Boolean,
            4 => Char,
            5 => SByte,
            6 => Byte,
            7 => Int16,
            8 => UInt16,
            9 => Int32,
            10 => UInt32,
            11 => Int64,
            12 => UInt64,
            13 => Single,
            14 => Double,
            15 => Decimal,
            18 => String,
            16 => DateTime,
            _ => return None,
        })
    }
}

/// Time-zone kind carried in the top 2 bits of a [`DateTimeValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DateTimeKind {
    /// No time zone information.
    Unspecified = 0,
    /// Coordinated Universal Time.
    Utc = 1,
    /// Local time of the encoding host.
    Local = 2,
}

impl DateTimeKind {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => DateTimeKind::Utc,
            2 => DateTimeKind::Local,
            _ => DateTimeKind::Unspecified,
        }
    }
}

/// A 64-bit binary-form timestamp: 62-bit tick count (100ns units since
/// `0001-01-01T00:00:00`) plus a 2-bit time-zone kind, packed into the top bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTimeValue {
    /// Number of 100-ns ticks since the epoch. Only the low 62 bits are significant.
    pub ticks: u64,
    /// Time-zone kind.
    pub kind: DateTimeKind,
}

impl DateTimeValue {
    const TICKS_MASK: u64 = (1u64 << 62) - 1;

    fn to_bits(self) -> u64 {
        let kind_bits = (self.kind as u64) << 62;
        kind_bits | (self.ticks & Self::TICKS_MASK)
    }

    fn from_bits(bits: u64) -> Self {
        let kind = DateTimeKind::from_bits((bits >> 62) as u8 & 0b11);
        let ticks = bits & Self::TICKS_MASK;
        DateTimeValue { ticks, kind }
    }
}

/// A decoded (or to-be-encoded) cached value.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    /// Null / `DBNull`.
    Null,
    /// UTF-8 text, or the legacy empty-code compatibility path.
    String(String),
    /// Boolean.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// UTF-16 code unit.
    Char(u16),
    /// IEEE-754 32-bit float.
    Single(f32),
    /// IEEE-754 64-bit float.
    Double(f64),
    /// 64-bit binary-form timestamp.
    DateTime(DateTimeValue),
    /// Structured object, BSON-encoded on the wire.
    Object(Bson),
    /// Opaque byte blob. Bypasses the type-code switch entirely; always
    /// round-trips through the raw fast path (`flags == RAW_FLAGS`).
    Raw(Vec<u8>),
}

/// The `(flags, bytes)` pair written to and read from a cache slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheItem {
    /// Type metadata. `flags & 0xFF` is the type code; `HANDLED_BIT` marks
    /// envelopes produced by this codec; `RAW_FLAGS` marks opaque payloads.
    pub flags: u32,
    /// Encoded payload.
    pub data: Vec<u8>,
}

impl CacheItem {
    /// `isHandled(flags)`: whether this envelope was produced by this codec's
    /// type-code dispatch (as opposed to a raw/opaque or foreign value).
    pub fn is_handled(&self) -> bool {
        self.flags & HANDLED_BIT != 0
    }

    /// Whether this is the raw/opaque sentinel.
    pub fn is_raw(&self) -> bool {
        self.flags == RAW_FLAGS
    }
}

/// Converts a decoded [`CacheValue`] into a caller's expected Rust type.
///
/// Implemented for every scalar the codec supports, so `deserialize_as::<T>`
/// can be used when the consumer already knows the expected logical type.
pub trait FromCacheValue: Sized {
    /// Convert, failing if `value` is not of the expected shape.
    fn from_cache_value(value: CacheValue) -> Result<Self, TranscoderError>;
}

macro_rules! from_cache_value_scalar {
    ($ty:ty, $variant:ident) => {
        impl FromCacheValue for $ty {
            fn from_cache_value(value: CacheValue) -> Result<Self, TranscoderError> {
                match value {
                    CacheValue::$variant(v) => Ok(v),
                    _ => Err(TranscoderError::MalformedPayload(0, stringify!($variant))),
                }
            }
        }
    };
}

from_cache_value_scalar!(bool, Boolean);
from_cache_value_scalar!(i8, SByte);
from_cache_value_scalar!(u8, Byte);
from_cache_value_scalar!(i16, Int16);
from_cache_value_scalar!(u16, UInt16);
from_cache_value_scalar!(i32, Int32);
from_cache_value_scalar!(u32, UInt32);
from_cache_value_scalar!(i64, Int64);
from_cache_value_scalar!(u64, UInt64);
from_cache_value_scalar!(f32, Single);
from_cache_value_scalar!(f64, Double);
from_cache_value_scalar!(String, String);

impl FromCacheValue for Vec<u8> {
    fn from_cache_value(value: CacheValue) -> Result<Self, TranscoderError> {
        match value {
            CacheValue::Raw(bytes) => Ok(bytes),
            _ => Err(TranscoderError::MalformedPayload(0, "Raw")),
        }
    }
}

/// Encodes a Rust value into a [`CacheValue`] for [`Transcoder::serialize`].
pub trait IntoCacheValue {
    /// Convert into the codec's value representation.
    fn into_cache_value(self) -> CacheValue;
}

macro_rules! into_cache_value_scalar {
    ($ty:ty, $variant:ident) => {
        impl IntoCacheValue for $ty {
            fn into_cache_value(self) -> CacheValue {
                CacheValue::$variant(self)
            }
        }
    };
}

into_cache_value_scalar!(bool, Boolean);
into_cache_value_scalar!(i8, SByte);
into_cache_value_scalar!(u8, Byte);
into_cache_value_scalar!(i16, Int16);
into_cache_value_scalar!(u16, UInt16);
into_cache_value_scalar!(i32, Int32);
into_cache_value_scalar!(u32, UInt32);
into_cache_value_scalar!(i64, Int64);
into_cache_value_scalar!(u64, UInt64);
into_cache_value_scalar!(f32, Single);
into_cache_value_scalar!(f64, Double);
into_cache_value_scalar!(String, String);

impl IntoCacheValue for &str {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::String(self.to_owned())
    }
}

impl IntoCacheValue for Vec<u8> {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::Raw(self)
    }
}

impl IntoCacheValue for &[u8] {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::Raw(self.to_vec())
    }
}

/// The envelope codec contract: encode a value, decode the inverse.
pub trait Transcoder: Send + Sync {
    /// Encode a value into a type-tagged envelope.
    fn serialize(&self, value: CacheValue) -> CacheItem;

    /// Decode an envelope back into its logical value.
    fn deserialize(&self, item: &CacheItem) -> Result<CacheValue, TranscoderError>;

    /// Encode any value convertible via [`IntoCacheValue`]. Raw byte slices
    /// and `Vec<u8>` take the fast path (`flags == RAW_FLAGS`, no further
    /// interpretation); everything else goes through the type-code switch.
    fn serialize_value<T: IntoCacheValue>(&self, value: T) -> CacheItem {
        self.serialize(value.into_cache_value())
    }

    /// Decode and convert to a caller-known type in one step.
    fn deserialize_as<T: FromCacheValue>(&self, item: &CacheItem) -> Result<T, TranscoderError> {
        T::from_cache_value(self.deserialize(item)?)
    }
}

/// The default envelope codec: raw fast paths for byte blobs, little-endian
/// scalar encodings, and a BSON fallback for structured objects.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTranscoder;

impl Transcoder for DefaultTranscoder {
    fn serialize(&self, value: CacheValue) -> CacheItem {
        match value {
            // Raw fast path: bypasses the type-code switch entirely.
            CacheValue::Raw(bytes) => CacheItem {
                flags: RAW_FLAGS,
                data: bytes,
            },
            CacheValue::Null => envelope(TypeCode::DBNull, Vec::new()),
            CacheValue::String(s) => envelope(TypeCode::String, s.into_bytes()),
            CacheValue::Boolean(b) => envelope(TypeCode::Boolean, vec![b as u8]),
            CacheValue::SByte(v) => envelope(TypeCode::SByte, vec![v as u8]),
            CacheValue::Byte(v) => envelope(TypeCode::Byte, vec![v]),
            CacheValue::Int16(v) => envelope(TypeCode::Int16, v.to_le_bytes().to_vec()),
            CacheValue::UInt16(v) => envelope(TypeCode::UInt16, v.to_le_bytes().to_vec()),
            CacheValue::Int32(v) => envelope(TypeCode::Int32, v.to_le_bytes().to_vec()),
            CacheValue::UInt32(v) => envelope(TypeCode::UInt32, v.to_le_bytes().to_vec()),
            CacheValue::Int64(v) => envelope(TypeCode::Int64, v.to_le_bytes().to_vec()),
            CacheValue::UInt64(v) => envelope(TypeCode::UInt64, v.to_le_bytes().to_vec()),
            CacheValue::Char(v) => envelope(TypeCode::Char, v.to_le_bytes().to_vec()),
            CacheValue::Single(v) => envelope(TypeCode::Single, v.to_le_bytes().to_vec()),
            CacheValue::Double(v) => envelope(TypeCode::Double, v.to_le_bytes().to_vec()),
            CacheValue::DateTime(dt) => {
                envelope(TypeCode::DateTime, dt.to_bits().to_le_bytes().to_vec())
            }
            CacheValue::Object(doc) => {
                // A bare BSON value (not necessarily a document) is wrapped so
                // a top-level document is always what hits the wire, letting
                // scalars and arrays round-trip through the same path as
                // structured objects.
                let wrapped = bson::doc! { "v": doc };
                let mut data = Vec::new();
                wrapped
                    .to_writer(&mut data)
                    .expect("bson encoding of a well-formed document cannot fail");
                envelope(TypeCode::Object, data)
            }
        }
    }

    fn deserialize(&self, item: &CacheItem) -> Result<CacheValue, TranscoderError> {
        // Raw flag is handled before the switch.
        if item.flags == RAW_FLAGS {
            return Ok(CacheValue::Raw(item.data.clone()));
        }

        let code = (item.flags & 0xFF) as u8;

        // Legacy read rule: flags & 0xFF == 0 is the Empty code. A non-empty
        // payload under that code is compatibility text (e.g. ASCII counter
        // values returned after an increment), not a typed envelope.
        if code == TypeCode::Empty as u8 {
            if item.data.is_empty() {
                return Ok(CacheValue::Null);
            }
            return std::str::from_utf8(&item.data)
                .map(|s| CacheValue::String(s.to_owned()))
                .map_err(|_| TranscoderError::InvalidUtf8);
        }

        let type_code = TypeCode::from_u8(code).ok_or(TranscoderError::UnknownTypeCode(code))?;

        Ok(match type_code {
            TypeCode::Empty => unreachable!("handled above"),
            TypeCode::DBNull => CacheValue::Null,
            TypeCode::String => std::str::from_utf8(&item.data)
                .map(|s| CacheValue::String(s.to_owned()))
                .map_err(|_| TranscoderError::InvalidUtf8)?,
            TypeCode::Boolean => CacheValue::Boolean(read_u8(item, code)? != 0),
            TypeCode::SByte => CacheValue::SByte(read_u8(item, code)? as i8),
            TypeCode::Byte => CacheValue::Byte(read_u8(item, code)?),
            TypeCode::Int16 => CacheValue::Int16(i16::from_le_bytes(read_n(item, code)?)),
            TypeCode::UInt16 => CacheValue::UInt16(u16::from_le_bytes(read_n(item, code)?)),
            TypeCode::Int32 => CacheValue::Int32(i32::from_le_bytes(read_n(item, code)?)),
            TypeCode::UInt32 => CacheValue::UInt32(u32::from_le_bytes(read_n(item, code)?)),
            TypeCode::Int64 => CacheValue::Int64(i64::from_le_bytes(read_n(item, code)?)),
            TypeCode::UInt64 => CacheValue::UInt64(u64::from_le_bytes(read_n(item, code)?)),
            TypeCode::Char => CacheValue::Char(u16::from_le_bytes(read_n(item, code)?)),
            TypeCode::Single => CacheValue::Single(f32::from_le_bytes(read_n(item, code)?)),
            TypeCode::Double => CacheValue::Double(f64::from_le_bytes(read_n(item, code)?)),
            TypeCode::DateTime => {
                CacheValue::DateTime(DateTimeValue::from_bits(u64::from_le_bytes(read_n(item, code)?)))
            }
            // `Decimal` is its own closed-set code but shares `Object`'s
            // BSON-wrapped payload encoding on the wire.
            TypeCode::Object | TypeCode::Decimal => decode_bson_object(item)?,
        })
    }
}

fn decode_bson_object(item: &CacheItem) -> Result<CacheValue, TranscoderError> {
    let doc = bson::Document::from_reader(&mut &item.data[..])
        .map_err(|e| TranscoderError::Bson(e.to_string()))?;
    let inner = doc
        .get("v")
        .cloned()
        .ok_or_else(|| TranscoderError::Bson("missing wrapped value".into()))?;
    Ok(CacheValue::Object(inner))
}

fn envelope(code: TypeCode, data: Vec<u8>) -> CacheItem {
    CacheItem {
        flags: HANDLED_BIT | code as u32,
        data,
    }
}

fn read_u8(item: &CacheItem, code: u8) -> Result<u8, TranscoderError> {
    item.data
        .first()
        .copied()
        .ok_or(TranscoderError::MalformedPayload(code, "expected 1 byte"))
}

fn read_n<const N: usize>(item: &CacheItem, code: u8) -> Result<[u8; N], TranscoderError> {
    item.data
        .as_slice()
        .try_into()
        .map_err(|_| TranscoderError::MalformedPayload(code, "unexpected payload length"))
}
