//! Structured record codec.
//!
//! A ZIP structure is declared once as an ordered list of
//! [`FieldDescriptor`]s; decoding, encoding and size computation are driven
//! by that list. Each descriptor names its slot, its width, whether it is
//! present at all, and the validator that runs right after it is read.
//!
//! Decoding reads fields strictly in declaration order, so a validator or a
//! variable-width field may depend on any sibling declared before it (the
//! file name length sizing the file name, for example).
//!
//! Fields typed as `Option<_>` in a record and declared [`Presence::Always`]
//! are injected fields: they are computed by the writer and the encoder
//! refuses to serialize the record until they have been set.

use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::trace;

use crate::{Error, Result};

/// The value held by one field slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
}

impl Value {
    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Value::U16(_) => 2,
            Value::U32(_) => 4,
            Value::U64(_) => 8,
            Value::Bytes(bytes) => bytes.len(),
        }
    }

    /// Integer view of a fixed-width value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U16(v) => Some(*v as u64),
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            Value::Bytes(_) => None,
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Value::U16(v) => writer.write_u16::<LittleEndian>(*v),
            Value::U32(v) => writer.write_u32::<LittleEndian>(*v),
            Value::U64(v) => writer.write_u64::<LittleEndian>(*v),
            Value::Bytes(bytes) => writer.write_all(bytes),
        }
    }
}

/// Width of a field on the wire.
pub enum Width<R> {
    U16,
    U32,
    U64,
    /// Variable-length bytes; the length comes from already-decoded siblings.
    Bytes(fn(&R) -> usize),
}

/// Whether a field takes part in decoding.
pub enum Presence<R> {
    Always,
    /// Read only when the predicate holds for the record decoded so far.
    When(fn(&R) -> bool),
}

/// Post-read validation for a field.
pub enum Validator<R> {
    None,
    /// Record signature; a mismatch is reported as a wrong signature.
    Signature(u32),
    /// The field must hold exactly this value.
    Exact(u64),
    /// The field must hold one of two values.
    Either(u64, u64),
    /// The field must not hold this value.
    NotEqual(u64),
    /// Arbitrary check over the record decoded so far.
    Check(fn(&R) -> std::result::Result<(), String>),
}

/// One slot of a record schema.
pub struct FieldDescriptor<R> {
    pub name: &'static str,
    pub width: Width<R>,
    pub presence: Presence<R>,
    pub validator: Validator<R>,
    pub get: fn(&R) -> Option<Value>,
    pub set: fn(&mut R, Value),
}

/// A binary record with a declared field layout.
pub trait Record: Sized + 'static {
    /// Record name used in error messages.
    const NAME: &'static str;

    /// Ordered field schema.
    fn fields() -> &'static [FieldDescriptor<Self>];

    /// Decode into `self`, used as the template, and return it.
    ///
    /// The template decides which conditional fields are expected; all
    /// other slots are overwritten. Nothing is returned on failure.
    fn read_from<S: Read>(mut self, stream: &mut S) -> Result<Self> {
        decode_into(&mut self, stream)?;
        Ok(self)
    }

    /// Serialize the record.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Serialize the record into a writer, returning the bytes written.
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let bytes = encode(self)?;
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Exact encoded size of the record in its current state.
    fn encoded_len(&self) -> usize {
        size(self)
    }
}

/// Decode every field of `record` from `stream`, in declaration order.
pub fn decode_into<R: Record, S: Read>(record: &mut R, stream: &mut S) -> Result<()> {
    for field in R::fields() {
        if let Presence::When(present) = field.presence {
            if !present(record) {
                continue;
            }
        }

        let value = read_value(record, field, stream)?;
        (field.set)(record, value.clone());
        validate(record, field, &value)?;
    }

    trace!(record = R::NAME, "decoded record");
    Ok(())
}

/// Encode every present field of `record`.
pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(size(record));

    for field in R::fields() {
        let Some(value) = (field.get)(record) else {
            if let Presence::Always = field.presence {
                return Err(Error::field(
                    R::NAME,
                    field.name,
                    "value must be set before encoding",
                ));
            }
            continue;
        };

        if let Width::Bytes(len) = field.width {
            if len(record) != value.size() {
                return Err(Error::field(
                    R::NAME,
                    field.name,
                    format!("length field says {} but value has {} bytes", len(record), value.size()),
                ));
            }
        }

        value.write_to(&mut bytes)?;
    }

    Ok(bytes)
}

/// Encoded size of `record`, counting only fields that hold a value.
pub fn size<R: Record>(record: &R) -> usize {
    R::fields()
        .iter()
        .filter_map(|field| (field.get)(record))
        .map(|value| value.size())
        .sum()
}

fn read_value<R: Record, S: Read>(record: &R, field: &FieldDescriptor<R>, stream: &mut S) -> Result<Value> {
    let value = match field.width {
        Width::U16 => stream.read_u16::<LittleEndian>().map(Value::U16),
        Width::U32 => stream.read_u32::<LittleEndian>().map(Value::U32),
        Width::U64 => stream.read_u64::<LittleEndian>().map(Value::U64),
        Width::Bytes(len) => {
            let mut buf = vec![0u8; len(record)];
            stream.read_exact(&mut buf).map(|_| Value::Bytes(buf))
        }
    };

    value.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::field(R::NAME, field.name, "stream ended inside the record"),
        _ => Error::from(e),
    })
}

fn validate<R: Record>(record: &R, field: &FieldDescriptor<R>, value: &Value) -> Result<()> {
    let number = value.as_u64();

    let outcome = match (&field.validator, number) {
        (Validator::None, _) => Ok(()),
        (Validator::Signature(expected), Some(actual)) => {
            if actual != *expected as u64 {
                return Err(Error::InvalidSignature {
                    record: R::NAME,
                    expected: *expected,
                    actual: actual as u32,
                });
            }
            Ok(())
        }
        (Validator::Exact(expected), Some(actual)) if actual != *expected => {
            Err(format!("expected {expected}, got {actual}"))
        }
        (Validator::Either(a, b), Some(actual)) if actual != *a && actual != *b => {
            Err(format!("expected either {a} or {b}, got {actual}"))
        }
        (Validator::NotEqual(disallowed), Some(actual)) if actual == *disallowed => {
            Err(format!("value {actual} is not allowed"))
        }
        (Validator::Check(check), _) => check(record),
        _ => Ok(()),
    };

    outcome.map_err(|reason| Error::field(R::NAME, field.name, reason))
}

/// Declare a [`FieldDescriptor`] for a plain struct field.
///
/// Forms:
/// - `field!("name", u16 | u32 | u64, slot)` - always present
/// - `field!("name", opt_u32 | opt_u64, slot)` - `Option` slot, read only
///   when the template already holds `Some`
/// - `field!("name", set_u64, slot)` - `Option` slot that must be injected
///   before encoding
/// - `field!("name", bytes, slot, length_slot)` - variable bytes sized by a
///   sibling
///
/// Any form takes a trailing `=> validator`.
macro_rules! field {
    ($name:literal, $kind:ident, $slot:ident $(, $len:ident)? => $validator:expr) => {
        field!(@build $kind, $name, $slot, $validator $(, $len)?)
    };
    ($name:literal, $kind:ident, $slot:ident $(, $len:ident)?) => {
        field!(@build $kind, $name, $slot, $crate::record::Validator::None $(, $len)?)
    };
    (@build u16, $name:literal, $slot:ident, $validator:expr) => {
        field!(@plain U16, $name, $slot, $validator)
    };
    (@build u32, $name:literal, $slot:ident, $validator:expr) => {
        field!(@plain U32, $name, $slot, $validator)
    };
    (@build u64, $name:literal, $slot:ident, $validator:expr) => {
        field!(@plain U64, $name, $slot, $validator)
    };
    (@build opt_u32, $name:literal, $slot:ident, $validator:expr) => {
        field!(@optional U32, $name, $slot, $validator)
    };
    (@build opt_u64, $name:literal, $slot:ident, $validator:expr) => {
        field!(@optional U64, $name, $slot, $validator)
    };
    (@build set_u64, $name:literal, $slot:ident, $validator:expr) => {
        $crate::record::FieldDescriptor {
            name: $name,
            width: $crate::record::Width::U64,
            presence: $crate::record::Presence::Always,
            validator: $validator,
            get: |r| r.$slot.map($crate::record::Value::U64),
            set: |r, v| {
                if let $crate::record::Value::U64(x) = v {
                    r.$slot = Some(x);
                }
            },
        }
    };
    (@build bytes, $name:literal, $slot:ident, $validator:expr, $len:ident) => {
        $crate::record::FieldDescriptor {
            name: $name,
            width: $crate::record::Width::Bytes(|r| r.$len as usize),
            presence: $crate::record::Presence::Always,
            validator: $validator,
            get: |r| Some($crate::record::Value::Bytes(r.$slot.clone())),
            set: |r, v| {
                if let $crate::record::Value::Bytes(x) = v {
                    r.$slot = x;
                }
            },
        }
    };
    (@plain $variant:ident, $name:literal, $slot:ident, $validator:expr) => {
        $crate::record::FieldDescriptor {
            name: $name,
            width: $crate::record::Width::$variant,
            presence: $crate::record::Presence::Always,
            validator: $validator,
            get: |r| Some($crate::record::Value::$variant(r.$slot)),
            set: |r, v| {
                if let $crate::record::Value::$variant(x) = v {
                    r.$slot = x;
                }
            },
        }
    };
    (@optional $variant:ident, $name:literal, $slot:ident, $validator:expr) => {
        $crate::record::FieldDescriptor {
            name: $name,
            width: $crate::record::Width::$variant,
            presence: $crate::record::Presence::When(|r| r.$slot.is_some()),
            validator: $validator,
            get: |r| r.$slot.map($crate::record::Value::$variant),
            set: |r, v| {
                if let $crate::record::Value::$variant(x) = v {
                    r.$slot = Some(x);
                }
            },
        }
    };
}

pub(crate) use field;
