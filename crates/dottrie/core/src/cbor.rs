// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Canonical CBOR helpers shared by the node and proof codecs.
//!
//! Every externally visible encoding in this crate (trie nodes, proof
//! wires) is a CBOR array of byte strings and small integers. These
//! helpers wrap `ciborium` with the narrow surface the codecs need and map
//! decode failures into a single error type that the per-trie errors wrap.

use ciborium::value::Value;
use thiserror::Error;

/// Error raised when bytes do not decode as the expected CBOR shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cbor: {0}")]
pub struct CborError(pub String);

/// Serializes a CBOR value into bytes.
pub fn to_vec(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail for the value shapes built here
    // (arrays, byte strings, unsigned integers).
    let _ = ciborium::ser::into_writer(value, &mut out);
    out
}

/// Parses bytes into a single CBOR value.
pub fn from_slice(data: &[u8]) -> Result<Value, CborError> {
    ciborium::de::from_reader(data).map_err(|e| CborError(e.to_string()))
}

/// Byte-string value.
pub fn bytes(data: &[u8]) -> Value {
    Value::Bytes(data.to_vec())
}

/// Unsigned-integer value.
pub fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Array value.
pub fn array(items: Vec<Value>) -> Value {
    Value::Array(items)
}

/// Expects an array, returning its elements.
pub fn as_array(value: &Value) -> Result<&[Value], CborError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(CborError(format!("expected array, found {other:?}"))),
    }
}

/// Expects a byte string, returning its contents.
pub fn as_bytes(value: &Value) -> Result<&[u8], CborError> {
    match value {
        Value::Bytes(data) => Ok(data),
        other => Err(CborError(format!("expected byte string, found {other:?}"))),
    }
}

/// Expects an unsigned integer fitting in u64.
pub fn as_uint(value: &Value) -> Result<u64, CborError> {
    match value {
        Value::Integer(n) => u64::try_from(*n).map_err(|_| CborError("integer out of range".to_string())),
        other => Err(CborError(format!("expected unsigned integer, found {other:?}"))),
    }
}

/// Expects a byte string of exactly 32 bytes.
pub fn as_hash(value: &Value) -> Result<crate::hash::Hash, CborError> {
    let data = as_bytes(value)?;
    let arr: crate::hash::Hash = data.try_into().map_err(|_| CborError(format!("expected 32-byte digest, found {} bytes", data.len())))?;
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_of_bytes_round_trip() {
        let value = array(vec![bytes(b"left"), bytes(b"right"), uint(7)]);
        let encoded = to_vec(&value);
        let decoded = from_slice(&encoded).unwrap();
        let items = as_array(&decoded).unwrap();
        assert_eq!(as_bytes(&items[0]).unwrap(), b"left");
        assert_eq!(as_bytes(&items[1]).unwrap(), b"right");
        assert_eq!(as_uint(&items[2]).unwrap(), 7);
    }

    #[test]
    fn test_shape_errors() {
        assert!(as_array(&bytes(b"x")).is_err());
        assert!(as_bytes(&uint(1)).is_err());
        assert!(as_hash(&bytes(b"short")).is_err());
        assert!(from_slice(b"\xff\xff\xff").is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let value = array(vec![bytes(&[0u8; 32]), uint(42)]);
        assert_eq!(to_vec(&value), to_vec(&value));
    }
}
