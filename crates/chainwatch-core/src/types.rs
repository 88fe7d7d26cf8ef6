//! ABI parameter types and decoded values.
//!
//! `CanonicalType` is the subset of the Solidity ABI type system an event
//! parameter can use; `NormalizedValue` is what a decoded parameter looks
//! like to consumers, independent of the ABI library used to decode it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Solidity ABI type of an event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    /// Unsigned integer (uint8 .. uint256). Width in bits.
    Uint(u16),
    /// Signed integer (int8 .. int256). Width in bits.
    Int(u16),
    Bool,
    /// 20-byte account address
    Address,
    /// bytes1 .. bytes32. Length in bytes.
    FixedBytes(u8),
    /// Variable-length byte array
    Bytes,
    /// UTF-8 string
    String,
    /// Fixed-length array, e.g. `uint256[3]`
    Array { elem: Box<CanonicalType>, len: usize },
    /// Variable-length array, e.g. `address[]`
    Vec(Box<CanonicalType>),
    /// Tuple / struct
    Tuple(Vec<CanonicalType>),
}

impl CanonicalType {
    /// Size in bytes of this type in the ABI head, or `None` if the type is
    /// dynamic (encoded out of line behind an offset) or its size does not
    /// fit in a `usize`.
    pub fn static_size(&self) -> Option<usize> {
        match self {
            Self::Uint(_) | Self::Int(_) | Self::Bool | Self::Address | Self::FixedBytes(_) => {
                Some(32)
            }
            Self::Bytes | Self::String | Self::Vec(_) => None,
            Self::Array { elem, len } => elem.static_size()?.checked_mul(*len),
            Self::Tuple(types) => types
                .iter()
                .try_fold(0usize, |acc, t| acc.checked_add(t.static_size()?)),
        }
    }

    /// Returns `false` if this type or any static component nested in it has
    /// a head size that does not fit in a `usize`.
    pub fn has_addressable_size(&self) -> bool {
        let nested = match self {
            Self::Array { elem, .. } | Self::Vec(elem) => elem.has_addressable_size(),
            Self::Tuple(types) => types.iter().all(Self::has_addressable_size),
            _ => true,
        };
        nested && (self.is_dynamic() || self.static_size().is_some())
    }

    /// Returns `true` if the type is encoded out of line behind an offset.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::String | Self::Vec(_) => true,
            Self::Array { elem, .. } => elem.is_dynamic(),
            Self::Tuple(types) => types.iter().any(Self::is_dynamic),
            _ => false,
        }
    }

    /// Returns `true` for types whose indexed form is a keccak256 hash of the
    /// encoded value rather than the value itself.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Bytes | Self::String | Self::Vec(_) | Self::Array { .. } | Self::Tuple(_)
        )
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Bool => write!(f, "bool"),
            Self::Address => write!(f, "address"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => write!(f, "bytes"),
            Self::String => write!(f, "string"),
            Self::Array { elem, len } => write!(f, "{elem}[{len}]"),
            Self::Vec(elem) => write!(f, "{elem}[]"),
            Self::Tuple(types) => {
                let parts: Vec<_> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}

impl FromStr for CanonicalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        // Array suffixes bind loosest: `uint256[2][]` is a Vec of uint256[2].
        if let Some(head) = s.strip_suffix(']') {
            let open = head
                .rfind('[')
                .ok_or_else(|| format!("unbalanced brackets in '{s}'"))?;
            let elem: CanonicalType = head[..open].parse()?;
            let len = &head[open + 1..];
            return if len.is_empty() {
                Ok(Self::Vec(Box::new(elem)))
            } else {
                let len = len
                    .parse::<usize>()
                    .map_err(|_| format!("invalid array length in '{s}'"))?;
                Ok(Self::Array { elem: Box::new(elem), len })
            };
        }

        if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            if inner.trim().is_empty() {
                return Ok(Self::Tuple(vec![]));
            }
            let types = split_top_level(inner)
                .into_iter()
                .map(str::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Tuple(types));
        }

        match s {
            "bool" => return Ok(Self::Bool),
            "address" => return Ok(Self::Address),
            "bytes" => return Ok(Self::Bytes),
            "string" => return Ok(Self::String),
            "uint" => return Ok(Self::Uint(256)),
            "int" => return Ok(Self::Int(256)),
            _ => {}
        }

        if let Some(bits) = s.strip_prefix("uint") {
            return parse_int_width(bits).map(Self::Uint).ok_or_else(|| format!("invalid type '{s}'"));
        }
        if let Some(bits) = s.strip_prefix("int") {
            return parse_int_width(bits).map(Self::Int).ok_or_else(|| format!("invalid type '{s}'"));
        }
        if let Some(n) = s.strip_prefix("bytes") {
            return match n.parse::<u8>() {
                Ok(n) if (1..=32).contains(&n) => Ok(Self::FixedBytes(n)),
                _ => Err(format!("invalid type '{s}'")),
            };
        }

        Err(format!("unsupported type '{s}'"))
    }
}

fn parse_int_width(bits: &str) -> Option<u16> {
    let bits = bits.parse::<u16>().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

/// Split a comma-separated list, ignoring commas nested inside parentheses.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// A decoded event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum NormalizedValue {
    Uint(u128),
    /// Uints that do not fit in u128, as a decimal string
    BigUint(String),
    Int(i128),
    /// Ints that do not fit in i128, as a decimal string
    BigInt(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    /// 0x-prefixed EIP-55 checksummed address
    Address(String),
    /// keccak256 of an indexed reference-type value; the value itself is
    /// not recoverable from the log.
    Hash256(String),
    Array(Vec<NormalizedValue>),
    Tuple(Vec<NormalizedValue>),
}

impl NormalizedValue {
    /// Returns the inner string if this is an Address value.
    pub fn as_address(&self) -> Option<&str> {
        match self {
            NormalizedValue::Address(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerce to a u128 if this is a small Uint.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            NormalizedValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NormalizedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NormalizedValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Short kind name, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedValue::Uint(_) | NormalizedValue::BigUint(_) => "uint",
            NormalizedValue::Int(_) | NormalizedValue::BigInt(_) => "int",
            NormalizedValue::Bool(_) => "bool",
            NormalizedValue::Bytes(_) => "bytes",
            NormalizedValue::Str(_) => "string",
            NormalizedValue::Address(_) => "address",
            NormalizedValue::Hash256(_) => "hash256",
            NormalizedValue::Array(_) => "array",
            NormalizedValue::Tuple(_) => "tuple",
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Uint(v) => write!(f, "{v}"),
            NormalizedValue::BigUint(v) => write!(f, "{v}"),
            NormalizedValue::Int(v) => write!(f, "{v}"),
            NormalizedValue::BigInt(v) => write!(f, "{v}"),
            NormalizedValue::Bool(v) => write!(f, "{v}"),
            NormalizedValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            NormalizedValue::Str(s) => write!(f, "{s}"),
            NormalizedValue::Address(a) => write!(f, "{a}"),
            NormalizedValue::Hash256(h) => write!(f, "{h}"),
            NormalizedValue::Array(v) | NormalizedValue::Tuple(v) => {
                let parts: Vec<_> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_type_display() {
        assert_eq!(CanonicalType::Uint(256).to_string(), "uint256");
        assert_eq!(CanonicalType::Address.to_string(), "address");
        assert_eq!(
            CanonicalType::Vec(Box::new(CanonicalType::Address)).to_string(),
            "address[]"
        );
        assert_eq!(
            CanonicalType::Tuple(vec![CanonicalType::Bool, CanonicalType::FixedBytes(32)])
                .to_string(),
            "(bool,bytes32)"
        );
    }

    #[test]
    fn parse_scalar_types() {
        assert_eq!("uint256".parse::<CanonicalType>().unwrap(), CanonicalType::Uint(256));
        assert_eq!("uint".parse::<CanonicalType>().unwrap(), CanonicalType::Uint(256));
        assert_eq!("int24".parse::<CanonicalType>().unwrap(), CanonicalType::Int(24));
        assert_eq!("bytes4".parse::<CanonicalType>().unwrap(), CanonicalType::FixedBytes(4));
        assert!("uint7".parse::<CanonicalType>().is_err());
        assert!("bytes33".parse::<CanonicalType>().is_err());
        assert!("mapping".parse::<CanonicalType>().is_err());
    }

    #[test]
    fn parse_nested_types() {
        let ty: CanonicalType = "(address,uint256[2])[]".parse().unwrap();
        assert_eq!(
            ty,
            CanonicalType::Vec(Box::new(CanonicalType::Tuple(vec![
                CanonicalType::Address,
                CanonicalType::Array {
                    elem: Box::new(CanonicalType::Uint(256)),
                    len: 2
                },
            ])))
        );
        assert_eq!(ty.to_string(), "(address,uint256[2])[]");
    }

    #[test]
    fn static_sizes() {
        assert_eq!(CanonicalType::Uint(8).static_size(), Some(32));
        assert_eq!(CanonicalType::String.static_size(), None);
        assert_eq!("uint256[3]".parse::<CanonicalType>().unwrap().static_size(), Some(96));
        assert_eq!("(bool,address)".parse::<CanonicalType>().unwrap().static_size(), Some(64));
        assert_eq!("(bool,string)".parse::<CanonicalType>().unwrap().static_size(), None);
    }

    #[test]
    fn oversized_static_layouts() {
        let huge: CanonicalType = "uint256[1000000000000000000]".parse().unwrap();
        assert!(!huge.is_dynamic());
        assert_eq!(huge.static_size(), None);
        assert!(!huge.has_addressable_size());

        let nested: CanonicalType = "(uint256[1000000000000000000],string)".parse().unwrap();
        assert!(nested.is_dynamic());
        assert!(!nested.has_addressable_size());

        let wide_tuple = CanonicalType::Tuple(vec![
            CanonicalType::Array { elem: Box::new(CanonicalType::Bool), len: usize::MAX / 32 },
            CanonicalType::Array { elem: Box::new(CanonicalType::Bool), len: usize::MAX / 32 },
        ]);
        assert_eq!(wide_tuple.static_size(), None);
        assert!("bool[3][]".parse::<CanonicalType>().unwrap().has_addressable_size());
    }

    #[test]
    fn normalized_value_serde_roundtrip() {
        let val = NormalizedValue::Address("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".into());
        let json = serde_json::to_string(&val).unwrap();
        let back: NormalizedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(val, back);
    }
}
