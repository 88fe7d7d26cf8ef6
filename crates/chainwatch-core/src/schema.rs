//! Event schema: the static description of one event type.
//!
//! A schema is a constant input to the decoder and the filter builder: the
//! event name, its ordered parameters, which of them are indexed, and the
//! signature hash that appears as `topics[0]` of every matching log.

use crate::fingerprint;
use crate::types::{split_top_level, CanonicalType};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// A single event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: CanonicalType,
    /// Indexed parameters live in `topics[1..]`, the rest in `data`.
    pub indexed: bool,
}

impl ParamDef {
    /// An indexed (topic) parameter.
    pub fn indexed(name: impl Into<String>, ty: CanonicalType) -> Self {
        Self { name: name.into(), ty, indexed: true }
    }

    /// A non-indexed (data payload) parameter.
    pub fn data(name: impl Into<String>, ty: CanonicalType) -> Self {
        Self { name: name.into(), ty, indexed: false }
    }
}

/// A parsed, validated event description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    /// Event name, e.g. "Transfer"
    pub name: String,
    /// keccak256 of the canonical signature; equals `topics[0]` of every log
    pub signature_hash: B256,
    /// Ordered parameter list (declaration order)
    pub params: Vec<ParamDef>,
}

impl EventSchema {
    /// Build a schema and compute its signature hash.
    pub fn new(name: impl Into<String>, params: Vec<ParamDef>) -> Self {
        let name = name.into();
        let signature_hash = fingerprint::signature_hash(&canonical_signature(&name, &params));
        Self { name, signature_hash, params }
    }

    /// Parse a human-readable declaration such as
    /// `"event Transfer(address indexed from, address indexed to, uint256 value)"`.
    /// The `event` keyword is optional; unnamed parameters become `arg{N}`.
    pub fn parse_signature(decl: &str) -> Result<Self, String> {
        let decl = decl.trim().trim_end_matches(';').trim();
        let decl = decl.strip_prefix("event ").unwrap_or(decl).trim();

        let open = decl
            .find('(')
            .ok_or_else(|| format!("missing '(' in '{decl}'"))?;
        let name = decl[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid event name '{name}'"));
        }
        let body = decl[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| format!("missing ')' in '{decl}'"))?;

        let mut params = Vec::new();
        if !body.trim().is_empty() {
            for (i, raw) in split_top_level(body).into_iter().enumerate() {
                params.push(parse_param(raw, i)?);
            }
        }
        let schema = Self::new(name, params);
        if !schema.has_dynamic_data() && schema.packed_data_size().is_none() {
            return Err(format!("data layout of '{name}' is too large"));
        }
        Ok(schema)
    }

    /// The canonical signature string, e.g. `Transfer(address,address,uint256)`.
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.params)
    }

    /// Returns only the indexed parameters (EVM topics[1..]).
    pub fn indexed_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| p.indexed)
    }

    /// Returns only the non-indexed parameters (EVM data payload).
    pub fn data_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| !p.indexed)
    }

    pub fn indexed_count(&self) -> usize {
        self.indexed_params().count()
    }

    /// Exact byte length of `data` when every non-indexed parameter is
    /// static; `None` when at least one is dynamic or the total overflows.
    pub fn packed_data_size(&self) -> Option<usize> {
        self.data_params()
            .try_fold(0usize, |acc, p| acc.checked_add(p.ty.static_size()?))
    }

    /// Returns `true` if at least one non-indexed parameter is dynamic.
    pub fn has_dynamic_data(&self) -> bool {
        self.data_params().any(|p| p.ty.is_dynamic())
    }

    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.name == name)
    }
}

fn canonical_signature(name: &str, params: &[ParamDef]) -> String {
    let types: Vec<String> = params.iter().map(|p| p.ty.to_string()).collect();
    format!("{name}({})", types.join(","))
}

fn parse_param(raw: &str, position: usize) -> Result<ParamDef, String> {
    let raw = raw.trim();

    // Tuple types may contain spaces; take everything up to the matching
    // parenthesis plus any array suffixes as the type.
    let (ty_str, rest) = if raw.starts_with('(') {
        let mut depth = 0i32;
        let mut end = raw.len();
        for (i, c) in raw.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        let suffix_len = raw[end..]
            .find(char::is_whitespace)
            .unwrap_or(raw.len() - end);
        raw.split_at(end + suffix_len)
    } else {
        raw.split_once(char::is_whitespace).unwrap_or((raw, ""))
    };

    let ty: CanonicalType = ty_str.replace(' ', "").parse()?;
    if !ty.has_addressable_size() {
        return Err(format!("type '{ty}' is too large"));
    }

    let mut indexed = false;
    let mut name = None;
    for word in rest.split_whitespace() {
        match word {
            "indexed" if name.is_none() && !indexed => indexed = true,
            w if name.is_none() => name = Some(w.to_string()),
            w => return Err(format!("unexpected token '{w}' in parameter '{raw}'")),
        }
    }

    Ok(ParamDef {
        name: name.unwrap_or_else(|| format!("arg{position}")),
        ty,
        indexed,
    })
}
