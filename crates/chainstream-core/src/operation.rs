//! Canonical operation model and content hashing.
//!
//! Nodes deliver operations in two wire shapes:
//!
//! ```text
//! ["vote", {"voter": "…", …}]                          tagged pair (legacy API)
//! {"type": "vote_operation", "value": {"voter": …}}     named record (appbase)
//! ```
//!
//! Both are normalized once, at block ingestion, into [`Operation`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::block::Transaction;
use crate::error::StreamError;

const OPERATION_SUFFIX: &str = "_operation";

/// A single state-changing action with its type tag and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Type tag without the `_operation` suffix (e.g. `"transfer"`).
    #[serde(rename = "type")]
    pub op_type: String,
    /// Operation payload exactly as delivered by the node.
    pub value: Value,
}

impl Operation {
    pub fn new(op_type: impl Into<String>, value: Value) -> Self {
        Self {
            op_type: strip_suffix(&op_type.into()).to_string(),
            value,
        }
    }

    /// Parse either wire shape. Returns `None` for anything else.
    pub fn from_wire(v: &Value) -> Option<Self> {
        match v {
            Value::Array(pair) if pair.len() == 2 => {
                let op_type = pair[0].as_str()?;
                Some(Self::new(op_type, pair[1].clone()))
            }
            Value::Object(record) => {
                let op_type = record.get("type")?.as_str()?;
                let value = record.get("value")?.clone();
                Some(Self::new(op_type, value))
            }
            _ => None,
        }
    }

    /// The tagged-pair wire shape `[type, value]`.
    pub fn to_pair(&self) -> Value {
        json!([self.op_type, self.value])
    }

    /// Hex SHA-256 over the canonical encoding of `(type, value)`.
    ///
    /// Object keys are sorted at every depth, so the digest depends only on
    /// content, never on wire shape or key order.
    pub fn hash(&self) -> String {
        let mut buf = String::new();
        buf.push_str("{\"type\":");
        write_canonical(&Value::String(self.op_type.clone()), &mut buf);
        buf.push_str(",\"value\":");
        write_canonical(&self.value, &mut buf);
        buf.push('}');
        hex::encode(Sha256::digest(buf.as_bytes()))
    }
}

/// Hash an operation given in either wire shape.
pub fn hash_op(raw: &Value) -> Result<String, StreamError> {
    Operation::from_wire(raw)
        .map(|op| op.hash())
        .ok_or_else(|| StreamError::Other(format!("not an operation: {raw}")))
}

pub(crate) fn strip_suffix(op_type: &str) -> &str {
    match op_type.strip_suffix(OPERATION_SUFFIX) {
        Some(base) if !base.is_empty() => base,
        _ => op_type,
    }
}

fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ─── StreamedOp ───────────────────────────────────────────────────────────────

/// How a [`StreamedOp`] renders when serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpShape {
    /// `{"type": …, <payload fields>, "block_num": …, …}`
    #[default]
    Flat,
    /// `{"block_num": …, "op": [type, value], …}`
    Raw,
}

/// One operation yielded by a stream, with its position in the chain.
#[derive(Debug, Clone)]
pub struct StreamedOp {
    /// Number of the block that contains the operation.
    pub block_num: u64,
    /// Timestamp of that block.
    pub timestamp: DateTime<Utc>,
    pub trx_id: Option<String>,
    /// Index of the transaction within the block.
    pub trx_in_block: u32,
    /// Index of the operation within the transaction.
    pub op_in_trx: u32,
    pub op: Operation,
    /// Canonical content hash of `op`.
    pub id: String,
    /// Enclosing transaction; `None` for operation-only streams.
    pub transaction: Option<Arc<Transaction>>,
    pub shape: OpShape,
}

impl StreamedOp {
    pub fn op_type(&self) -> &str {
        &self.op.op_type
    }
}

/// Keys the flat view writes itself; payload fields with these names are
/// dropped so the output never repeats a key.
const ENVELOPE_KEYS: [&str; 7] = ["type", "_id", "block_num", "timestamp", "trx_id", "trx_in_block", "op_in_trx"];

impl Serialize for StreamedOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self.shape {
            OpShape::Flat => {
                map.serialize_entry("type", &self.op.op_type)?;
                match &self.op.value {
                    Value::Object(fields) => {
                        for (k, v) in fields {
                            if !ENVELOPE_KEYS.contains(&k.as_str()) {
                                map.serialize_entry(k, v)?;
                            }
                        }
                    }
                    other => map.serialize_entry("value", other)?,
                }
                map.serialize_entry("_id", &self.id)?;
            }
            OpShape::Raw => {
                map.serialize_entry("op", &self.op.to_pair())?;
            }
        }
        map.serialize_entry("block_num", &self.block_num)?;
        map.serialize_entry("timestamp", &self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        map.serialize_entry("trx_id", &self.trx_id)?;
        map.serialize_entry("trx_in_block", &self.trx_in_block)?;
        map.serialize_entry("op_in_trx", &self.op_in_trx)?;
        map.end()
    }
}
