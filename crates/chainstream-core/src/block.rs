//! Block model and the `BlockCursor` normalizer.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;
use crate::operation::Operation;

// ─── RawBlock ─────────────────────────────────────────────────────────────────

/// A block exactly as a node returned it.
///
/// Node block payloads do not carry their own number, so the fetcher
/// attaches the number it requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub number: u64,
    pub body: Value,
}

impl RawBlock {
    pub fn new(number: u64, body: Value) -> Self {
        Self { number, body }
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A signed transaction inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Position of the transaction within its block.
    pub index: u32,
    /// Transaction id, when the node reports one.
    pub id: Option<String>,
    pub signatures: Vec<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub operations: Vec<Operation>,
    /// Number of the enclosing block.
    pub block_num: u64,
}

/// A normalized block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub id: Option<String>,
    pub witness: Option<String>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block production time.
    pub fn time(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Block production time as Unix seconds.
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// All operations in block order as `(trx_in_block, op_in_trx, op)`.
    pub fn operations(&self) -> impl Iterator<Item = (u32, u32, &Operation)> + '_ {
        self.transactions.iter().flat_map(|tx| {
            tx.operations
                .iter()
                .enumerate()
                .map(move |(i, op)| (tx.index, i as u32, op))
        })
    }

    /// Total number of operations across all transactions.
    pub fn op_count(&self) -> usize {
        self.transactions.iter().map(|tx| tx.operations.len()).sum()
    }
}

// ─── BlockCursor ──────────────────────────────────────────────────────────────

/// Converts node payloads into [`Block`]s.
///
/// Both operation encodings are folded into [`Operation`] here so nothing
/// downstream ever inspects wire shapes.
pub struct BlockCursor;

impl BlockCursor {
    pub fn normalize(raw: &RawBlock) -> Result<Block, StreamError> {
        let malformed = |reason: &str| StreamError::MalformedBlock {
            block_num: raw.number,
            reason: reason.to_string(),
        };

        let body = raw.body.as_object().ok_or_else(|| malformed("not an object"))?;
        let timestamp = body
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing timestamp"))?;
        let timestamp = parse_time(timestamp)
            .ok_or_else(|| malformed(&format!("unparseable timestamp '{timestamp}'")))?;
        let raw_txs = body
            .get("transactions")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing transaction list"))?;
        let tx_ids = body.get("transaction_ids").and_then(Value::as_array);

        let mut transactions = Vec::with_capacity(raw_txs.len());
        for (i, tx) in raw_txs.iter().enumerate() {
            let raw_ops = tx
                .get("operations")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed(&format!("transaction {i} has no operation list")))?;
            let mut operations = Vec::with_capacity(raw_ops.len());
            for (j, op) in raw_ops.iter().enumerate() {
                let op = Operation::from_wire(op).ok_or_else(|| {
                    malformed(&format!("transaction {i} operation {j} has an unknown shape"))
                })?;
                operations.push(op);
            }

            let id = tx_ids
                .and_then(|ids| ids.get(i))
                .or_else(|| tx.get("transaction_id"))
                .and_then(Value::as_str)
                .map(str::to_string);

            transactions.push(Transaction {
                index: i as u32,
                id,
                signatures: string_list(tx.get("signatures")),
                expiration: tx.get("expiration").and_then(Value::as_str).and_then(parse_time),
                operations,
                block_num: raw.number,
            });
        }

        Ok(Block {
            number: raw.number,
            timestamp,
            id: body.get("block_id").and_then(Value::as_str).map(str::to_string),
            witness: body.get("witness").and_then(Value::as_str).map(str::to_string),
            transactions,
        })
    }
}

/// Parse a node timestamp.
///
/// Nodes send `2018-03-09T06:21:06` (implicitly UTC); RFC 3339 is accepted too.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(body: Value) -> RawBlock {
        RawBlock::new(500, body)
    }

    #[test]
    fn normalizes_mixed_operation_shapes() {
        let block = BlockCursor::normalize(&raw(json!({
            "timestamp": "2018-03-09T06:21:06",
            "witness": "gtg",
            "block_id": "000001f4abc",
            "transaction_ids": ["t0", "t1"],
            "transactions": [
                {"operations": [["transfer", {"from": "a", "to": "b"}]], "signatures": ["1f"]},
                {"operations": [{"type": "vote_operation", "value": {"voter": "a"}}]}
            ]
        })))
        .unwrap();

        assert_eq!(block.number, 500);
        assert_eq!(block.witness.as_deref(), Some("gtg"));
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].id.as_deref(), Some("t0"));
        assert_eq!(block.transactions[0].signatures, vec!["1f".to_string()]);
        assert_eq!(block.transactions[1].operations[0].op_type, "vote");
        assert!(block.transactions.iter().all(|tx| tx.block_num == 500));

        let types: Vec<_> = block.operations().map(|(_, _, op)| op.op_type.as_str()).collect();
        assert_eq!(types, vec!["transfer", "vote"]);
        assert_eq!(block.op_count(), 2);
    }

    #[test]
    fn missing_timestamp_is_malformed() {
        let err = BlockCursor::normalize(&raw(json!({"transactions": []}))).unwrap_err();
        assert!(matches!(err, StreamError::MalformedBlock { block_num: 500, .. }));
    }

    #[test]
    fn missing_transactions_is_malformed() {
        let err =
            BlockCursor::normalize(&raw(json!({"timestamp": "2018-03-09T06:21:06"}))).unwrap_err();
        assert!(err.to_string().contains("missing transaction list"));
    }

    #[test]
    fn unknown_operation_shape_is_malformed() {
        let err = BlockCursor::normalize(&raw(json!({
            "timestamp": "2018-03-09T06:21:06",
            "transactions": [{"operations": ["vote"]}]
        })))
        .unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn parse_time_accepts_both_formats() {
        let a = parse_time("2018-03-09T06:21:06").unwrap();
        let b = parse_time("2018-03-09T06:21:06Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.timestamp(), 1_520_576_466);
        assert!(parse_time("yesterday").is_none());
    }
}
