//! Canonical trace records and the permissive raw record they are parsed from.
//!
//! Every interpreter dialect is first read into a [`RawStep`], a superset of
//! the fields any supported EVM prints per opcode. Numeric quantities are
//! accepted as JSON numbers, decimal strings or `0x` hex strings. A
//! [`RawStep`] that describes a genuine opcode execution is then normalized
//! into a [`StepEvent`], whose serialization is the canonical line format.

use std::collections::BTreeMap;
use std::fmt;

use ethereum_types::U256;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::opcodes;

/// Length of a `0x`-prefixed 32-byte hash rendered as hex.
pub const STATE_ROOT_LEN: usize = 66;

/// Opcode byte of `STOP`.
pub const OP_STOP: u8 = 0x00;

/// One executed opcode in canonical form.
///
/// `gas_cost`, `mem_size` and `refund` are always zero: not every dialect
/// reports them, so canonical equality must not depend on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub pc: u64,
    pub op: u8,
    #[serde(serialize_with = "serialize_quantity")]
    pub gas: u64,
    #[serde(serialize_with = "serialize_quantity")]
    pub gas_cost: u64,
    pub memory: String,
    pub mem_size: u64,
    #[serde(serialize_with = "serialize_stack")]
    pub stack: Vec<U256>,
    #[serde(
        skip_serializing_if = "BTreeMap::is_empty",
        serialize_with = "serialize_storage"
    )]
    pub storage: BTreeMap<U256, U256>,
    pub depth: u64,
    pub refund: u64,
    pub op_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// The last record of every canonical stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRecord {
    /// `0x` followed by 64 lowercase hex digits, or empty when no root was
    /// reported.
    #[serde(rename = "StateRoot")]
    pub state_root: String,
}

impl TerminalRecord {
    pub fn new(state_root: Option<String>) -> Self {
        Self {
            state_root: state_root.unwrap_or_default(),
        }
    }
}

/// Per-opcode record as printed by any supported interpreter.
///
/// Unknown fields (`returnStack`, `opName` spellings, timing data) are
/// ignored, and so are `gasCost`, `memSize` and `refund`, whose canonical
/// value is always zero: a malformed value there must not cost the step. A
/// missing `depth` deserializes as `None`, which marks the line as not being
/// a genuine step.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStep {
    pub pc: Option<Quantity>,
    pub op: Option<Quantity>,
    pub gas: Option<Quantity>,
    pub memory: Option<String>,
    pub stack: Option<Vec<Word>>,
    pub storage: Option<BTreeMap<Word, Word>>,
    pub depth: Option<Quantity>,
    pub op_name: Option<String>,
    pub error: Option<String>,
}

impl RawStep {
    /// Normalize into a canonical step, or `None` when the record is not a
    /// genuine opcode execution (depth absent or zero, opcode absent or not
    /// a byte).
    pub fn into_step(self) -> Option<StepEvent> {
        let depth = self.depth.map(|d| d.0).unwrap_or_default();
        if depth == 0 {
            return None;
        }
        let op = u8::try_from(self.op?.0).ok()?;

        Some(StepEvent {
            pc: self.pc.map(|pc| pc.0).unwrap_or_default(),
            op,
            gas: self.gas.map(|g| g.0).unwrap_or_default(),
            gas_cost: 0,
            memory: normalize_hex_blob(self.memory.as_deref().unwrap_or_default()),
            mem_size: 0,
            stack: self
                .stack
                .unwrap_or_default()
                .into_iter()
                .map(|w| w.0)
                .collect(),
            storage: self
                .storage
                .unwrap_or_default()
                .into_iter()
                .map(|(slot, value)| (slot.0, value.0))
                .collect(),
            depth,
            refund: 0,
            op_name: opcodes::name(op).into_owned(),
            error: self.error.unwrap_or_default(),
        })
    }
}

/// An unsigned 64-bit quantity: JSON number, decimal string or hex string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quantity(pub u64);

/// A 256-bit word: JSON number, decimal string or hex string of any width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Word(pub U256);

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(Quantity(n)),
            NumberOrString::String(s) => parse_quantity(&s).map(Quantity).map_err(de::Error::custom),
        }
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(Word(U256::from(n))),
            NumberOrString::String(s) => parse_word(&s).map(Word).map_err(de::Error::custom),
        }
    }
}

/// Error returned when a numeric string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid numeric value `{0}`")]
pub struct InvalidNumber(pub String);

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Parse a `u64` from `0x` hex or decimal text.
pub fn parse_quantity(s: &str) -> Result<u64, InvalidNumber> {
    let s = s.trim();
    let parsed = match strip_hex_prefix(s) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| InvalidNumber(s.to_string()))
}

/// Parse a 256-bit word from `0x` hex (any width up to 64 digits) or decimal
/// text.
pub fn parse_word(s: &str) -> Result<U256, InvalidNumber> {
    let s = s.trim();
    let invalid = || InvalidNumber(s.to_string());
    match strip_hex_prefix(s) {
        Some(digits) => {
            if digits.is_empty() || digits.len() > 64 {
                return Err(invalid());
            }
            let padded = format!("{digits:0>64}");
            let bytes = hex::decode(padded).map_err(|_| invalid())?;
            Ok(U256::from_big_endian(&bytes))
        }
        None => U256::from_dec_str(s).map_err(|_| invalid()),
    }
}

/// Minimal lowercase hex with `0x` prefix (`0x0` for zero).
pub fn word_to_hex(word: &U256) -> String {
    let full = hex::encode(word.to_big_endian());
    let trimmed = full.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{trimmed}")
    }
}

/// Zero-padded 32-byte lowercase hex with `0x` prefix.
pub fn word_to_padded_hex(word: &U256) -> String {
    format!("0x{}", hex::encode(word.to_big_endian()))
}

/// Lowercase a hex blob and make sure it carries a `0x` prefix.
fn normalize_hex_blob(blob: &str) -> String {
    let digits = strip_hex_prefix(blob).unwrap_or(blob);
    format!("0x{}", digits.to_ascii_lowercase())
}

fn serialize_quantity<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:#x}"))
}

fn serialize_stack<S: Serializer>(stack: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(stack.iter().map(word_to_hex))
}

fn serialize_storage<S: Serializer>(
    storage: &BTreeMap<U256, U256>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        storage
            .iter()
            .map(|(slot, value)| (word_to_padded_hex(slot), word_to_padded_hex(value))),
    )
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc={} op={} depth={} gas={:#x}",
            self.pc, self.op_name, self.depth, self.gas
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_accepts_number_hex_and_decimal() {
        let q: Quantity = serde_json::from_str("42").unwrap();
        assert_eq!(q.0, 42);
        let q: Quantity = serde_json::from_str("\"0x2a\"").unwrap();
        assert_eq!(q.0, 42);
        let q: Quantity = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(q.0, 42);
        assert!(serde_json::from_str::<Quantity>("\"0xzz\"").is_err());
    }

    #[test]
    fn test_word_normalizes_padding() {
        let padded = "0x0000000000000000000000000000000000000000000000000000000000000003";
        assert_eq!(parse_word(padded).unwrap(), U256::from(3));
        assert_eq!(parse_word("0x3").unwrap(), U256::from(3));
        assert_eq!(parse_word("3").unwrap(), U256::from(3));
        assert!(parse_word("0x").is_err());
        assert!(parse_word(&format!("0x1{}", "0".repeat(64))).is_err());
    }

    #[test]
    fn test_word_to_hex_forms() {
        assert_eq!(word_to_hex(&U256::zero()), "0x0");
        assert_eq!(word_to_hex(&U256::from(0xabcu64)), "0xabc");
        assert_eq!(
            word_to_padded_hex(&U256::from(1)),
            format!("0x{}1", "0".repeat(63))
        );
    }

    #[test]
    fn test_raw_step_depth_zero_is_not_a_step() {
        let raw: RawStep = serde_json::from_str(r#"{"pc":0,"op":96,"depth":0}"#).unwrap();
        assert!(raw.into_step().is_none());
        let raw: RawStep = serde_json::from_str(r#"{"stateRoot":"abcd"}"#).unwrap();
        assert!(raw.into_step().is_none());
    }

    #[test]
    fn test_raw_step_ignores_oversized_zeroed_fields() {
        let wide = format!("0x{}", "f".repeat(64));
        let line = format!(
            r#"{{"pc":5,"op":241,"gas":"0x10","gasCost":"{wide}","memSize":-1,"refund":"n/a","stack":[],"depth":1}}"#
        );
        let raw: RawStep = serde_json::from_str(&line).unwrap();
        let step = raw.into_step().unwrap();
        assert_eq!(step.op_name, "CALL");
        assert_eq!(step.gas_cost, 0);
        assert_eq!(step.mem_size, 0);
        assert_eq!(step.refund, 0);
    }

    #[test]
    fn test_raw_step_rejects_non_byte_opcode() {
        let raw: RawStep = serde_json::from_str(r#"{"pc":0,"op":300,"depth":1}"#).unwrap();
        assert!(raw.into_step().is_none());
    }

    #[test]
    fn test_step_serialization_zeroes_unreliable_fields() {
        let raw: RawStep = serde_json::from_str(
            r#"{"pc":2,"op":1,"gas":"100","gasCost":"3","memory":"","memSize":64,"stack":["0x01","0x02"],"depth":1,"refund":7,"opName":"add"}"#,
        )
        .unwrap();
        let step = raw.into_step().unwrap();
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(
            json,
            r#"{"pc":2,"op":1,"gas":"0x64","gasCost":"0x0","memory":"0x","memSize":0,"stack":["0x1","0x2"],"depth":1,"refund":0,"opName":"ADD"}"#
        );
    }

    #[test]
    fn test_step_serialization_keeps_storage_and_error() {
        let raw: RawStep = serde_json::from_str(
            r#"{"pc":7,"op":85,"gas":"0x10","stack":[],"storage":{"0x0":"0x3"},"depth":2,"error":"out of gas"}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&raw.into_step().unwrap()).unwrap();
        let zero = format!("0x{}", "0".repeat(64));
        let three = format!("0x{}3", "0".repeat(63));
        assert!(json.contains(&format!(r#""storage":{{"{zero}":"{three}"}}"#)));
        assert!(json.ends_with(r#""opName":"SSTORE","error":"out of gas"}"#));
    }

    #[test]
    fn test_terminal_record_field_name() {
        let json = serde_json::to_string(&TerminalRecord::new(None)).unwrap();
        assert_eq!(json, r#"{"StateRoot":""}"#);
    }
}
