//! Interpretation of raw ledger replies.
//!
//! A reply is either the literal `true`/`false`, a decimal count, or a JSON
//! document. Anything else is an [`LedgerError::External`] carrying the raw
//! text.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::LedgerError;

fn external(call: &'static str, raw: &str) -> LedgerError {
    LedgerError::External {
        call,
        raw: raw.to_string(),
    }
}

pub fn parse_bool(call: &'static str, raw: &str) -> Result<bool, LedgerError> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(external(call, raw)),
    }
}

pub fn parse_count(call: &'static str, raw: &str) -> Result<u64, LedgerError> {
    raw.trim().parse().map_err(|_| external(call, raw))
}

/// Parse a JSON object or array reply into `T`.
pub fn parse_json<T: DeserializeOwned>(call: &'static str, raw: &str) -> Result<T, LedgerError> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Err(external(call, raw));
    }
    serde_json::from_str(trimmed).map_err(|_| external(call, raw))
}

/// A JSON number that some ledger builds emit as a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum FlexibleU64 {
    Number(u64),
    Text(String),
}

impl FlexibleU64 {
    pub(crate) fn value(&self) -> Option<u64> {
        match self {
            FlexibleU64::Number(n) => Some(*n),
            FlexibleU64::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_are_literal() {
        assert!(parse_bool("isValidator", "true\n").unwrap());
        assert!(!parse_bool("isValidator", " false").unwrap());
    }

    #[test]
    fn non_boolean_reply_keeps_raw_text() {
        let err = parse_bool("isNodeRegistered", "Error: contract not found").unwrap_err();
        match err {
            LedgerError::External { call, raw } => {
                assert_eq!(call, "isNodeRegistered");
                assert_eq!(raw, "Error: contract not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_reply_is_not_false() {
        assert!(parse_bool("checkIfDeployed", "").is_err());
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count("getPeerCount", "4\n").unwrap(), 4);
        assert!(parse_count("getPeerCount", "0x4").is_err());
    }

    #[test]
    fn json_requires_object_or_array() {
        let v: Vec<String> = parse_json("getValidatorsByBlockNumber", r#"["0xab"]"#).unwrap();
        assert_eq!(v, vec!["0xab".to_string()]);
        assert!(parse_json::<Vec<String>>("getValidatorsByBlockNumber", "0xab").is_err());
        assert!(parse_json::<Vec<String>>("getValidatorsByBlockNumber", "[1, 2").is_err());
    }

    #[test]
    fn flexible_numbers() {
        let n: FlexibleU64 = serde_json::from_str("17").unwrap();
        let s: FlexibleU64 = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(n.value(), Some(17));
        assert_eq!(s.value(), Some(17));
    }
}
