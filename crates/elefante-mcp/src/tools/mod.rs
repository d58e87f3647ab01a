//! MCP Tools
//!
//! One module per tool family. Every module exposes `schema()` for
//! `tools/list` plus an `execute` returning the tool's JSON payload; the
//! dispatcher owns locking and the mandatory-protocol envelope.

pub mod consolidate;
pub mod context;
pub mod dashboard;
pub mod etl;
pub mod graph;
pub mod memory_add;
pub mod memory_list;
pub mod memory_search;
pub mod sessions;
pub mod system;

use elefante_core::{EngineError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse optional tool arguments into a typed input. Absent arguments parse
/// as an empty object, so required fields produce a clear error.
pub fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T> {
    let value = match args {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(value)
        .map_err(|e| EngineError::InvalidInput(format!("Invalid arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Sample {
        limit: Option<usize>,
    }

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Strict {
        #[allow(dead_code)]
        name: String,
    }

    #[test]
    fn test_parse_args_defaults() {
        let parsed: Sample = parse_args(None).unwrap();
        assert_eq!(parsed, Sample { limit: None });
        let parsed: Sample = parse_args(Some(Value::Null)).unwrap();
        assert_eq!(parsed, Sample { limit: None });
    }

    #[test]
    fn test_parse_args_missing_required_field() {
        let err = parse_args::<Strict>(None).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_parse_args_rejects_unknown_fields() {
        let err = parse_args::<Sample>(Some(serde_json::json!({"bogus": 1}))).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
