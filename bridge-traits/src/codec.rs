//! Structured Value Codec
//!
//! Remote function arguments and results travel as structured values.
//! The encoding itself is owned by the host; the core only needs to turn an
//! argument list into wire text and a result body back into a value.

use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Encoder/decoder for structured values exchanged with remote functions.
pub trait ValueCodec: Send + Sync {
    /// Encode an argument list as the wire representation of an array.
    fn encode_arguments(&self, arguments: &[Value]) -> Result<String>;

    /// Decode a single result value from a response body.
    fn decode_result(&self, body: &str) -> Result<Value>;
}

/// Plain JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode_arguments(&self, arguments: &[Value]) -> Result<String> {
        serde_json::to_string(arguments).map_err(|e| BridgeError::Codec(e.to_string()))
    }

    fn decode_result(&self, body: &str) -> Result<Value> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).map_err(|e| BridgeError::Codec(e.to_string()))
    }
}
