//! Utility helpers shared by the MCP handler and the gateway.

use ethers_core::types::U256;
use serde::de::DeserializeOwned;
use serde_json::{from_value, Value};

use crate::mcp::protocol::{error_codes, Response};
use crate::rpc::error::GatewayError;

/// Extract a required argument from a JSON object, producing a ready-made
/// error response when it is missing or of the wrong shape.
pub fn get_required_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<T, Response> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Missing or invalid required argument: '{}'", key),
        )
    })
}

/// Extract an optional argument; absent and mistyped both yield `None`.
pub fn get_optional_arg<T: DeserializeOwned>(args: &Value, key: &str) -> Option<T> {
    args.get(key).cloned().and_then(|v| from_value(v).ok())
}

// --- hex quantity helpers for upstream JSON-RPC responses ---

/// Parse a `0x`-prefixed quantity string into a u64.
pub fn hex_to_u64(raw: &str, what: &str) -> Result<u64, GatewayError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| GatewayError::protocol(format!("malformed hex quantity for {what}: '{raw}'")))
}

/// Read a required hex-quantity field from a response object.
pub fn hex_field_to_u64(obj: &Value, field: &str) -> Result<u64, GatewayError> {
    let raw = obj
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::protocol(format!("response missing '{field}' field")))?;
    hex_to_u64(raw, field)
}

/// Read an optional hex-quantity field (absent or null while pending).
pub fn optional_hex_u64(obj: &Value, field: &str) -> Result<Option<u64>, GatewayError> {
    match obj.get(field).and_then(Value::as_str) {
        Some(raw) => Ok(Some(hex_to_u64(raw, field)?)),
        None => Ok(None),
    }
}

/// Read a required hex-quantity field as a full-width decimal string.
/// Balances do not fit in u64.
pub fn hex_field_to_decimal(obj: &Value, field: &str) -> Result<String, GatewayError> {
    let raw = obj
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::protocol(format!("response missing '{field}' field")))?;
    hex_to_decimal(raw, field)
}

/// Convert a bare `0x` quantity (e.g. an `eth_getBalance` result) to a
/// decimal string.
pub fn hex_to_decimal(raw: &str, what: &str) -> Result<String, GatewayError> {
    let digits = raw.trim_start_matches("0x");
    let digits = if digits.is_empty() { "0" } else { digits };
    U256::from_str_radix(digits, 16)
        .map(|v| v.to_string())
        .map_err(|_| GatewayError::protocol(format!("malformed hex quantity for {what}: '{raw}'")))
}

/// Format a raw integer amount using a token's decimals, trimming trailing
/// zeros: (1500000, 6) -> "1.5". Fractional digits are capped at 6.
pub fn format_units(raw: &str, decimals: u8) -> Option<String> {
    let value = U256::from_dec_str(raw).ok()?;
    if decimals == 0 {
        return Some(value.to_string());
    }
    let divisor = U256::from(10u64).checked_pow(U256::from(decimals))?;
    let whole = value / divisor;
    let frac = value % divisor;
    if frac.is_zero() {
        return Some(whole.to_string());
    }
    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    frac_str.truncate(6);
    let frac_str = frac_str.trim_end_matches('0');
    if frac_str.is_empty() {
        Some(whole.to_string())
    } else {
        Some(format!("{whole}.{frac_str}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_quantities() {
        assert_eq!(hex_to_u64("0x10", "n").unwrap(), 16);
        assert!(hex_to_u64("0xzz", "n").is_err());
        assert_eq!(hex_to_decimal("0xde0b6b3a7640000", "wei").unwrap(), "1000000000000000000");
        assert_eq!(hex_to_decimal("0x", "wei").unwrap(), "0");
    }

    #[test]
    fn unit_formatting() {
        assert_eq!(format_units("1000000000000000000", 18).unwrap(), "1");
        assert_eq!(format_units("1500000", 6).unwrap(), "1.5");
        assert_eq!(format_units("1", 18).unwrap(), "0");
        assert_eq!(format_units("123", 0).unwrap(), "123");
        assert_eq!(format_units("1234567", 6).unwrap(), "1.234567");
    }

    #[test]
    fn optional_args() {
        let args = json!({"count": 5});
        assert_eq!(get_optional_arg::<u64>(&args, "count"), Some(5));
        assert_eq!(get_optional_arg::<u64>(&args, "missing"), None);
    }
}
