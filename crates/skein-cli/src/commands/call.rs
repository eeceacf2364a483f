//! `skein call`

use anyhow::{Context, Result};
use serde_json::Value;
use skein_client::Client;

pub async fn execute(client: &Client, method: &str, params: &str) -> Result<()> {
    let params = parse_params(params)?;
    let result = client.call_method(method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse JSON parameters. A bare scalar is wrapped into a one-element array.
pub fn parse_params(raw: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON params: {}", raw))?;
    Ok(match value {
        Value::Array(_) | Value::Object(_) => value,
        scalar => Value::Array(vec![scalar]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_pass_through() {
        assert_eq!(parse_params("[1, \"a\"]").unwrap(), json!([1, "a"]));
        assert_eq!(parse_params("{\"k\": 2}").unwrap(), json!({"k": 2}));
    }

    #[test]
    fn test_scalar_params_wrapped() {
        assert_eq!(parse_params("7").unwrap(), json!([7]));
    }

    #[test]
    fn test_invalid_params() {
        assert!(parse_params("[1,").is_err());
    }
}
