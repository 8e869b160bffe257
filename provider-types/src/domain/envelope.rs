//! Uniform response envelopes.
//!
//! The reseller answers `{code, data, msg}`; the gateway answers
//! `{result: {result, code, message}, data}`. Both are decoded leniently:
//! codes may arrive as numbers, numeric strings or `null`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ProviderError, category_for_gateway_failure};

/// Upstream business failure extracted from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessFailure {
    pub code: i64,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reseller envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, alias = "message", deserialize_with = "null_as_empty")]
    pub msg: String,
}

impl Envelope {
    /// Envelope returned when no network call is made.
    pub fn synthetic_success() -> Self {
        Self {
            code: Some(0),
            data: Value::Object(Default::default()),
            msg: "ok".to_string(),
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("envelope is not JSON: {}", e)))
    }

    /// `code` absent, 0 or 200 with no nested `data.err_code`.
    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }

    /// The business failure this envelope reports, if any.
    ///
    /// A nested `data.err_code`/`data.err_msg` takes precedence over the
    /// top-level `code`/`msg`.
    pub fn failure(&self) -> Option<BusinessFailure> {
        if let Some(nested) = self.nested_error_code() {
            let message = self
                .data
                .get("err_msg")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(&self.msg)
                .to_string();
            return Some(BusinessFailure {
                code: nested,
                message,
            });
        }
        match self.code {
            None | Some(0) | Some(200) => None,
            Some(code) => Some(BusinessFailure {
                code,
                message: self.msg.clone(),
            }),
        }
    }

    /// Code and message for credential failures, present or not.
    pub fn error_details(&self) -> (Option<i64>, String) {
        match self.failure() {
            Some(f) => (Some(f.code), f.message),
            None => (self.code, self.msg.clone()),
        }
    }

    pub fn into_data(self) -> Value {
        self.data
    }

    // Falsy codes (0, "", "0", null) do not count as failures.
    fn nested_error_code(&self) -> Option<i64> {
        let raw = self.data.get("err_code")?;
        let code = match raw {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().parse::<i64>().unwrap_or(-1)),
            Value::Bool(true) => Some(-1),
            _ => None,
        }?;
        (code != 0).then_some(code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<i64>,
    #[serde(default, alias = "msg", deserialize_with = "null_as_empty")]
    pub message: String,
}

/// Gateway response body: either `{result, data}` or the reseller-style `{code, data, msg}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEnvelope {
    #[serde(default)]
    pub result: Option<GatewayResult>,
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<i64>,
    #[serde(default, alias = "message", deserialize_with = "null_as_empty")]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl GatewayEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("gateway body is not JSON: {}", e)))
    }

    /// Returns `data`, or the classified business error the gateway reported.
    pub fn into_result(self) -> Result<Value, ProviderError> {
        let (ok, code, message) = match &self.result {
            Some(r) => {
                let ok = match r.result.as_deref() {
                    None => true,
                    Some(flag) => flag.eq_ignore_ascii_case("s"),
                } || matches!(r.code, Some(0) | Some(200));
                (ok, r.code, r.message.clone())
            }
            None => (
                matches!(self.code, None | Some(0) | Some(200)),
                self.code,
                self.msg.clone(),
            ),
        };
        if ok {
            return Ok(self.data);
        }
        let message = if message.is_empty() {
            "gateway error".to_string()
        } else {
            message
        };
        Err(ProviderError::Business {
            code: code.map(|c| c.to_string()).unwrap_or_else(|| "-1".to_string()),
            category: category_for_gateway_failure(code, &message),
            message,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient field decoding
// ─────────────────────────────────────────────────────────────────────────────

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    fn parse(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_success_codes() {
        assert!(parse(json!({"data": {}})).is_success());
        assert!(parse(json!({"code": 0, "data": {}, "msg": "ok"})).is_success());
        assert!(parse(json!({"code": 200, "data": {"x": 1}})).is_success());
        assert!(parse(json!({"code": "200", "data": {}})).is_success());
        assert!(parse(json!({"code": null, "data": {}, "msg": null})).is_success());
    }

    #[test]
    fn test_top_level_failure() {
        let env = parse(json!({"code": 1070, "data": {}, "msg": "bundle not found"}));
        assert_eq!(
            env.failure(),
            Some(BusinessFailure {
                code: 1070,
                message: "bundle not found".into()
            })
        );
    }

    #[test]
    fn test_nested_error_wins() {
        let env = parse(json!({
            "code": 200,
            "data": {"err_code": 1081, "err_msg": "duplicate order"},
            "msg": "ok"
        }));
        let failure = env.failure().unwrap();
        assert_eq!(failure.code, 1081);
        assert_eq!(failure.message, "duplicate order");
    }

    #[test]
    fn test_falsy_nested_code_is_ignored() {
        assert!(parse(json!({"code": 0, "data": {"err_code": 0}})).is_success());
        assert!(parse(json!({"code": 0, "data": {"err_code": ""}})).is_success());
        assert!(parse(json!({"code": 0, "data": {"err_code": null}})).is_success());
    }

    #[test]
    fn test_message_alias() {
        let env = parse(json!({"code": 1003, "message": "bad params"}));
        assert_eq!(env.failure().unwrap().message, "bad params");
    }

    #[test]
    fn test_gateway_envelope_success_flags() {
        let ok: GatewayEnvelope =
            serde_json::from_value(json!({"result": {"result": "S"}, "data": {"a": 1}})).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!({"a": 1}));

        let ok: GatewayEnvelope =
            serde_json::from_value(json!({"result": {"result": "F", "code": 200}, "data": {}}))
                .unwrap();
        assert!(ok.into_result().is_ok());

        let plain: GatewayEnvelope =
            serde_json::from_value(json!({"code": 0, "data": {"b": 2}})).unwrap();
        assert_eq!(plain.into_result().unwrap(), json!({"b": 2}));
    }

    #[test]
    fn test_gateway_envelope_failure_is_classified() {
        let env: GatewayEnvelope = serde_json::from_value(json!({
            "result": {"result": "F", "code": "423", "message": "系统繁忙"},
            "data": null
        }))
        .unwrap();
        match env.into_result() {
            Err(ProviderError::Business { code, category, .. }) => {
                assert_eq!(code, "423");
                assert_eq!(category, ErrorCategory::Busy);
            }
            other => panic!("expected business error, got {:?}", other),
        }
    }
}
