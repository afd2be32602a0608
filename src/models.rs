use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CalcError;

// Calculator request body. Operands may arrive as numbers or numeric strings.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct OperandsRequest {
    #[serde(default)]
    pub first_number: Option<Value>,
    #[serde(default)]
    pub second_number: Option<Value>,
}

impl OperandsRequest {
    pub fn operands(&self) -> Result<(f64, f64), CalcError> {
        let missing: Vec<&'static str> = [
            ("first_number", &self.first_number),
            ("second_number", &self.second_number),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(CalcError::MissingKeys(missing));
        }

        let a = as_number(self.first_number.as_ref())?;
        let b = as_number(self.second_number.as_ref())?;
        Ok((a, b))
    }
}

fn as_number(value: Option<&Value>) -> Result<f64, CalcError> {
    match value {
        Some(Value::Number(n)) => n.as_f64().ok_or(CalcError::NotNumeric),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| CalcError::NotNumeric),
        _ => Err(CalcError::NotNumeric),
    }
}

// Calculator response
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CalcResponse {
    pub result: f64,
}

// Error body shared by every failure response
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            retry_after_seconds: None,
        }
    }
}
