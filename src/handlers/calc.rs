use axum::{Extension, Json, extract::rejection::JsonRejection, response::IntoResponse};
use serde_json::Value;
use tracing::debug;

use crate::admission::RequestContext;
use crate::error::CalcError;
use crate::models::{CalcResponse, OperandsRequest};

type Payload = Result<Json<Value>, JsonRejection>;

pub async fn home_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Calculator API is running!",
        "status": "online"
    }))
}

pub async fn add_handler(
    Extension(ctx): Extension<RequestContext>,
    payload: Payload,
) -> Result<Json<CalcResponse>, CalcError> {
    let (a, b) = operands(payload)?;
    respond(&ctx, "add", a + b)
}

pub async fn sub_handler(
    Extension(ctx): Extension<RequestContext>,
    payload: Payload,
) -> Result<Json<CalcResponse>, CalcError> {
    let (a, b) = operands(payload)?;
    respond(&ctx, "sub", a - b)
}

pub async fn mul_handler(
    Extension(ctx): Extension<RequestContext>,
    payload: Payload,
) -> Result<Json<CalcResponse>, CalcError> {
    let (a, b) = operands(payload)?;
    respond(&ctx, "mul", a * b)
}

pub async fn div_handler(
    Extension(ctx): Extension<RequestContext>,
    payload: Payload,
) -> Result<Json<CalcResponse>, CalcError> {
    let (a, b) = operands(payload)?;
    if b == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    respond(&ctx, "div", a / b)
}

// Unreadable JSON, an empty body, then missing or non-numeric operands
fn operands(payload: Payload) -> Result<(f64, f64), CalcError> {
    let Json(value) = payload.map_err(|_| CalcError::NotJson)?;

    let empty = match &value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(true) => false,
    };
    if empty {
        return Err(CalcError::BodyRequired);
    }

    // Only an object can carry the operand keys
    let request = match value {
        Value::Object(map) => OperandsRequest {
            first_number: map.get("first_number").cloned(),
            second_number: map.get("second_number").cloned(),
        },
        _ => OperandsRequest::default(),
    };
    request.operands()
}

fn respond(ctx: &RequestContext, op: &str, result: f64) -> Result<Json<CalcResponse>, CalcError> {
    debug!(op, identity = %ctx.identity, result, "computed");
    Ok(Json(CalcResponse { result }))
}
