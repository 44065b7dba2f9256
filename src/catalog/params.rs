//! Mapping between typed query parameters and the `params` JSON array.
//!
//! - tuples `(a, b)` ⇄ `[a, b]`
//! - `()` ⇄ `[]`
//! - any other single value `v` ⇄ `[v]`

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TramError;

pub(crate) fn encode_params<P: Serialize>(query: &str, params: &P) -> Result<Vec<Value>, TramError> {
    match serde_json::to_value(params).map_err(|e| TramError::codec(query, e))? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

pub(crate) fn decode_params<P: DeserializeOwned>(query: &str, params: Vec<Value>) -> Result<P, TramError> {
    if params.is_empty() {
        if let Ok(unit) = serde_json::from_value::<P>(Value::Null) {
            return Ok(unit);
        }
    }

    let single = if params.len() == 1 { params.first().cloned() } else { None };

    match serde_json::from_value::<P>(Value::Array(params)) {
        Ok(decoded) => Ok(decoded),
        Err(err) => match single {
            Some(value) => serde_json::from_value::<P>(value).map_err(|e| TramError::codec(query, e)),
            None => Err(TramError::codec(query, err)),
        },
    }
}
