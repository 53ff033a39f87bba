//! Response payload plumbing shared by the Sol-Ark endpoints.

use serde_json::{Map, Value};

use super::error::Error;

/// One fetch cycle's worth of raw plant data. Different plants and firmware
/// versions populate different key subsets, so nothing here has a schema.
pub type RawPlantRecord = Map<String, Value>;

/// Application-level envelope check: a non-zero, non-null `code` means the
/// request failed regardless of the HTTP status.
pub(super) fn check_envelope(body: &Value, endpoint: &str) -> Result<(), Error> {
    let Some(code) = body.get("code") else {
        return Ok(());
    };
    let failed = match code {
        Value::Null => false,
        Value::Number(number) => number.as_f64() != Some(0.0),
        Value::String(code) => code != "0",
        _ => true,
    };
    if failed {
        let message = body.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(Error::Api(format!("{endpoint}: {message} (code={code})")));
    }
    Ok(())
}

/// Whether the body carries an explicit `success:false` / `Success:false`
/// flag. Some portal versions report failures this way under HTTP 200.
pub(super) fn is_explicit_failure(body: &Value) -> bool {
    body.as_object()
        .and_then(|object| first_of(object, &["success", "Success"]))
        .and_then(Value::as_bool)
        == Some(false)
}

/// The failure message, under whichever field the portal felt like using.
pub(super) fn vendor_message<'a>(body: &'a Value, default: &'a str) -> &'a str {
    body.as_object()
        .and_then(|object| first_of(object, &["message", "Message", "msg", "error"]))
        .and_then(Value::as_str)
        .unwrap_or(default)
}

/// The classic endpoint wraps the plant record in `data`, `Data`, `result`,
/// or not at all. `None` means there is no usable payload.
pub(super) fn plant_payload(body: Value) -> Option<RawPlantRecord> {
    let Value::Object(mut envelope) = body else {
        return None;
    };
    let payload = match ["data", "Data", "result"].iter().find(|key| envelope.contains_key(**key)) {
        Some(key) => match envelope.remove(*key) {
            Some(Value::Object(payload)) => payload,
            _ => return None,
        },
        None => envelope,
    };
    (!payload.is_empty()).then_some(payload)
}

/// The device list moved between `infos`, `list`, and `records` across
/// portal versions; the first non-empty one wins.
pub(super) fn first_inverter(body: &Value) -> Option<&Map<String, Value>> {
    let data = body.get("data")?.as_object()?;
    ["infos", "list", "records"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array).filter(|list| !list.is_empty()))?
        .first()?
        .as_object()
}

/// Unwraps a live-telemetry response: the `data` object when it is one,
/// otherwise the body itself, otherwise nothing.
pub(super) fn live_record(body: Value) -> RawPlantRecord {
    match body {
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Object(data)) if !data.is_empty() => data,
            _ => envelope,
        },
        _ => RawPlantRecord::new(),
    }
}

/// First present key wins. Shape drift across firmware versions is handled
/// by explicit ordered key lists instead of schema variants.
pub(super) fn first_of<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}
