//! Document field maps and write sentinels.
//!
//! Writers cannot know the commit time, and a merge cannot express "remove
//! this key" with plain JSON.  Both are encoded as sentinel objects that the
//! store resolves when the write is applied.

use serde_json::{json, Map, Value};

/// The field map of one document.
pub type Fields = Map<String, Value>;

const SENTINEL_KEY: &str = "__parley_sentinel";
const SERVER_TIMESTAMP: &str = "serverTimestamp";
const DELETE_FIELD: &str = "deleteField";

/// Placeholder replaced by the commit time (epoch millis).
pub fn server_timestamp() -> Value {
    json!({ SENTINEL_KEY: SERVER_TIMESTAMP })
}

/// Placeholder that removes the field it is assigned to in a merge or update.
pub fn delete_field() -> Value {
    json!({ SENTINEL_KEY: DELETE_FIELD })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentinel {
    ServerTimestamp,
    Delete,
}

fn sentinel(value: &Value) -> Option<Sentinel> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get(SENTINEL_KEY)?.as_str()? {
        SERVER_TIMESTAMP => Some(Sentinel::ServerTimestamp),
        DELETE_FIELD => Some(Sentinel::Delete),
        _ => None,
    }
}

/// Resolve sentinels for a full (non-merge) write.  Delete sentinels drop
/// their field.
pub(crate) fn resolve(fields: Fields, now: i64) -> Fields {
    let mut out = Fields::new();
    for (key, value) in fields {
        if let Some(v) = resolve_value(value, now) {
            out.insert(key, v);
        }
    }
    out
}

fn resolve_value(value: Value, now: i64) -> Option<Value> {
    match sentinel(&value) {
        Some(Sentinel::ServerTimestamp) => Some(Value::from(now)),
        Some(Sentinel::Delete) => None,
        None => match value {
            Value::Object(map) => Some(Value::Object(resolve(map, now))),
            other => Some(other),
        },
    }
}

/// Deep-merge `incoming` into `existing`.  Nested maps merge key by key,
/// everything else is overwritten.
pub(crate) fn merge_into(existing: &mut Fields, incoming: Fields, now: i64) {
    for (key, value) in incoming {
        match sentinel(&value) {
            Some(Sentinel::Delete) => {
                existing.remove(&key);
            }
            Some(Sentinel::ServerTimestamp) => {
                existing.insert(key, Value::from(now));
            }
            None => match value {
                Value::Object(map) => match existing.get_mut(&key) {
                    Some(Value::Object(inner)) => merge_into(inner, map, now),
                    _ => {
                        existing.insert(key, Value::Object(resolve(map, now)));
                    }
                },
                other => {
                    existing.insert(key, other);
                }
            },
        }
    }
}

/// Replace the named top-level fields of `existing`.
pub(crate) fn update_fields(existing: &mut Fields, incoming: Fields, now: i64) {
    for (key, value) in incoming {
        match resolve_value(value, now) {
            Some(v) => {
                existing.insert(key, v);
            }
            None => {
                existing.remove(&key);
            }
        }
    }
}
