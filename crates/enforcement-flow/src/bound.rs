//! Bounds array sizes in a projected search document. Arrays longer than
//! `max_array_size` are truncated in place; the enclosing object gets a
//! `"<key>__truncated": true` marker so a reader can tell the field was cut.

use serde_json::Value;

pub fn bound_arrays(value: &mut Value, max_array_size: usize) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                bound_arrays(item, max_array_size);
            }
            if items.len() > max_array_size {
                items.truncate(max_array_size);
            }
        }
        Value::Object(map) => {
            let mut truncated_keys = Vec::new();
            for (key, child) in map.iter_mut() {
                if matches!(child, Value::Array(arr) if arr.len() > max_array_size) {
                    truncated_keys.push(key.clone());
                }
                bound_arrays(child, max_array_size);
            }
            for key in truncated_keys {
                map.insert(format!("{key}__truncated"), Value::Bool(true));
            }
        }
        _ => {}
    }
}
