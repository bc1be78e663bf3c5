//! Recursive merge of structured values.
//!
//! Used to lay encoded source overrides over whatever an Application
//! source already carries without dropping unrelated data.
//!
//! - object onto object: union of keys, overlapping keys merged recursively
//! - array onto array: index by index; objects at the same index are merged,
//!   anything else is replaced by the incoming element; trailing existing
//!   elements beyond the incoming length are kept
//! - any other combination (including null on either side): incoming wins

use serde_json::Value;

/// Merge `src` onto `dst`, returning the combined value.
pub fn recursive_merge(dst: Value, src: Value) -> Value {
    match (dst, src) {
        (Value::Object(mut dst_map), Value::Object(src_map)) => {
            for (key, src_value) in src_map {
                match dst_map.get_mut(&key) {
                    Some(dst_value) => {
                        let existing = std::mem::take(dst_value);
                        *dst_value = recursive_merge(existing, src_value);
                    }
                    None => {
                        dst_map.insert(key, src_value);
                    }
                }
            }
            Value::Object(dst_map)
        }
        (Value::Array(mut dst_items), Value::Array(src_items)) => {
            for (i, src_item) in src_items.into_iter().enumerate() {
                if i < dst_items.len() {
                    let dst_item = std::mem::take(&mut dst_items[i]);
                    dst_items[i] = match (&dst_item, &src_item) {
                        (Value::Object(_), Value::Object(_)) => recursive_merge(dst_item, src_item),
                        _ => src_item,
                    };
                } else {
                    dst_items.push(src_item);
                }
            }
            Value::Array(dst_items)
        }
        (_, src) => src,
    }
}
