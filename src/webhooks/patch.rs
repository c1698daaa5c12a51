//! JSON Patch (RFC6902) primitives shared by the Pod and Service mutators.
//!
//! Paths are JSON Pointers (RFC6901). Any segment taken from user data, such
//! as an annotation key, must go through [`escape_json_pointer`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the annotations map in object metadata
pub const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// Patch operation kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Add,
    Replace,
}

/// A single RFC6902 patch operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: Op,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: Op::Add,
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: Op::Replace,
            path: path.into(),
            value,
        }
    }
}

/// Escape a single JSON Pointer reference token.
///
/// `~` must become `~0` before `/` becomes `~1`, otherwise an escaped slash
/// would be escaped a second time.
pub fn escape_json_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Append `items` to the array at `path`.
///
/// An empty or missing array is created whole with a single `add`. A
/// non-empty array gets one `add` per item at `path/-`, leaving the
/// existing elements out of the patch.
pub fn append_to_list<T: Serialize>(
    existing_len: usize,
    items: &[T],
    path: &str,
) -> Result<Vec<PatchOperation>, serde_json::Error> {
    if existing_len == 0 {
        return Ok(vec![PatchOperation::add(path, serde_json::to_value(items)?)]);
    }

    items
        .iter()
        .map(|item| Ok(PatchOperation::add(format!("{path}/-"), serde_json::to_value(item)?)))
        .collect()
}

/// Set annotation `updates` on an object whose current annotations are `existing`.
///
/// Without any existing annotations the whole map is added in one
/// operation. Otherwise each key is added when absent and replaced when
/// present.
pub fn set_annotations(
    existing: Option<&BTreeMap<String, String>>,
    updates: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    let existing = match existing {
        Some(map) if !map.is_empty() => map,
        _ => {
            let map: Map<String, Value> = updates
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            return vec![PatchOperation::add(ANNOTATIONS_PATH, Value::Object(map))];
        }
    };

    updates
        .iter()
        .map(|(key, value)| {
            let path = format!("{ANNOTATIONS_PATH}/{}", escape_json_pointer(key));
            let value = Value::String(value.clone());
            if existing.contains_key(key) {
                PatchOperation::replace(path, value)
            } else {
                PatchOperation::add(path, value)
            }
        })
        .collect()
}

/// Convert operations into the `json_patch` representation expected by
/// `AdmissionResponse::with_patch`
pub fn to_json_patch(ops: &[PatchOperation]) -> Result<json_patch::Patch, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(ops)?)
}
