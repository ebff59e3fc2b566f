//! Recursive schema comparison

use serde::Serialize;
use serde_json::Value;

use super::snapshot::SchemaDescriptor;

/// Entries of `a` that are missing from `b` or hold a different leaf value
///
/// Nested mappings are compared key by key and only kept when something
/// inside them differs. A nested mapping in `a` facing a leaf (or nothing) in
/// `b` is kept whole. Leaves, arrays included, compare with strict equality,
/// so `1`, `1.0` and `"1"` are all different.
///
/// Lists are never diffed element by element: a changed index column list
/// `["a", "b"]` -> `["a", "c"]` is reported as the whole new list, which is
/// what a migration needs to recreate the index.
pub fn diff(a: &SchemaDescriptor, b: &SchemaDescriptor) -> SchemaDescriptor {
    let mut out = SchemaDescriptor::new();
    for (key, value) in a {
        match (value, b.get(key)) {
            (Value::Object(inner), Some(Value::Object(other))) => {
                let nested = diff(inner, other);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Object(nested));
                }
            }
            (Value::Object(_), _) => {
                out.insert(key.clone(), value.clone());
            }
            (leaf, Some(other)) if leaf == other => {}
            (leaf, _) => {
                out.insert(key.clone(), leaf.clone());
            }
        }
    }
    out
}

/// Differences between the live schema and the saved snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    pub added_or_changed: SchemaDescriptor,
    pub removed: SchemaDescriptor,
}

impl SchemaDiff {
    pub fn compare(new: &SchemaDescriptor, old: &SchemaDescriptor) -> Self {
        SchemaDiff {
            added_or_changed: diff(new, old),
            removed: diff(old, new),
        }
    }

    /// No-op only when both directions are empty
    pub fn is_empty(&self) -> bool {
        self.added_or_changed.is_empty() && self.removed.is_empty()
    }
}
