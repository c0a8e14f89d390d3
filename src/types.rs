//! Core types for Bookshelf

use serde_json::{Map, Value};

/// A book as stored in the document database.
///
/// Records are open maps: whatever object the caller sends is persisted
/// verbatim, so no field is required and unknown fields are never dropped.
pub type Record = Map<String, Value>;

/// Timestamp written to `created_at` and `updated_at` on every create.
pub const FIXED_TIMESTAMP: &str = "2024-10-25T13:36:09.000000Z";

/// Value written to the `id` field on every create.
pub const FIXED_BOOK_ID: i64 = 2;

/// Keys echoed back in the create response.
pub const CREATED_FIELDS: [&str; 6] = [
    "title",
    "author",
    "published_at",
    "updated_at",
    "created_at",
    "id",
];

/// Overwrite the bookkeeping fields of a freshly created record.
pub fn stamp_created(record: &mut Record) {
    record.insert("created_at".into(), Value::from(FIXED_TIMESTAMP));
    record.insert("updated_at".into(), Value::from(FIXED_TIMESTAMP));
    record.insert("id".into(), Value::from(FIXED_BOOK_ID));
}

/// Project a record onto the fields reported after a create.
///
/// Missing fields come back as `null` rather than being omitted.
pub fn created_view(record: &Record) -> Record {
    CREATED_FIELDS
        .iter()
        .map(|key| {
            let value = record.get(*key).cloned().unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect()
}

/// Recursively overlay `patch` onto `target`.
///
/// Non-empty nested objects are merged key by key; every other value (empty
/// objects and arrays included) replaces what was there.
pub fn merge_into(target: &mut Record, patch: Record) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) if !incoming.is_empty() => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_stamp_overrides_caller_values() {
        let mut book = record(json!({
            "title": "Dune",
            "id": "abc",
            "created_at": "yesterday"
        }));
        stamp_created(&mut book);

        assert_eq!(book["id"], json!(2));
        assert_eq!(book["created_at"], json!(FIXED_TIMESTAMP));
        assert_eq!(book["updated_at"], json!(FIXED_TIMESTAMP));
        assert_eq!(book["title"], json!("Dune"));
    }

    #[test]
    fn test_created_view_keeps_six_keys() {
        let mut book = record(json!({"title": "A", "pages": 120}));
        stamp_created(&mut book);

        let view = created_view(&book);
        assert_eq!(view.len(), 6);
        assert!(view.get("pages").is_none());
        assert_eq!(view["author"], Value::Null);
        assert_eq!(view["id"], json!(2));
    }

    #[test]
    fn test_merge_is_recursive() {
        let mut book = record(json!({
            "title": "Old",
            "meta": {"isbn": "123", "pages": 10},
            "tags": ["a", "b"]
        }));
        merge_into(
            &mut book,
            record(json!({"title": "New", "meta": {"pages": 12}, "tags": ["c"]})),
        );

        assert_eq!(
            Value::Object(book),
            json!({
                "title": "New",
                "meta": {"isbn": "123", "pages": 12},
                "tags": ["c"]
            })
        );
    }

    #[test]
    fn test_merge_empty_object_replaces() {
        let mut book = record(json!({"meta": {"isbn": "123"}, "title": "Old"}));
        merge_into(&mut book, record(json!({"meta": {}})));

        assert_eq!(Value::Object(book), json!({"meta": {}, "title": "Old"}));
    }
}
