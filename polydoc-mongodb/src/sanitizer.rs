//! Field-name escaping for MongoDB compatibility.
//!
//! MongoDB rejects stored field names containing dots or a leading dollar sign, both of
//! which are query syntax. Stored keys are escaped on the way in and restored on the way
//! out. Values are stored untouched, and the pointer keys `$ref`, `$id` and `$db` are
//! left alone so the server recognizes stored pointers.

use bson::{Bson, Document};

/// Escapes and restores document keys.
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    const POINTER_KEYS: [&'static str; 3] = ["$ref", "$id", "$db"];

    /// Recursively escapes the keys of `document` and of every nested document.
    pub(crate) fn sanitize_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(key, value)| (Self::sanitize_key(key), Self::sanitize_value(value)))
            .collect()
    }

    fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.iter().map(Self::sanitize_value).collect()),
            Bson::Document(nested) => Bson::Document(Self::sanitize_document(nested)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_key(key: &str) -> String {
        if Self::POINTER_KEYS.contains(&key) {
            return key.to_string();
        }

        let mut sanitized = key.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Inverse of [`KeySanitizer::sanitize_document`].
    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::restore_key(&key), Self::restore_value(value)))
            .collect()
    }

    fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.into_iter().map(Self::restore_value).collect()),
            Bson::Document(nested) => Bson::Document(Self::restore_document(nested)),
            other => other,
        }
    }

    pub(crate) fn restore_key(key: &str) -> String {
        let mut restored = key.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}
