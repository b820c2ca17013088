//! Default fingerprint function.
//!
//! `fingerprint(Record) -> String | None`. Returning `None` drops the
//! record (whitelist behavior) — callers treat `None` as "do not persist".

use iast_model::{sorted_keys, Record};
use md5::{Digest, Md5};

/// Produces the JSON structural skeleton of a value: a serialization of the
/// tree's *shape*, not its content. Keys are emitted in encounter order
/// (requires `serde_json`'s `preserve_order` feature upstream so object
/// iteration matches source document order, which this fingerprint's
/// determinism depends on).
pub fn json_skeleton(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "N|".to_string(),
        serde_json::Value::Bool(_) => "B|".to_string(),
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "I|".to_string()
            } else {
                "F|".to_string()
            }
        }
        serde_json::Value::String(_) => "S|".to_string(),
        serde_json::Value::Array(items) => {
            format!("L:{}|", items.len())
        }
        serde_json::Value::Object(map) => {
            let keys: Vec<String> = map.keys().map(|k| k.replace(',', "\\,")).collect();
            let mut out = format!("D:{}|", keys.join(","));
            for v in map.values() {
                out.push_str(&json_skeleton(v));
            }
            out
        }
    }
}

/// The default per-target-unique fingerprint function:
/// MD5 over the concatenation of
/// `{path | stack_hash | sorted form-keys | sorted query-keys |
/// JSON structural skeleton | sorted upload-field-names}`.
///
/// Never returns `None` — the default function has no whitelist — but the
/// signature matches the pluggable contract so callers can swap in a
/// stricter function without
/// changing call sites.
pub fn default_fingerprint(record: &Record) -> Option<String> {
    let form_keys = sorted_keys(&record.parameters).join(",");
    let query_keys = sorted_keys(&record.query).join(",");
    let skeleton = record
        .json_body
        .as_ref()
        .map(json_skeleton)
        .unwrap_or_default();
    let mut upload_names: Vec<&str> = record.files.iter().map(|f| f.name.as_str()).collect();
    upload_names.sort_unstable();
    let upload_names = upload_names.join(",");

    let input = format!(
        "{}|{}|{}|{}|{}|{}",
        record.path,
        record.stack_hash(),
        form_keys,
        query_keys,
        skeleton,
        upload_names
    );

    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// The pluggable fingerprint function signature.
pub type FingerprintFn = fn(&Record) -> Option<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_ignores_leaf_values() {
        let a = serde_json::json!({"id": 1, "name": "a"});
        let b = serde_json::json!({"id": 2, "name": "b"});
        assert_eq!(json_skeleton(&a), json_skeleton(&b));
    }

    #[test]
    fn skeleton_distinguishes_shapes() {
        let a = serde_json::json!({"id": 1});
        let b = serde_json::json!({"id": [1, 2]});
        assert_ne!(json_skeleton(&a), json_skeleton(&b));
    }

    #[test]
    fn skeleton_array_length_matters() {
        let a = serde_json::json!([1, 2]);
        let b = serde_json::json!([1, 2, 3]);
        assert_ne!(json_skeleton(&a), json_skeleton(&b));
    }

    #[test]
    fn fingerprint_ignores_parameter_values_same_keys() {
        let mut r1 = base_record();
        r1.parameters.insert("id".into(), vec!["1".into()]);
        let mut r2 = base_record();
        r2.parameters.insert("id".into(), vec!["2".into()]);

        assert_eq!(default_fingerprint(&r1), default_fingerprint(&r2));
    }

    #[test]
    fn fingerprint_differs_on_path() {
        let mut r1 = base_record();
        r1.path = "/a".into();
        let mut r2 = base_record();
        r2.path = "/b".into();
        assert_ne!(default_fingerprint(&r1), default_fingerprint(&r2));
    }

    fn base_record() -> Record {
        Record {
            request_id: "r".into(),
            scan_request_id: String::new(),
            host: "x.com".into(),
            port: 80,
            method: "get".into(),
            path: "/a".into(),
            raw_query: String::new(),
            query: Default::default(),
            headers: Default::default(),
            cookie: String::new(),
            json_body: None,
            raw_body: Vec::new(),
            content_type: String::new(),
            content_length: 0,
            parameters: Default::default(),
            files: Vec::new(),
            server: Default::default(),
            server_hostname: "h".into(),
            server_nic: Vec::new(),
            app_base_path: "/var/www".into(),
            sinks: Vec::new(),
        }
    }
}
