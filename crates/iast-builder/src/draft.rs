//! Constructs a concrete, mutable HTTP replay from a [`Record`], preserving
//! everything else bit-identical to what the application saw.

use crate::error::{BuilderError, BuilderResult};
use crate::mutation::{FileField, FileValue, JsonPathElem, Mutation};
use iast_model::{HeaderMap, MultiMap, Record, UploadedFile};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use uuid::Uuid;

/// Bodies on unsupported content-types at or above this size are refused
/// rather than carried as an opaque blob.
const MAX_OPAQUE_BODY: usize = 4096;

fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

/// A mutable in-progress replay, seeded from a [`Record`] and refined by a
/// sequence of [`Mutation`]s before being sent.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub method: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: MultiMap,
    pub form: MultiMap,
    pub json: Option<serde_json::Value>,
    pub raw_body: Vec<u8>,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
    pub scan_request_id: String,
}

impl RequestDraft {
    /// Seeds a draft from an observed or previously-correlated [`Record`].
    /// Drops `content-length` (recomputed on send) and the `cookie` header
    /// (cookies are tracked separately and re-emitted on render).
    pub fn from_record(record: &Record) -> BuilderResult<Self> {
        let content_type = record.content_type.to_ascii_lowercase();
        let is_supported = content_type.contains("json") || content_type.contains("form-urlencoded");
        if !is_supported && record.raw_body.len() >= MAX_OPAQUE_BODY {
            return Err(BuilderError::UnsupportedContentType(record.content_type.clone()));
        }

        let mut headers = record.headers.clone();
        headers.remove("content-length");
        headers.remove("cookie");

        let cookies = parse_cookie_header(&record.cookie);

        Ok(Self {
            method: record.method.clone(),
            host: record.host.clone(),
            port: record.port,
            path: record.path.clone(),
            query: record.query.clone(),
            form: record.parameters.clone(),
            json: record.json_body.clone(),
            raw_body: record.raw_body.clone(),
            headers,
            cookies,
            files: record.files.clone(),
            scan_request_id: String::new(),
        })
    }

    /// Applies one typed mutation in place.
    pub fn apply(&mut self, mutation: Mutation) -> BuilderResult<()> {
        match mutation {
            Mutation::Get { name, value } => {
                self.query.insert(name, vec![value]);
            }
            Mutation::Post { name, value } => {
                self.form.insert(name, vec![value]);
            }
            Mutation::Cookie { name, value } => {
                let value = percent_encode(&value);
                set_kv(&mut self.cookies, name, value);
            }
            Mutation::Header { name, value } => {
                let value = percent_encode(&value);
                self.headers.remove(&name);
                self.headers.insert(name, value);
            }
            Mutation::Json { path, value } => {
                let root = self.json.get_or_insert(serde_json::Value::Null);
                set_json_path(root, &path, value)?;
            }
            Mutation::File { index, field, value } => {
                self.apply_file_mutation(index, field, value)?;
            }
            Mutation::Body { value } => {
                self.raw_body = value;
                self.json = None;
            }
        }
        Ok(())
    }

    fn apply_file_mutation(&mut self, index: usize, field: FileField, value: FileValue) -> BuilderResult<()> {
        if index > self.files.len() {
            return Err(BuilderError::FileIndexOutOfRange(index, self.files.len()));
        }
        if index == self.files.len() {
            self.files.push(UploadedFile {
                name: String::new(),
                filename: String::new(),
                content: Vec::new(),
                content_type: String::new(),
            });
        }
        let file = &mut self.files[index];
        match (field, value) {
            (FileField::Filename, FileValue::Text(t)) => file.filename = t,
            (FileField::ContentType, FileValue::Text(t)) => file.content_type = t,
            (FileField::Content, FileValue::Bytes(b)) => file.content = b,
            (FileField::Content, FileValue::Text(_)) => return Err(BuilderError::FileContentNotBytes),
            (FileField::Filename | FileField::ContentType, FileValue::Bytes(_)) => {
                return Err(BuilderError::FileContentNotBytes)
            }
        }
        Ok(())
    }

    /// Assigns a fresh `<inbox>-<uuid>` scan_request_id and injects it into
    /// the `scan-request-id` header, returning the assigned id.
    pub fn assign_scan_request_id(&mut self, inbox_id: &str) -> String {
        let id = format!("{inbox_id}-{}", Uuid::new_v4());
        self.headers.remove("scan-request-id");
        self.headers.insert("scan-request-id", id.clone());
        self.scan_request_id = id.clone();
        id
    }

    pub fn cookie_header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn query_string(&self) -> String {
        let mut pairs = Vec::new();
        let mut keys: Vec<&String> = self.query.keys().collect();
        keys.sort();
        for key in keys {
            for value in &self.query[key] {
                pairs.push(format!("{}={}", percent_encode(key), percent_encode(value)));
            }
        }
        pairs.join("&")
    }

    /// Body bytes to send, preferring JSON, then form-encoded data, then the
    /// raw opaque body carried over from the original Record.
    pub fn body_bytes(&self) -> Vec<u8> {
        if let Some(json) = &self.json {
            return serde_json::to_vec(json).unwrap_or_default();
        }
        if !self.form.is_empty() {
            let mut keys: Vec<&String> = self.form.keys().collect();
            keys.sort();
            let pairs: Vec<String> = keys
                .into_iter()
                .flat_map(|k| {
                    self.form[k]
                        .iter()
                        .map(move |v| format!("{}={}", percent_encode(k), percent_encode(v)))
                })
                .collect();
            return pairs.join("&").into_bytes();
        }
        self.raw_body.clone()
    }

    /// Renders the draft as a raw wire-format HTTP request string, for
    /// inclusion in findings.
    pub fn render_wire(&self) -> String {
        let query = self.query_string();
        let request_line = if query.is_empty() {
            format!("{} {} HTTP/1.1", self.method.to_ascii_uppercase(), self.path)
        } else {
            format!("{} {}?{} HTTP/1.1", self.method.to_ascii_uppercase(), self.path, query)
        };

        let mut lines = vec![request_line, format!("Host: {}:{}", self.host, self.port)];
        for (name, values) in self.headers.iter() {
            for value in values {
                lines.push(format!("{name}: {value}"));
            }
        }
        if !self.cookies.is_empty() {
            lines.push(format!("Cookie: {}", self.cookie_header_value()));
        }

        let body = self.body_bytes();
        lines.push(format!("Content-Length: {}", body.len()));
        lines.push(String::new());
        let body_text = String::from_utf8_lossy(&body);
        format!("{}\r\n{}", lines.join("\r\n"), body_text)
    }
}

fn set_kv(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    if let Some(entry) = pairs.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        pairs.push((key, value));
    }
}

fn parse_cookie_header(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let mut split = part.splitn(2, '=');
            let k = split.next()?.to_string();
            let v = split.next().unwrap_or("").to_string();
            Some((k, v))
        })
        .collect()
}

fn set_json_path(root: &mut serde_json::Value, path: &[JsonPathElem], value: serde_json::Value) -> BuilderResult<()> {
    let Some((head, rest)) = path.split_first() else {
        *root = value;
        return Ok(());
    };

    match head {
        JsonPathElem::Key(key) => {
            if !root.is_object() {
                *root = serde_json::Value::Object(Default::default());
            }
            let obj = root.as_object_mut().ok_or(BuilderError::InvalidJsonPath)?;
            let slot = obj.entry(key.clone()).or_insert(serde_json::Value::Null);
            set_json_path(slot, rest, value)
        }
        JsonPathElem::Index(idx) => {
            if !root.is_array() {
                *root = serde_json::Value::Array(Vec::new());
            }
            let arr = root.as_array_mut().ok_or(BuilderError::InvalidJsonPath)?;
            if *idx > arr.len() {
                return Err(BuilderError::InvalidJsonPath);
            }
            if *idx == arr.len() {
                arr.push(serde_json::Value::Null);
            }
            set_json_path(&mut arr[*idx], rest, value)
        }
    }
}
