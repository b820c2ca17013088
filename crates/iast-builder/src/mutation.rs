//! Typed parameter mutations a plugin applies to a [`crate::draft::RequestDraft`]
//!.

/// One element of a JSON path: an object key or an array index. Empty paths
/// replace the JSON root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonPathElem {
    Key(String),
    Index(usize),
}

/// Which attribute of an uploaded file a [`Mutation::File`] rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileField {
    Filename,
    ContentType,
    Content,
}

/// A typed value for a file mutation. `Content` mutations must carry bytes
///.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// The seven param-types a mutation can target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Get { name: String, value: String },
    Post { name: String, value: String },
    Cookie { name: String, value: String },
    Header { name: String, value: String },
    Json { path: Vec<JsonPathElem>, value: serde_json::Value },
    File { index: usize, field: FileField, value: FileValue },
    Body { value: Vec<u8> },
}
