//! Security-sensitive sinks the agent observed a request reach.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// A lexical token produced by the agent for sql/command sinks.
///
/// `start`/`stop` are byte offsets into the sink's query/command text; the
/// Checker uses `stop` to decide whether a payload feature crossed a token
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub stop: usize,
}

/// The discriminant for [`Sink::kind`]. Kept separate from the `Sink` enum so
/// callers can match on kind without destructuring payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SinkKind {
    Sql,
    Command,
    WriteFile,
    ReadFile,
    Directory,
    Include,
    Ssrf,
    FileUpload,
    Xxe,
    Eval,
    Deserialization,
    Ognl,
    Rename,
    Webdav,
}

/// One security-sensitive sink reached while handling a request.
///
/// Each variant carries only the attributes relevant to that kind.
/// `stack` is the optional call stack array the agent attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Sink {
    Sql {
        query: String,
        tokens: Vec<Token>,
        env: Option<String>,
        stack: Option<Vec<String>>,
    },
    Command {
        command: String,
        tokens: Vec<Token>,
        env: Option<String>,
        stack: Option<Vec<String>>,
    },
    WriteFile {
        realpath: String,
        stack: Option<Vec<String>>,
    },
    ReadFile {
        realpath: String,
        stack: Option<Vec<String>>,
    },
    Directory {
        realpath: String,
        stack: Option<Vec<String>>,
    },
    Include {
        url: String,
        stack: Option<Vec<String>>,
    },
    Ssrf {
        hostname: String,
        url: String,
        stack: Option<Vec<String>>,
    },
    FileUpload {
        dest_realpath: String,
        stack: Option<Vec<String>>,
    },
    Xxe {
        entity: String,
        stack: Option<Vec<String>>,
    },
    Eval {
        code: String,
        stack: Option<Vec<String>>,
    },
    Deserialization {
        class_name: Option<String>,
        stack: Option<Vec<String>>,
    },
    Ognl {
        expression: String,
        stack: Option<Vec<String>>,
    },
    Rename {
        src_realpath: String,
        dest_realpath: String,
        stack: Option<Vec<String>>,
    },
    Webdav {
        realpath: String,
        stack: Option<Vec<String>>,
    },
}

impl Sink {
    pub fn kind(&self) -> SinkKind {
        match self {
            Sink::Sql { .. } => SinkKind::Sql,
            Sink::Command { .. } => SinkKind::Command,
            Sink::WriteFile { .. } => SinkKind::WriteFile,
            Sink::ReadFile { .. } => SinkKind::ReadFile,
            Sink::Directory { .. } => SinkKind::Directory,
            Sink::Include { .. } => SinkKind::Include,
            Sink::Ssrf { .. } => SinkKind::Ssrf,
            Sink::FileUpload { .. } => SinkKind::FileUpload,
            Sink::Xxe { .. } => SinkKind::Xxe,
            Sink::Eval { .. } => SinkKind::Eval,
            Sink::Deserialization { .. } => SinkKind::Deserialization,
            Sink::Ognl { .. } => SinkKind::Ognl,
            Sink::Rename { .. } => SinkKind::Rename,
            Sink::Webdav { .. } => SinkKind::Webdav,
        }
    }

    pub fn stack(&self) -> Option<&[String]> {
        match self {
            Sink::Sql { stack, .. }
            | Sink::Command { stack, .. }
            | Sink::WriteFile { stack, .. }
            | Sink::ReadFile { stack, .. }
            | Sink::Directory { stack, .. }
            | Sink::Include { stack, .. }
            | Sink::Ssrf { stack, .. }
            | Sink::FileUpload { stack, .. }
            | Sink::Xxe { stack, .. }
            | Sink::Eval { stack, .. }
            | Sink::Deserialization { stack, .. }
            | Sink::Ognl { stack, .. }
            | Sink::Rename { stack, .. }
            | Sink::Webdav { stack, .. } => stack.as_deref(),
        }
    }

    /// Text/code field the Checker substring-matches for "others" kinds
    ///.
    pub fn feature_text(&self) -> &str {
        match self {
            Sink::Sql { query, .. } => query,
            Sink::Command { command, .. } => command,
            Sink::WriteFile { realpath, .. }
            | Sink::ReadFile { realpath, .. }
            | Sink::Directory { realpath, .. }
            | Sink::Webdav { realpath, .. } => realpath,
            Sink::Include { url, .. } => url,
            Sink::Ssrf { hostname, .. } => hostname,
            Sink::FileUpload { dest_realpath, .. } => dest_realpath,
            Sink::Xxe { entity, .. } => entity,
            Sink::Eval { code, .. } => code,
            Sink::Deserialization { class_name, .. } => class_name.as_deref().unwrap_or(""),
            Sink::Ognl { expression, .. } => expression,
            Sink::Rename { dest_realpath, .. } => dest_realpath,
        }
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        match self {
            Sink::Sql { tokens, .. } | Sink::Command { tokens, .. } => Some(tokens),
            _ => None,
        }
    }

    pub fn env(&self) -> Option<&str> {
        match self {
            Sink::Sql { env, .. } | Sink::Command { env, .. } => env.as_deref(),
            _ => None,
        }
    }
}

/// MD5 hex digest over the concatenation of a sequence of call-stack arrays,
/// each joined and separated with `\n` — used both for `Record::stack_hash`
/// (over every sink's stack, in sink order) and for the stack-hash embedded
/// in a [`crate::finding::VulnHook`] (over a single selected sink's stack).
pub fn hash_stacks<'a>(stacks: impl IntoIterator<Item = &'a [String]>) -> String {
    let mut hasher = Md5::new();
    for stack in stacks {
        hasher.update(stack.join("\n").as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_hash_is_order_sensitive() {
        let a = vec!["f1".to_string(), "f2".to_string()];
        let b = vec!["f2".to_string(), "f1".to_string()];
        assert_ne!(hash_stacks([a.as_slice()]), hash_stacks([b.as_slice()]));
    }

    #[test]
    fn stack_hash_deterministic() {
        let a = vec!["f1".to_string()];
        assert_eq!(hash_stacks([a.as_slice()]), hash_stacks([a.as_slice()]));
    }

    #[test]
    fn sink_kind_matches_variant() {
        let sink = Sink::Xxe {
            entity: "file:///etc/passwd".to_string(),
            stack: None,
        };
        assert_eq!(sink.kind(), SinkKind::Xxe);
        assert_eq!(sink.feature_text(), "file:///etc/passwd");
    }
}
