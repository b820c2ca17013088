//! The Request Builder, concatenation oracle, and post-replay Checker
//!.

#![forbid(unsafe_code)]

mod checker;
mod draft;
mod error;
mod mutation;
mod oracle;

pub use checker::{any_xxe_reached, feature_reached, is_php_upload, is_webroot_write};
pub use draft::RequestDraft;
pub use error::{BuilderError, BuilderResult};
pub use mutation::{FileField, FileValue, JsonPathElem, Mutation};
pub use oracle::param_affects_sink;
