//! `set_config`'s patch schema and validation.

use crate::error::{TargetError, TargetResult};
use iast_model::RateBounds;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A partial update to a [`iast_model::TargetConfig`]. Fields left `None`
/// are unchanged. `upstream_proxy: Some(None)` clears the proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub enabled_plugins: Option<HashMap<String, bool>>,
    pub rate_bounds: Option<RateBounds>,
    pub skip_url_regex: Option<String>,
    pub upstream_proxy: Option<Option<String>>,
}

/// Validates a patch against `set_config`'s rules: rate bounds non-negative
/// with min ≤ max, skip regex must compile, proxy URL must be http/https.
pub fn validate_patch(patch: &ConfigPatch) -> TargetResult<()> {
    if let Some(rate_bounds) = &patch.rate_bounds {
        if !rate_bounds.is_valid() {
            return Err(TargetError::InvalidConfig(
                "rate bounds must satisfy min_interval_ms <= max_interval_ms".into(),
            ));
        }
    }
    if let Some(pattern) = &patch.skip_url_regex {
        if let Err(e) = Regex::new(pattern) {
            return Err(TargetError::InvalidConfig(format!("skip url regex does not compile: {e}")));
        }
    }
    if let Some(Some(proxy)) = &patch.upstream_proxy {
        if !(proxy.starts_with("http://") || proxy.starts_with("https://")) {
            return Err(TargetError::InvalidConfig("proxy url must be http or https".into()));
        }
    }
    Ok(())
}
