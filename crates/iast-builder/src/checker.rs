//! The post-replay Checker: given a correlated Record's sink
//! and the payload feature a plugin injected, decide whether the feature
//! actually reached and altered the intended sink.

use iast_model::Sink;

/// Token-injection check for sql/command sinks: the feature must land inside
/// a token span that extends past its own length, meaning it altered lexing
/// rather than being absorbed verbatim into one existing token.
fn token_injection_reached(text: &str, feature: &str, sink: &Sink) -> bool {
    let Some(pos) = text.find(feature) else {
        return env_reached(sink, feature);
    };
    let feature_end = pos + feature.len();
    let tokens = sink.tokens().unwrap_or(&[]);

    let Some(first) = tokens.iter().position(|t| t.stop > pos) else {
        return env_reached(sink, feature);
    };

    if tokens[first].stop <= feature_end && tokens.len() - first > 1 {
        return true;
    }
    env_reached(sink, feature)
}

fn env_reached(sink: &Sink, feature: &str) -> bool {
    sink.env().is_some_and(|env| env.split('=').any(|entry| entry == feature))
}

/// `true` iff `feature` reached the sink's security-sensitive attribute,
/// per this sink kind's checker rule.
pub fn feature_reached(sink: &Sink, feature: &str) -> bool {
    match sink {
        Sink::Sql { query, .. } => token_injection_reached(query, feature, sink),
        Sink::Command { command, .. } => token_injection_reached(command, feature, sink),
        Sink::ReadFile { realpath, .. } | Sink::WriteFile { realpath, .. } | Sink::Directory { realpath, .. } => {
            realpath.ends_with(feature)
        }
        Sink::Include { url, .. } => url.ends_with(feature),
        Sink::Ssrf { hostname, .. } => hostname == feature,
        Sink::Eval { code, .. } => code.contains(feature),
        Sink::Xxe { entity, .. } => entity == feature,
        other => other.feature_text().contains(feature),
    }
}

/// True iff any sink in `sinks` is an `xxe` sink whose entity equals
/// `feature`.
pub fn any_xxe_reached<'a>(sinks: impl IntoIterator<Item = &'a Sink>, feature: &str) -> bool {
    sinks.into_iter().any(|s| matches!(s, Sink::Xxe { entity, .. } if entity == feature))
}

/// A write whose realpath both contains the feature and falls under the
/// application's webroot.
pub fn is_webroot_write(sink: &Sink, feature: &str, app_base_path: &str) -> bool {
    matches!(sink, Sink::WriteFile { realpath, .. }
        if realpath.contains(feature) && realpath.starts_with(app_base_path))
}

/// A file-upload sink whose destination both ends with the feature and
/// falls under the application's webroot.
pub fn is_php_upload(sink: &Sink, feature: &str, app_base_path: &str) -> bool {
    matches!(sink, Sink::FileUpload { dest_realpath, .. }
        if dest_realpath.ends_with(feature) && dest_realpath.starts_with(app_base_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iast_model::Token;

    fn token(text: &str, start: usize, stop: usize) -> Token {
        Token { text: text.to_string(), start, stop }
    }

    #[test]
    fn sql_injection_detected_when_feature_spans_tokens() {
        // query became: select * from t where id = 1'openrasp
        let sink = Sink::Sql {
            query: "select * from t where id = 1'openrasp".into(),
            tokens: vec![
                token("1", 28, 29),
                token("'openrasp", 29, 38),
            ],
            env: None,
            stack: None,
        };
        assert!(token_injection_reached(
            "select * from t where id = 1'openrasp",
            "1'openrasp",
            &sink
        ));
    }

    #[test]
    fn sql_not_injected_when_feature_absorbed_in_one_token() {
        let sink = Sink::Sql {
            query: "select * from t where name = 'safe-value'".into(),
            tokens: vec![token("'safe-value'", 30, 42)],
            env: None,
            stack: None,
        };
        assert!(!feature_reached(&sink, "safe-value"));
    }

    #[test]
    fn sql_not_injected_when_absorbed_token_is_followed_by_more_clauses() {
        // query: name = 'safe-value' order by id
        // The payload is fully absorbed into the quoted literal token; the
        // trailing `order by id` tokens must not cause a false positive.
        let sink = Sink::Sql {
            query: "name = 'safe-value' order by id".into(),
            tokens: vec![
                token("name", 0, 4),
                token("=", 5, 6),
                token("'safe-value'", 7, 19),
                token("order", 20, 25),
                token("by", 26, 28),
                token("id", 29, 31),
            ],
            env: None,
            stack: None,
        };
        assert!(!token_injection_reached("name = 'safe-value' order by id", "safe-value", &sink));
    }

    #[test]
    fn readfile_matches_path_suffix() {
        let sink = Sink::ReadFile { realpath: "/etc/passwd".into(), stack: None };
        assert!(feature_reached(&sink, "/etc/passwd"));
    }

    #[test]
    fn webroot_write_requires_both_substring_and_base_path_prefix() {
        let sink = Sink::WriteFile { realpath: "/var/www/html/shell.jsp".into(), stack: None };
        assert!(is_webroot_write(&sink, "shell.jsp", "/var/www/html"));
        assert!(!is_webroot_write(&sink, "shell.jsp", "/opt/other"));
    }
}
