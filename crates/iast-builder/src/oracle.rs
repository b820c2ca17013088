//! The concatenation oracle: given a
//! candidate parameter value and a sink, decide whether the value is
//! observable inside that sink. Used by plugins to pick worthwhile
//! parameters to attack before spending a replay on them.

use iast_model::Sink;

/// Beyond this product of lengths, computing the full longest-common-substring
/// table is not worth it; fall back to a plain substring check.
const LCS_SHORT_CIRCUIT: usize = 10_000;

pub fn param_affects_sink(value: &str, sink: &Sink) -> bool {
    if value.is_empty() {
        return false;
    }
    match sink {
        Sink::Sql { .. } | Sink::Command { .. } => affects_query_like(value, sink),
        Sink::Ssrf { url, .. } | Sink::Include { url, .. } => affects_url(value, url),
        Sink::Directory { realpath, .. } | Sink::ReadFile { realpath, .. } | Sink::WriteFile { realpath, .. } => {
            realpath.contains(value)
        }
        other => other.feature_text().contains(value),
    }
}

fn affects_query_like(value: &str, sink: &Sink) -> bool {
    let tokens = sink.tokens().unwrap_or(&[]);
    for token in tokens {
        if token.text.contains(value) || value.contains(token.text.as_str()) {
            return true;
        }
    }

    for run in split_word_runs(value) {
        if run.len() <= 1 {
            continue;
        }
        for token in tokens {
            if run.len() * token.text.len() > LCS_SHORT_CIRCUIT {
                if token.text.contains(run) {
                    return true;
                }
                continue;
            }
            if longest_common_substring(run, &token.text) > 3 {
                return true;
            }
        }
    }

    if let Some(env) = sink.env() {
        for entry in env.split('=') {
            if entry.contains(value) || value.contains(entry) {
                return true;
            }
        }
    }

    false
}

fn affects_url(value: &str, url_str: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url_str) {
        if parsed.scheme() == value || parsed.path() == value {
            return true;
        }
        if parsed.host_str() == Some(value) {
            return true;
        }
        if parsed.query() == Some(value) {
            return true;
        }
        if value.len() > 8 {
            if let Some(segments) = parsed.path_segments() {
                if segments.into_iter().any(|seg| seg == value) {
                    return true;
                }
            }
        }
    }
    url_str.contains(value)
}

/// Splits `s` into runs of word characters (`[A-Za-z0-9_]`) alternating with
/// runs of everything else, mirroring a `\w+|\W+` tokenization.
fn split_word_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut in_word = bytes.first().is_some_and(|b| is_word_byte(*b));
    for (i, b) in bytes.iter().enumerate() {
        let word = is_word_byte(*b);
        if word != in_word {
            runs.push(&s[start..i]);
            start = i;
            in_word = word;
        }
    }
    if start < s.len() {
        runs.push(&s[start..]);
    }
    runs
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the longest common substring between `a` and `b`, via a
/// single-row dynamic-programming sweep.
fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for ai in &a {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, bj) in b.iter().enumerate() {
            if ai == bj {
                cur[j + 1] = prev[j] + 1;
                best = best.max(cur[j + 1]);
            }
        }
        prev = cur;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use iast_model::Token;

    fn token(text: &str, start: usize, stop: usize) -> Token {
        Token { text: text.to_string(), start, stop }
    }

    #[test]
    fn substring_match_against_sql_token() {
        let sink = Sink::Sql {
            query: "select * from users where id = '1'".into(),
            tokens: vec![token("'1'", 32, 35)],
            env: None,
            stack: None,
        };
        assert!(param_affects_sink("1", &sink));
    }

    #[test]
    fn lcs_match_catches_partial_overlap() {
        let sink = Sink::Command {
            command: "ls /tmp/uploads123".into(),
            tokens: vec![token("/tmp/uploads123", 3, 18)],
            env: None,
            stack: None,
        };
        assert!(param_affects_sink("uploads123extra", &sink));
    }

    #[test]
    fn unrelated_value_does_not_match() {
        let sink = Sink::Sql {
            query: "select * from users".into(),
            tokens: vec![token("users", 14, 19)],
            env: None,
            stack: None,
        };
        assert!(!param_affects_sink("zzz_completely_unrelated_zzz", &sink));
    }

    #[test]
    fn ssrf_matches_hostname() {
        let sink = Sink::Ssrf {
            hostname: "internal.example".into(),
            url: "http://internal.example/admin".into(),
            stack: None,
        };
        assert!(param_affects_sink("internal.example", &sink));
    }

    #[test]
    fn directory_matches_substring_of_realpath() {
        let sink = Sink::Directory { realpath: "/var/www/uploads/x".into(), stack: None };
        assert!(param_affects_sink("uploads", &sink));
    }
}
