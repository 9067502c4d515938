//! Parsing and validation of tail request targets

use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

/// A validated tail request, decoded from an origin-form request target.
///
/// `file_path` is relative and lexically normal: joining it onto the serving
/// root cannot escape the root. Targets that would escape are rejected
/// outright rather than clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub file_path: PathBuf,
    pub n: Option<usize>,
    pub grep: Option<String>,
}

impl LogRequest {
    /// Parse `/path/to/file?n=<count>&grep=<substring>`. Returns `None` for
    /// anything malformed: a non-origin-form target, undecodable
    /// percent-escapes, a non-numeric or too-large `n`, or a path that
    /// climbs out of the root.
    pub fn parse(target: &str, max_n: usize) -> Option<LogRequest> {
        if !target.starts_with('/') {
            tracing::warn!(target, "request target is not origin-form");
            return None;
        }

        let (raw_path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let decoded_path = decode(raw_path)?;
        let file_path = normalize(&decoded_path)?;

        let mut n = None;
        let mut grep = None;
        for pair in raw_query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "n" if n.is_none() => {
                    let count: usize = match decode(value)?.parse() {
                        Ok(count) => count,
                        Err(_) => {
                            tracing::warn!(value, "rejecting non-numeric n parameter");
                            return None;
                        }
                    };
                    if count > max_n {
                        tracing::warn!(count, max_n, "rejecting oversized n parameter");
                        return None;
                    }
                    n = Some(count);
                }
                "grep" if grep.is_none() => {
                    grep = Some(decode(value)?.into_owned());
                }
                _ => {}
            }
        }

        Some(LogRequest {
            file_path,
            n,
            grep,
        })
    }
}

fn decode(raw: &str) -> Option<std::borrow::Cow<'_, str>> {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(raw, %err, "request component is not valid UTF-8");
            None
        }
    }
}

/// Collapse `.` and `..` segments lexically. `..` pops the last kept
/// segment; popping with nothing left means the path escapes the root and
/// the whole request is rejected.
fn normalize(decoded: &str) -> Option<PathBuf> {
    let mut kept: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(decoded).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(segment) => kept.push(segment),
            Component::ParentDir => {
                if kept.pop().is_none() {
                    tracing::warn!(decoded, "rejecting path escaping the root");
                    return None;
                }
            }
            Component::Prefix(_) => return None,
        }
    }
    Some(kept.into_iter().collect())
}
