//! Turns a route pattern string into the sequence of segments the trie
//! builder walks.

use crate::error::PatternError;
use std::sync::Arc;

/// One parsed piece of a route pattern.
#[derive(Debug, Clone)]
pub(crate) enum Segment {
    /// A literal run of bytes between wild segments.
    Static(String),
    /// `{key}` -- captures a non-`/` run up to `tail`.
    Param { key: Arc<str>, tail: u8 },
    /// `{key:source}` -- like `Param`, but the capture must additionally
    /// match the (already-anchored) regex `source`.
    Regex {
        key: Arc<str>,
        source: String,
        tail: u8,
    },
    /// A trailing `*`, only ever the final segment of a pattern.
    CatchAll,
}

/// Scans `pattern` starting at byte offset `start`, returning the next
/// segment and the offset immediately past it, or `None` once the pattern is
/// exhausted.
pub(crate) fn next_segment(
    pattern: &str,
    start: usize,
) -> Result<Option<(Segment, usize)>, PatternError> {
    let rest = &pattern[start..];
    if rest.is_empty() {
        return Ok(None);
    }

    let brace = rest.find('{');
    let star = rest.find('*');

    let star_is_next = match (brace, star) {
        (Some(b), Some(s)) => s < b,
        (None, Some(_)) => true,
        _ => false,
    };

    if star_is_next {
        let s = star.unwrap();
        if s != rest.len() - 1 {
            return Err(PatternError::WildcardPosition(pattern.to_owned()));
        }
        if s > 0 {
            return Ok(Some((Segment::Static(rest[..s].to_owned()), start + s)));
        }
        return Ok(Some((Segment::CatchAll, pattern.len())));
    }

    match brace {
        None => Ok(Some((Segment::Static(rest.to_owned()), pattern.len()))),
        Some(0) => {
            let close = find_matching_brace(rest)
                .ok_or_else(|| PatternError::UnclosedParam(pattern.to_owned()))?;
            let inner = &rest[1..close];
            let (key_part, regex_part) = match inner.find(':') {
                Some(i) => (&inner[..i], Some(&inner[i + 1..])),
                None => (inner, None),
            };
            if key_part.is_empty() {
                return Err(PatternError::UnclosedParam(pattern.to_owned()));
            }
            let key: Arc<str> = Arc::from(key_part);
            let after = start + close + 1;
            let tail = pattern.as_bytes().get(after).copied().unwrap_or(b'/');

            match regex_part {
                Some(source) => {
                    let anchored = anchor(source);
                    regex::Regex::new(&anchored).map_err(|e| {
                        PatternError::InvalidRegex(source.to_owned(), pattern.to_owned(), e)
                    })?;
                    Ok(Some((
                        Segment::Regex {
                            key,
                            source: anchored,
                            tail,
                        },
                        after,
                    )))
                }
                None => Ok(Some((Segment::Param { key, tail }, after))),
            }
        }
        Some(b) => Ok(Some((Segment::Static(rest[..b].to_owned()), start + b))),
    }
}

/// `{` and `}` only ever nest as far as a regex quantifier like `{2,4}`
/// inside a capture; counting depth handles both that and the plain case.
fn find_matching_brace(rest: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in rest.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn anchor(source: &str) -> String {
    let needs_start = !source.starts_with('^');
    let needs_end = !source.ends_with('$');
    let mut out = String::with_capacity(source.len() + 2);
    if needs_start {
        out.push('^');
    }
    out.push_str(source);
    if needs_end {
        out.push('$');
    }
    out
}

/// Collects every parameter key declared by `pattern`, in order, failing if
/// any key (including the implicit `*` of a catch-all) is declared twice.
pub(crate) fn param_keys(pattern: &str) -> Result<Vec<Arc<str>>, PatternError> {
    let mut keys: Vec<Arc<str>> = Vec::new();
    let mut idx = 0;
    while let Some((segment, next)) = next_segment(pattern, idx)? {
        let key = match segment {
            Segment::Param { key, .. } | Segment::Regex { key, .. } => Some(key),
            Segment::CatchAll => Some(Arc::from("*")),
            Segment::Static(_) => None,
        };
        if let Some(key) = key {
            if keys.iter().any(|k| **k == *key) {
                return Err(PatternError::DuplicateParam(
                    pattern.to_owned(),
                    key.to_string(),
                ));
            }
            keys.push(key);
        }
        idx = next;
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(pattern: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut idx = 0;
        while let Some((seg, next)) = next_segment(pattern, idx).unwrap() {
            out.push(seg);
            idx = next;
        }
        out
    }

    #[test]
    fn splits_static_and_param_segments() {
        let segs = segments("/users/{id}/profile");
        assert!(matches!(&segs[0], Segment::Static(s) if s == "/users/"));
        assert!(matches!(&segs[1], Segment::Param { key, tail } if &**key == "id" && *tail == b'/'));
        assert!(matches!(&segs[2], Segment::Static(s) if s == "/profile"));
    }

    #[test]
    fn regex_segment_gets_anchored_source() {
        let segs = segments("/files/{id:[0-9]+}");
        match &segs[1] {
            Segment::Regex { key, source, tail } => {
                assert_eq!(&**key, "id");
                assert_eq!(source, "^[0-9]+$");
                assert_eq!(*tail, b'/');
            }
            other => panic!("expected regex segment, got {other:?}"),
        }
    }

    #[test]
    fn trailing_star_is_catch_all() {
        let segs = segments("/static/*");
        assert!(matches!(&segs[0], Segment::Static(s) if s == "/static/"));
        assert!(matches!(&segs[1], Segment::CatchAll));
    }

    #[test]
    fn star_before_end_is_rejected() {
        let err = param_keys("/files/*/edit").unwrap_err();
        assert!(matches!(err, PatternError::WildcardPosition(_)));
    }

    #[test]
    fn unclosed_param_is_rejected() {
        let err = param_keys("/users/{id").unwrap_err();
        assert!(matches!(err, PatternError::UnclosedParam(_)));
    }

    #[test]
    fn duplicate_param_key_is_rejected() {
        let err = param_keys("/users/{id}/posts/{id}").unwrap_err();
        assert!(matches!(err, PatternError::DuplicateParam(_, key) if key == "id"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = param_keys("/files/{id:[}").unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex(..)));
    }

    #[test]
    fn param_keys_includes_catch_all_as_star() {
        let keys = param_keys("/users/{id}/files/*").unwrap();
        let keys: Vec<&str> = keys.iter().map(|k| &**k).collect();
        assert_eq!(keys, vec!["id", "*"]);
    }
}
