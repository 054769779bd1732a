//! The compressed radix trie backing [`crate::Router`].
//!
//! Each node owns a static prefix and four typed buckets of children:
//! static, regex, param, and catch-all. Insertion splits nodes on longest
//! common prefix, the way a classic radix/PATRICIA trie does; lookup walks
//! buckets in a fixed priority order (static beats regex/param beats
//! catch-all) so that a request matching both a literal segment and a
//! parameter at the same position always prefers the literal.

use std::sync::Arc;

use crate::error::InsertError;
use crate::method::{self, Mask};
use crate::params::Params;
use crate::pattern::{self, Segment};

/// One node of the trie. `H` is the handler type stored at each installed
/// method (an `Arc<Endpoint>`, from the router's point of view, but this
/// module doesn't need to know that).
pub(crate) struct Node<H> {
    prefix: String,
    statics: Vec<Node<H>>,
    regexes: Vec<RegexChild<H>>,
    param: Option<Box<ParamChild<H>>>,
    catch_all: Option<Box<CatchAllChild<H>>>,
    endpoints: Option<Endpoints<H>>,
    /// Marks a node installed purely to hold a mount-point stub; excluded
    /// from [`Node::walk`] so introspection never lists the internal
    /// delegation route a [`crate::Router::mount`] uses to find its
    /// sub-router.
    is_stub: bool,
}

struct RegexChild<H> {
    key: Arc<str>,
    source: String,
    regex: regex::Regex,
    tail: u8,
    node: Node<H>,
}

struct ParamChild<H> {
    key: Arc<str>,
    tail: u8,
    node: Node<H>,
}

struct CatchAllChild<H> {
    node: Node<H>,
}

/// The set of handlers installed at a single node, one slot per method bit
/// (including [`method::STUB`]).
struct Endpoints<H> {
    slots: Vec<Option<(Mask, Arc<H>)>>,
}

impl<H> Endpoints<H> {
    fn new() -> Self {
        Endpoints { slots: Vec::new() }
    }

    fn insert(&mut self, bit: Mask, handler: Arc<H>) -> Result<(), InsertError> {
        if self.slots.iter().any(|slot| slot.as_ref().map(|(b, _)| *b) == Some(bit)) {
            return Err(InsertError::InvalidMethod(format!(
                "a handler is already installed for method bit {bit:#x}"
            )));
        }
        self.slots.push(Some((bit, handler)));
        Ok(())
    }

    fn get(&self, bit: Mask) -> Option<&Arc<H>> {
        self.slots
            .iter()
            .flatten()
            .find(|(b, _)| *b == bit)
            .map(|(_, h)| h)
    }

    fn allowed(&self) -> impl Iterator<Item = Mask> + '_ {
        self.slots
            .iter()
            .flatten()
            .map(|(b, _)| *b)
            .filter(|b| *b != method::STUB)
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The outcome of a successful [`Node::find`].
pub(crate) struct Found<'n, H> {
    pub handler: &'n Arc<H>,
    pub params: Params,
}

impl<H> Node<H> {
    fn new(prefix: impl Into<String>) -> Self {
        Node {
            prefix: prefix.into(),
            statics: Vec::new(),
            regexes: Vec::new(),
            param: None,
            catch_all: None,
            endpoints: None,
            is_stub: false,
        }
    }

    pub(crate) fn root() -> Self {
        Node::new("")
    }

    /// Installs `handler` at `pattern` for every method bit in `mask`.
    pub(crate) fn insert(
        &mut self,
        pattern: &str,
        mask: Mask,
        handler: Arc<H>,
        is_stub: bool,
    ) -> Result<(), InsertError> {
        let segments = parse_segments(pattern)?;
        self.insert_segments(&segments, 0, mask, handler, is_stub)
    }

    fn insert_segments(
        &mut self,
        segments: &[Segment],
        index: usize,
        mask: Mask,
        handler: Arc<H>,
        is_stub: bool,
    ) -> Result<(), InsertError> {
        let Some(segment) = segments.get(index) else {
            let endpoints = self.endpoints.get_or_insert_with(Endpoints::new);
            for bit in method::decompose(mask) {
                endpoints.insert(bit, Arc::clone(&handler))?;
            }
            self.is_stub = self.is_stub || is_stub;
            return Ok(());
        };

        match segment {
            Segment::Static(text) => self.insert_static(text, segments, index, mask, handler, is_stub),
            Segment::Param { key, tail } => {
                let child = self.param.get_or_insert_with(|| {
                    Box::new(ParamChild {
                        key: Arc::clone(key),
                        tail: *tail,
                        node: Node::new(""),
                    })
                });
                if child.key.as_ref() != key.as_ref() || child.tail != *tail {
                    return Err(InsertError::Pattern(crate::error::PatternError::DuplicateParam(
                        key.to_string(),
                        "a different parameter is already installed at this position".to_owned(),
                    )));
                }
                child.node.insert_segments(segments, index + 1, mask, handler, is_stub)
            }
            Segment::Regex { key, source, tail } => {
                if let Some(existing) = self
                    .regexes
                    .iter_mut()
                    .find(|c| c.key.as_ref() == key.as_ref() && c.tail == *tail && c.source == *source)
                {
                    return existing.node.insert_segments(segments, index + 1, mask, handler, is_stub);
                }
                let regex = regex::Regex::new(source).map_err(|e| {
                    InsertError::Pattern(crate::error::PatternError::InvalidRegex(
                        source.clone(),
                        key.to_string(),
                        e,
                    ))
                })?;
                let mut node = Node::new("");
                node.insert_segments(segments, index + 1, mask, handler, is_stub)?;
                self.regexes.push(RegexChild {
                    key: Arc::clone(key),
                    source: source.clone(),
                    regex,
                    tail: *tail,
                    node,
                });
                Ok(())
            }
            Segment::CatchAll => {
                let child = self.catch_all.get_or_insert_with(|| {
                    Box::new(CatchAllChild { node: Node::new("") })
                });
                child.node.insert_segments(segments, index + 1, mask, handler, is_stub)
            }
        }
    }

    fn insert_static(
        &mut self,
        text: &str,
        segments: &[Segment],
        index: usize,
        mask: Mask,
        handler: Arc<H>,
        is_stub: bool,
    ) -> Result<(), InsertError> {
        if let Some(existing) = self
            .statics
            .iter_mut()
            .find(|child| common_prefix_len(&child.prefix, text) > 0)
        {
            let shared = common_prefix_len(&existing.prefix, text);
            if shared < existing.prefix.len() {
                existing.split_at(shared);
            }
            if shared == text.len() {
                return existing.insert_segments(segments, index + 1, mask, handler, is_stub);
            }
            let mut synthetic = vec![Segment::Static(text[shared..].to_owned())];
            synthetic.extend_from_slice(&segments[index + 1..]);
            return existing.insert_segments(&synthetic, 0, mask, handler, is_stub);
        }

        let mut child = Node::new(text);
        child.insert_segments(segments, index + 1, mask, handler, is_stub)?;
        self.statics.push(child);
        self.statics.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(())
    }

    /// Splits this node at byte offset `at` of its prefix: the part before
    /// `at` stays, and a new child node takes over the suffix along with
    /// all of this node's existing children and endpoints.
    fn split_at(&mut self, at: usize) {
        let suffix = self.prefix.split_off(at);
        let mut tail = Node::new(suffix);
        tail.statics = std::mem::take(&mut self.statics);
        tail.regexes = std::mem::take(&mut self.regexes);
        tail.param = self.param.take();
        tail.catch_all = self.catch_all.take();
        tail.endpoints = self.endpoints.take();
        tail.is_stub = self.is_stub;
        self.is_stub = false;
        self.statics = vec![tail];
    }

    /// Looks up `search` for `method_bit`. Returns `Ok(Found)` on a
    /// concrete match, `Err(true)` if the path matched some route but not
    /// for this method (so the caller can answer `405` with the allowed
    /// methods), or `Err(false)` if nothing matched at all (`404`).
    pub(crate) fn find(&self, search: &str, method_bit: Mask) -> Result<Found<'_, H>, bool> {
        let mut params = Params::new();
        match self.find_inner(search, method_bit, &mut params) {
            Some(handler) => Ok(Found { handler, params }),
            None => Err(self.path_exists(search)),
        }
    }

    fn find_inner<'n>(
        &'n self,
        search: &str,
        method_bit: Mask,
        params: &mut Params,
    ) -> Option<&'n Arc<H>> {
        if search.is_empty() {
            return self.endpoints.as_ref().and_then(|e| e.get(method_bit));
        }

        for child in &self.statics {
            if let Some(rest) = search.strip_prefix(child.prefix.as_str()) {
                let checkpoint = params.checkpoint();
                if let Some(handler) = child.find_inner(rest, method_bit, params) {
                    return Some(handler);
                }
                params.truncate(checkpoint);
            }
        }

        for child in &self.regexes {
            let checkpoint = params.checkpoint();
            if let Some(captured) = capture_wild(child.tail, search) {
                let (value, rest) = captured;
                if !value.is_empty() && child.regex.is_match(value) {
                    params.push(Arc::clone(&child.key), value.to_owned());
                    if let Some(handler) = child.node.find_inner(rest, method_bit, params) {
                        return Some(handler);
                    }
                }
            }
            params.truncate(checkpoint);
        }

        if let Some(child) = &self.param {
            let checkpoint = params.checkpoint();
            if let Some((value, rest)) = capture_wild(child.tail, search) {
                if !value.is_empty() {
                    params.push(Arc::clone(&child.key), value.to_owned());
                    if let Some(handler) = child.node.find_inner(rest, method_bit, params) {
                        return Some(handler);
                    }
                }
            }
            params.truncate(checkpoint);
        }

        if let Some(child) = &self.catch_all {
            let checkpoint = params.checkpoint();
            params.push(Arc::from("*"), search.to_owned());
            if let Some(handler) = child.node.find_inner("", method_bit, params) {
                return Some(handler);
            }
            params.truncate(checkpoint);
        }

        None
    }

    /// True if `search` matches some installed route regardless of method --
    /// used to distinguish `404` from `405` once [`Self::find_inner`] has
    /// already failed for the requested method.
    fn path_exists(&self, search: &str) -> bool {
        let mut params = Params::new();
        self.path_exists_inner(search, &mut params)
    }

    fn path_exists_inner(&self, search: &str, params: &mut Params) -> bool {
        if search.is_empty() {
            return self.endpoints.as_ref().map(|e| !e.is_empty()).unwrap_or(false);
        }

        for child in &self.statics {
            if let Some(rest) = search.strip_prefix(child.prefix.as_str()) {
                if child.path_exists_inner(rest, params) {
                    return true;
                }
            }
        }
        for child in &self.regexes {
            if let Some((value, rest)) = capture_wild(child.tail, search) {
                if !value.is_empty() && child.regex.is_match(value) && child.node.path_exists_inner(rest, params) {
                    return true;
                }
            }
        }
        if let Some(child) = &self.param {
            if let Some((value, rest)) = capture_wild(child.tail, search) {
                if !value.is_empty() && child.node.path_exists_inner(rest, params) {
                    return true;
                }
            }
        }
        if let Some(child) = &self.catch_all {
            if child.node.path_exists_inner("", params) {
                return true;
            }
        }
        false
    }

    /// Returns the allowed methods for `search`, used to build the `Allow`
    /// header of a `405` response.
    pub(crate) fn allowed_methods(&self, search: &str) -> Vec<Mask> {
        let mut out = Vec::new();
        self.collect_allowed(search, &mut out);
        out
    }

    fn collect_allowed(&self, search: &str, out: &mut Vec<Mask>) {
        if search.is_empty() {
            if let Some(endpoints) = &self.endpoints {
                out.extend(endpoints.allowed());
            }
            return;
        }
        for child in &self.statics {
            if let Some(rest) = search.strip_prefix(child.prefix.as_str()) {
                child.collect_allowed(rest, out);
            }
        }
        for child in &self.regexes {
            if let Some((value, rest)) = capture_wild(child.tail, search) {
                if !value.is_empty() && child.regex.is_match(value) {
                    child.node.collect_allowed(rest, out);
                }
            }
        }
        if let Some(child) = &self.param {
            if let Some((value, rest)) = capture_wild(child.tail, search) {
                if !value.is_empty() {
                    child.node.collect_allowed(rest, out);
                }
            }
        }
        if let Some(child) = &self.catch_all {
            child.node.collect_allowed("", out);
        }
    }

    /// Walks every concrete route installed in this subtree, calling `visit`
    /// with the reconstructed pattern and the mask of methods installed at
    /// it. Skips nodes marked [`Node::is_stub`], so mount points don't show
    /// up as routes of their own.
    pub(crate) fn walk(&self, prefix: &str, visit: &mut dyn FnMut(&str, Mask)) {
        let here = format!("{prefix}{}", self.prefix);
        if !self.is_stub {
            if let Some(endpoints) = &self.endpoints {
                let mask = endpoints.slots.iter().flatten().fold(0, |acc, (b, _)| acc | b);
                if mask != 0 {
                    visit(&here, mask);
                }
            }
        }
        for child in &self.statics {
            child.walk(&here, visit);
        }
        for child in &self.regexes {
            let marker = format!("{here}{{{}:{}}}", child.key, child.source);
            child.node.walk(&marker, visit);
        }
        if let Some(child) = &self.param {
            let marker = format!("{here}{{{}}}", child.key);
            child.node.walk(&marker, visit);
        }
        if let Some(child) = &self.catch_all {
            let marker = format!("{here}*");
            child.node.walk(&marker, visit);
        }
    }
}

fn parse_segments(pattern: &str) -> Result<Vec<Segment>, InsertError> {
    if !pattern.is_empty() && !pattern.starts_with('/') {
        return Err(InsertError::Pattern(crate::error::PatternError::InvalidPattern(
            pattern.to_owned(),
        )));
    }
    let mut segments = Vec::new();
    let mut start = 0;
    while let Some((segment, next)) = pattern::next_segment(pattern, start)? {
        segments.push(segment);
        start = next;
    }
    Ok(segments)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Captures a wildcard (param or regex) segment's value out of `search`:
/// everything up to the first occurrence of `tail`, or -- when `tail` is
/// `/` and no further `/` occurs -- the whole remainder of `search`. A
/// captured value is never allowed to contain a `/` itself.
fn capture_wild(tail: u8, search: &str) -> Option<(&str, &str)> {
    match search.as_bytes().iter().position(|&b| b == tail) {
        Some(at) => Some((&search[..at], &search[at..])),
        None if tail == b'/' => Some((search, "")),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method;

    fn insert(trie: &mut Node<&'static str>, pattern: &str, mask: Mask, handler: &'static str) {
        trie.insert(pattern, mask, Arc::new(handler), false).unwrap();
    }

    #[test]
    fn static_routes_take_priority_over_params() {
        let mut trie = Node::root();
        insert(&mut trie, "/users/me", method::GET, "me");
        insert(&mut trie, "/users/{id}", method::GET, "by-id");

        let found = trie.find("/users/me", method::GET).ok().unwrap();
        assert_eq!(**found.handler, "me");
        assert!(found.params.is_empty());

        let found = trie.find("/users/42", method::GET).ok().unwrap();
        assert_eq!(**found.handler, "by-id");
        assert_eq!(found.params.get("id"), "42");
    }

    #[test]
    fn common_prefix_splits_nodes() {
        let mut trie = Node::root();
        insert(&mut trie, "/articles", method::GET, "index");
        insert(&mut trie, "/article/{id}", method::GET, "show");

        assert_eq!(**trie.find("/articles", method::GET).ok().unwrap().handler, "index");
        let found = trie.find("/article/7", method::GET).ok().unwrap();
        assert_eq!(found.params.get("id"), "7");
    }

    #[test]
    fn catch_all_captures_remainder() {
        let mut trie = Node::root();
        insert(&mut trie, "/assets/*", method::GET, "assets");

        let found = trie.find("/assets/js/app.js", method::GET).ok().unwrap();
        assert_eq!(found.params.get("*"), "js/app.js");
    }

    #[test]
    fn regex_segment_must_match_to_be_taken() {
        let mut trie = Node::root();
        insert(&mut trie, "/users/{id:[0-9]+}", method::GET, "numeric");
        insert(&mut trie, "/users/{name}", method::GET, "named");

        let found = trie.find("/users/42", method::GET).ok().unwrap();
        assert_eq!(**found.handler, "numeric");
        let found = trie.find("/users/bob", method::GET).ok().unwrap();
        assert_eq!(**found.handler, "named");
    }

    #[test]
    fn wrong_method_reports_method_not_allowed() {
        let mut trie = Node::root();
        insert(&mut trie, "/users", method::GET, "index");

        let err = trie.find("/users", method::POST).unwrap_err();
        assert!(err, "path should exist for a different method");
        assert_eq!(trie.allowed_methods("/users"), vec![method::GET]);
    }

    #[test]
    fn pattern_without_leading_slash_is_rejected() {
        let mut trie: Node<&'static str> = Node::root();
        let err = trie.insert("users", method::GET, Arc::new("index"), false).unwrap_err();
        assert!(matches!(
            err,
            InsertError::Pattern(crate::error::PatternError::InvalidPattern(_))
        ));
    }

    #[test]
    fn unknown_path_reports_not_found() {
        let trie: Node<&'static str> = Node::root();
        let err = trie.find("/nope", method::GET).unwrap_err();
        assert!(!err);
    }

    #[test]
    fn walk_skips_stub_nodes() {
        let mut trie = Node::root();
        trie.insert("/api", method::ALL | method::STUB, Arc::new("mount"), true)
            .unwrap();
        insert(&mut trie, "/health", method::GET, "health");

        let mut seen = Vec::new();
        trie.walk("", &mut |pattern, _mask| seen.push(pattern.to_owned()));
        assert_eq!(seen, vec!["/health".to_owned()]);
    }

    #[test]
    fn param_value_cannot_cross_a_slash() {
        let mut trie = Node::root();
        insert(&mut trie, "/users/{id}/posts", method::GET, "posts");

        let found = trie.find("/users/abc/posts", method::GET).ok().unwrap();
        assert_eq!(found.params.get("id"), "abc");

        let err = trie.find("/users/abc/def/posts", method::GET);
        assert!(err.is_err(), "id must not swallow the extra path segment");
    }
}
