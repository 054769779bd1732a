use std::sync::Arc;

/// The parameters captured by a single successful route lookup, in pattern
/// order.
///
/// Keys and values live in parallel vectors rather than a map: a route
/// rarely captures more than a handful of parameters, so a linear scan beats
/// hashing, and pattern order falls out for free instead of needing to be
/// reconstructed.
#[derive(Debug, Clone, Default)]
pub struct Params {
    keys: Vec<Arc<str>>,
    values: Vec<String>,
}

impl Params {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: Arc<str>, value: String) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.keys.truncate(len);
        self.values.truncate(len);
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.keys.len()
    }

    /// The number of captured parameters.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no parameters were captured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a parameter by key.
    ///
    /// Returns an empty string if `key` was never captured, matching the
    /// design's `Param(key) -> string` contract -- callers don't need to
    /// distinguish "absent" from "empty" for path parameters, since a path
    /// parameter that captures nothing never reaches here (zero-length
    /// regex captures are rejected during lookup).
    pub fn get(&self, key: &str) -> &str {
        self.keys
            .iter()
            .position(|k| &**k == key)
            .map(|i| self.values[i].as_str())
            .unwrap_or("")
    }

    /// Iterates captured `(key, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(|k| &**k)
            .zip(self.values.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_empty_string_for_missing_key() {
        let params = Params::new();
        assert_eq!(params.get("id"), "");
    }

    #[test]
    fn push_preserves_insertion_order() {
        let mut params = Params::new();
        params.push(Arc::from("a"), "1".to_owned());
        params.push(Arc::from("b"), "2".to_owned());
        assert_eq!(
            params.iter().collect::<Vec<_>>(),
            vec![("a", "1"), ("b", "2")]
        );
    }

    #[test]
    fn truncate_to_checkpoint_undoes_pushes() {
        let mut params = Params::new();
        params.push(Arc::from("a"), "1".to_owned());
        let checkpoint = params.checkpoint();
        params.push(Arc::from("b"), "2".to_owned());
        params.truncate(checkpoint);
        assert_eq!(params.get("b"), "");
        assert_eq!(params.get("a"), "1");
    }
}
