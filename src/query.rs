//! Ordered form/query parameter builder
//!
//! OAuth2 request bodies and authorize URLs are flat key/value maps in
//! which some keys (`resource`) may repeat. [`QueryParams`] keeps insertion
//! order so encoded output is deterministic, drops absent optional values,
//! and expands list values into repeated keys.

use url::form_urlencoded;

/// A parameter value: a single string or a list emitted as repeated keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// `key=value`
    Scalar(String),
    /// `key=a&key=b`
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Insertion-ordered parameter map.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::query::QueryParams;
///
/// let mut params = QueryParams::new();
/// params.set("grant_type", "client_credentials");
/// params.set_opt("scope", None::<String>);
/// params.set("resource", vec!["https://a".to_string(), "https://b".to_string()]);
///
/// assert_eq!(
///     params.encode(),
///     "grant_type=client_credentials&resource=https%3A%2F%2Fa&resource=https%3A%2F%2Fb"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, ParamValue)>,
}

impl QueryParams {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any existing value in place.
    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    /// Sets `key` only when `value` is present.
    pub fn set_opt<V: Into<ParamValue>>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    /// Returns `true` if `key` has a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the scalar value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            ParamValue::Scalar(s) if k == key => Some(s.as_str()),
            _ => None,
        })
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no keys are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens into `(key, value)` pairs with list values repeated.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for (key, value) in &self.entries {
            match value {
                ParamValue::Scalar(s) => pairs.push((key.as_str(), s.as_str())),
                ParamValue::List(items) => {
                    pairs.extend(items.iter().map(|s| (key.as_str(), s.as_str())))
                }
            }
        }
        pairs
    }

    /// Encodes as `application/x-www-form-urlencoded`.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            let key: String = k.into();
            params.set(&key, v);
        }
        params
    }
}
