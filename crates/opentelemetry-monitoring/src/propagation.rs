//! Trace context propagation through a flat, multi-valued metadata carrier.
//!
//! A [`Carrier`] is what crosses the process boundary, typically as request
//! headers or gRPC metadata. Injection always produces lowercase keys since
//! some transports canonicalise header case; extraction consults only the
//! first value of each key.

use opentelemetry::Context;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::collections::{BTreeMap, HashMap};

/// String-keyed metadata where each key maps to zero or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Carrier(BTreeMap<String, Vec<String>>);

impl Carrier {
    /// Creates an empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `key`, keeping any values already present.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the first value stored under exactly `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns every value stored under exactly `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates over the keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over key/value-list pairs in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the carrier holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Carrier
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut carrier = Carrier::new();
        for (key, value) in iter {
            carrier.append(key, value);
        }
        carrier
    }
}

impl From<HashMap<String, Vec<String>>> for Carrier {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        Self(map.into_iter().collect())
    }
}

/// Writes the W3C trace context of `cx` into a new carrier.
pub fn inject(cx: &Context) -> Carrier {
    inject_with(&TraceContextPropagator::new(), cx)
}

/// Writes the trace context of `cx` using `propagator`.
///
/// Header names come out of the propagator in whatever case it uses; every
/// key of the returned carrier is lowercased.
pub fn inject_with(propagator: &dyn TextMapPropagator, cx: &Context) -> Carrier {
    let mut headers: HashMap<String, String> = HashMap::new();
    propagator.inject_context(cx, &mut headers);

    let mut carrier = Carrier::new();
    for (key, value) in headers {
        carrier.append(key.to_lowercase(), value);
    }
    carrier
}

/// Reads a W3C trace context out of `carrier`, on top of `base`.
///
/// An empty carrier or one without a usable trace header is not an error:
/// the returned context simply has no valid remote span.
pub fn extract(base: &Context, carrier: &Carrier) -> Context {
    extract_with(&TraceContextPropagator::new(), base, carrier)
}

/// Reads the trace context out of `carrier` using `propagator`.
///
/// Keys are matched case-insensitively and only the first value of each key
/// is consulted. When two keys differ only in case, the one that sorts first
/// wins.
pub fn extract_with(
    propagator: &dyn TextMapPropagator,
    base: &Context,
    carrier: &Carrier,
) -> Context {
    let mut headers: HashMap<String, String> = HashMap::with_capacity(carrier.len());
    for (key, values) in carrier.iter() {
        if let Some(first) = values.first() {
            headers
                .entry(key.to_lowercase())
                .or_insert_with(|| first.clone());
        }
    }
    propagator.extract_with_context(base, &headers)
}
