use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    List(Vec<String>),
}

pub type HeaderMap = BTreeMap<String, HeaderValue>;

/// Folds `{name, value}` pairs into the header object Xray expects.
///
/// With `arr` every header maps to the ordered list of its values; without it the last value
/// wins. Entries with a missing or empty name or value are skipped.
pub fn fold_headers(headers: &[HeaderEntry], arr: bool) -> HeaderMap {
    let mut out = HeaderMap::new();
    for header in headers {
        let (Some(name), Some(value)) = (header.name.as_deref(), header.value.as_deref()) else {
            continue;
        };
        if name.is_empty() || value.is_empty() {
            continue;
        }
        if !arr {
            out.insert(name.to_string(), HeaderValue::Single(value.to_string()));
            continue;
        }
        match out.get_mut(name) {
            Some(HeaderValue::List(values)) => values.push(value.to_string()),
            _ => {
                out.insert(name.to_string(), HeaderValue::List(vec![value.to_string()]));
            }
        }
    }
    out
}
