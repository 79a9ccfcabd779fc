use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Collection list parameters in the json-server dialect:
/// `_sort`, `_order`, `_limit`, `_page`, `q`, and `field=value` equality filters.
///
/// Numeric parameters are kept as strings while deserializing because query
/// strings are flattened into the filter map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(rename = "_sort", default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(rename = "_order", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(rename = "_limit", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(rename = "_page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(flatten)]
    pub filters: BTreeMap<String, String>,
}

/// One page of a listed collection plus the unpaginated match count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

impl ListParams {
    pub fn filter(field: &str, value: &str) -> Self {
        let mut params = Self::default();
        params.filters.insert(field.to_string(), value.to_string());
        params
    }

    pub fn and_filter(mut self, field: &str, value: &str) -> Self {
        self.filters.insert(field.to_string(), value.to_string());
        self
    }

    pub fn sorted_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some(field.to_string());
        self.order = Some(match order {
            SortOrder::Asc => "asc".to_string(),
            SortOrder::Desc => "desc".to_string(),
        });
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn sort_order(&self) -> SortOrder {
        match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }

    pub fn page_value(&self) -> Option<usize> {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .filter(|p: &usize| *p >= 1)
    }

    /// Does a JSON document pass the equality filters and the full-text `q`?
    pub fn matches(&self, doc: &Value) -> bool {
        let filters_pass = self.filters.iter().all(|(field, expected)| {
            match doc.get(field) {
                Some(actual) => scalar_text(actual).as_deref() == Some(expected.as_str()),
                None => false,
            }
        });
        if !filters_pass {
            return false;
        }
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => contains_text(doc, &q.to_lowercase()),
            _ => true,
        }
    }

    /// Filter, sort and paginate a collection of JSON documents
    pub fn apply(&self, docs: Vec<Value>) -> Page<Value> {
        let mut matched: Vec<Value> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some(field) = self.sort.as_deref() {
            let order = self.sort_order();
            matched.sort_by(|a, b| {
                let ordering = compare_json(a.get(field), b.get(field));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let total = matched.len();
        let items = match self.limit_value() {
            Some(limit) => {
                let page = self.page_value().unwrap_or(1);
                // Absurd page numbers from the query string must not overflow
                let offset = page.saturating_sub(1).saturating_mul(limit);
                matched
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .collect()
            }
            None => matched,
        };

        Page { items, total }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

/// Order two optional JSON scalars; numbers numerically, strings lexically,
/// missing values last.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
