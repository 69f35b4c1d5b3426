//! List response normalization
//!
//! Nursery list endpoints answer either with a bare JSON array or with an
//! envelope object exposing the array under `content`, `data` or `items`.
//! All listing code goes through [`ListResponse`] instead of sniffing shapes
//! at each call site.

use serde::Deserialize;
use serde_json::Value;

/// Field holding nested child records (sub-categories inside a category)
pub const NESTED_FIELD: &str = "subCategories";

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse {
    Array(Vec<Value>),
    Envelope(Envelope),
}

/// Paginated envelope; the first present field wins
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    content: Option<Vec<Value>>,
    data: Option<Vec<Value>>,
    items: Option<Vec<Value>>,
}

impl ListResponse {
    /// Interpret a response body as a list, `None` if it is neither shape
    pub fn from_value(body: &Value) -> Option<Self> {
        match serde_json::from_value::<ListResponse>(body.clone()).ok()? {
            ListResponse::Envelope(env)
                if env.content.is_none() && env.data.is_none() && env.items.is_none() =>
            {
                None
            }
            list => Some(list),
        }
    }

    /// Flatten to the underlying entries
    pub fn into_entries(self) -> Vec<Value> {
        match self {
            ListResponse::Array(entries) => entries,
            ListResponse::Envelope(env) => {
                env.content.or(env.data).or(env.items).unwrap_or_default()
            }
        }
    }
}

/// Entries of a list body, empty when the body is not a list
pub fn entries(body: &Value) -> Vec<Value> {
    ListResponse::from_value(body)
        .map(ListResponse::into_entries)
        .unwrap_or_default()
}

/// First entry whose `name` equals `name`
///
/// Top-level entries are scanned first, then one level of `subCategories`.
pub fn find_by_name<'a>(entries: &'a [Value], name: &str) -> Option<&'a Value> {
    let has_name = |entry: &&Value| entry.get("name").and_then(Value::as_str) == Some(name);

    entries.iter().find(has_name).or_else(|| {
        entries
            .iter()
            .filter_map(|entry| entry.get(NESTED_FIELD).and_then(Value::as_array))
            .find_map(|children| children.iter().find(has_name))
    })
}

/// Integer `id` of an entry
pub fn entry_id(entry: &Value) -> Option<i64> {
    entry.get("id").and_then(Value::as_i64)
}

/// Entries plus one level of `subCategories`, every child ahead of the
/// top-level entries. An id listed both nested and top-level appears once,
/// in the child position.
pub fn children_first(entries: &[Value]) -> Vec<Value> {
    let nested: Vec<Value> = entries
        .iter()
        .filter_map(|entry| entry.get(NESTED_FIELD).and_then(Value::as_array))
        .flatten()
        .cloned()
        .collect();
    let nested_ids: Vec<i64> = nested.iter().filter_map(entry_id).collect();

    let top_level = entries
        .iter()
        .filter(|entry| entry_id(entry).map_or(true, |id| !nested_ids.contains(&id)))
        .cloned();
    nested.into_iter().chain(top_level).collect()
}
