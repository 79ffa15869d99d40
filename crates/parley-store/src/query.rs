//! Collection queries: equality / inequality filters and one ascending
//! order-by field.

use std::cmp::Ordering;

use serde_json::Value;

use crate::path::CollectionPath;
use crate::value::Fields;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq(String, Value),
    /// `field != value`; documents lacking the field never match.
    NotEq(String, Value),
}

impl Filter {
    fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(field, value) => fields.get(field) == Some(value),
            Filter::NotEq(field, value) => fields.get(field).is_some_and(|v| v != value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<Filter>,
    order_by: Option<String>,
}

impl Query {
    /// Every document of `collection`, in insertion order.
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(field.to_string(), value.into()));
        self
    }

    /// Order ascending by `field`.  Documents lacking the field are excluded;
    /// ties keep insertion order.
    pub fn order_by_asc(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn path(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub(crate) fn matches(&self, fields: &Fields) -> bool {
        if let Some(ref field) = self.order_by {
            if !fields.contains_key(field) {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(fields))
    }

    /// Stable sort of already-filtered documents.
    pub(crate) fn sort<T>(&self, docs: &mut [T], fields_of: impl Fn(&T) -> &Fields) {
        if let Some(ref field) = self.order_by {
            docs.sort_by(|a, b| compare_values(fields_of(a).get(field), fields_of(b).get(field)));
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
    };
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x.cmp(&y);
            }
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_not_equal_excludes_missing_field() {
        let q = Query::collection(CollectionPath::root("users")).where_ne("uid", "me");
        assert!(q.matches(&doc(json!({ "uid": "other" }))));
        assert!(!q.matches(&doc(json!({ "uid": "me" }))));
        assert!(!q.matches(&doc(json!({ "email": "x@y" }))));
    }

    #[test]
    fn test_equal_filter() {
        let q = Query::collection(CollectionPath::root("m")).where_eq("deleted", false);
        assert!(q.matches(&doc(json!({ "deleted": false }))));
        assert!(!q.matches(&doc(json!({ "deleted": true }))));
        assert!(!q.matches(&doc(json!({}))));
    }

    #[test]
    fn test_order_by_is_stable_on_ties() {
        let q = Query::collection(CollectionPath::root("m")).order_by_asc("timestamp");
        let mut docs = vec![
            ("c", doc(json!({ "timestamp": 5 }))),
            ("a", doc(json!({ "timestamp": 1 }))),
            ("b", doc(json!({ "timestamp": 5 }))),
        ];
        q.sort(&mut docs, |(_, f)| f);
        let order: Vec<&str> = docs.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_order_by_excludes_documents_without_field() {
        let q = Query::collection(CollectionPath::root("m")).order_by_asc("timestamp");
        assert!(!q.matches(&doc(json!({ "text": "pending" }))));
    }
}
