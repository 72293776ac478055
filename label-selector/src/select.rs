use crate::{labels::Labeled, selector::Selector};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    hash::{BuildHasher, Hash},
};

/// A collection of labeled objects that a [`Selector`] can filter.
///
/// Sequences keep their order and mappings keep their keys.
pub trait Select {
    type Selected<'a>
    where
        Self: 'a;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a>;
}

impl<T: Labeled> Select for [T] {
    type Selected<'a>
        = Vec<&'a T>
    where
        Self: 'a;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a> {
        self.iter().filter(|r| selector.matches(*r)).collect()
    }
}

impl<T: Labeled> Select for Vec<T> {
    type Selected<'a>
        = Vec<&'a T>
    where
        Self: 'a;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a> {
        self.as_slice().select_by(selector)
    }
}

impl<K: Ord, T: Labeled> Select for BTreeMap<K, T> {
    type Selected<'a>
        = BTreeMap<&'a K, &'a T>
    where
        Self: 'a;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a> {
        self.iter().filter(|(_, r)| selector.matches(*r)).collect()
    }
}

impl<K: Hash + Eq, T: Labeled, S: BuildHasher> Select for HashMap<K, T, S> {
    type Selected<'a>
        = HashMap<&'a K, &'a T>
    where
        Self: 'a;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a> {
        self.iter().filter(|(_, r)| selector.matches(*r)).collect()
    }
}

/// Filters an untyped collection.
///
/// Arrays and objects are filtered by element; a Kubernetes `List` (an object
/// with an `items` array) has its items filtered. Any other value selects
/// nothing and yields `null`.
impl Select for Value {
    type Selected<'a> = Value;

    fn select_by<'a>(&'a self, selector: &Selector) -> Self::Selected<'a> {
        match self {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|r| selector.matches(*r))
                    .cloned()
                    .collect(),
            ),
            Value::Object(list) if list.get("items").map_or(false, Value::is_array) => {
                let mut list = list.clone();
                if let Some(items) = list.get_mut("items") {
                    *items = items.select_by(selector);
                }
                Value::Object(list)
            }
            Value::Object(entries) => Value::Object(
                entries
                    .iter()
                    .filter(|(_, r)| selector.matches(*r))
                    .map(|(k, r)| (k.clone(), r.clone()))
                    .collect(),
            ),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use serde_json::json;

    fn selector() -> Selector {
        Selector::from_iter(Some(("app", "web")))
    }

    #[test]
    fn sequences_keep_order() {
        let resources = vec![
            Labels::from_iter(vec![("app", "web"), ("n", "0")]),
            Labels::from_iter(Some(("app", "api"))),
            Labels::from_iter(vec![("app", "web"), ("n", "1")]),
            Labels::default(),
        ];
        let selected = selector().select(&resources);
        assert_eq!(selected, vec![&resources[0], &resources[2]]);

        let selected = selector().select(&resources[1..]);
        assert_eq!(selected, vec![&resources[2]]);
    }

    #[test]
    fn mappings_keep_keys() {
        let resources = maplit::btreemap! {
            "a" => Labels::from_iter(Some(("app", "web"))),
            "b" => Labels::from_iter(Some(("app", "api"))),
        };
        let selected = selector().select(&resources);
        assert_eq!(selected.keys().copied().collect::<Vec<_>>(), vec![&"a"]);

        let resources = maplit::hashmap! {
            "a".to_string() => Labels::from_iter(Some(("app", "api"))),
            "b".to_string() => Labels::from_iter(Some(("app", "web"))),
        };
        let selected = selector().select(&resources);
        assert_eq!(selected.len(), 1);
        assert!(selected.contains_key(&"b".to_string()));
    }

    #[test]
    fn json_collections() {
        let web = json!({ "metadata": { "name": "web", "labels": { "app": "web" } } });
        let api = json!({ "metadata": { "name": "api", "labels": { "app": "api" } } });

        let array = json!([web.clone(), null, api.clone()]);
        assert_eq!(selector().select(&array), json!([web.clone()]));

        let object = json!({ "w": web.clone(), "a": api.clone() });
        assert_eq!(selector().select(&object), json!({ "w": web.clone() }));

        let list = json!({ "kind": "List", "items": [api, web.clone()] });
        assert_eq!(
            selector().select(&list),
            json!({ "kind": "List", "items": [web] })
        );

        assert_eq!(selector().select(&json!("web")), Value::Null);
    }
}
