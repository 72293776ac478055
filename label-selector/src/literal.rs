use crate::{conjunct::Operator, labels::Map};
use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A selector as it is written in a resource.
///
/// Two encodings coexist: the structured `matchLabels`/`matchExpressions`
/// form, and a flat mapping of label keys to values where a missing value
/// requires only that the key exists. A literal carrying either
/// `matchLabels` or `matchExpressions` (even empty) is structured; anything
/// else is flat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorLiteral {
    Structured(LabelSelector),
    Flat(FlatSelector),
}

/// The structured selector encoding.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<Expression>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
}

/// The legacy selector encoding: `None` requires the key to exist.
pub type FlatSelector = BTreeMap<String, Option<String>>;

const MATCH_LABELS: &str = "matchLabels";
const MATCH_EXPRESSIONS: &str = "matchExpressions";

// === impl SelectorLiteral ===

impl SelectorLiteral {
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    fn from_object<E: de::Error>(object: serde_json::Map<String, Value>) -> Result<Self, E> {
        if object.contains_key(MATCH_LABELS) || object.contains_key(MATCH_EXPRESSIONS) {
            return serde_json::from_value(Value::Object(object))
                .map(Self::Structured)
                .map_err(E::custom);
        }

        object
            .into_iter()
            .map(|(key, value)| {
                let value = flat_value(&key, value)?;
                Ok((key, value))
            })
            .collect::<Result<FlatSelector, E>>()
            .map(Self::Flat)
    }
}

impl From<LabelSelector> for SelectorLiteral {
    fn from(selector: LabelSelector) -> Self {
        Self::Structured(selector)
    }
}

impl From<FlatSelector> for SelectorLiteral {
    fn from(selector: FlatSelector) -> Self {
        Self::Flat(selector)
    }
}

impl<'de> Deserialize<'de> for SelectorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Object(object) => Self::from_object(object),
            // An absent literal selects by policy alone.
            Value::Null => Ok(Self::Flat(FlatSelector::new())),
            other => Err(de::Error::invalid_type(unexpected(&other), &"a selector mapping")),
        }
    }
}

impl Serialize for SelectorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Structured(selector) => selector.serialize(serializer),
            Self::Flat(selector) => selector.serialize(serializer),
        }
    }
}

/// Coerces a flat entry's value.
///
/// Falsy values (`null`, `false`, `0`) only require the key to exist. Strings,
/// including the empty string, require an exact value; other scalars are
/// compared by their rendered form.
fn flat_value<E: de::Error>(key: &str, value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(true) => Ok(Some("true".to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(E::custom(format_args!(
            "invalid value for label {:?}: expected a string or null, found {}",
            key,
            unexpected(&other),
        ))),
    }
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Number(_) => de::Unexpected::Other("number"),
        Value::String(s) => de::Unexpected::Str(s),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    #[test]
    fn structured_when_either_field_is_present() {
        for (value, expected) in [
            (
                json!({ "matchLabels": {} }),
                LabelSelector {
                    match_labels: Some(Map::new()),
                    match_expressions: None,
                },
            ),
            (
                json!({ "matchExpressions": [], "app": "ignored" }),
                LabelSelector {
                    match_labels: None,
                    match_expressions: Some(vec![]),
                },
            ),
            (
                json!({
                    "matchLabels": { "app": "web" },
                    "matchExpressions": [{ "key": "tier", "operator": "Exists" }],
                }),
                LabelSelector {
                    match_labels: Some(btreemap! { "app".to_string() => "web".to_string() }),
                    match_expressions: Some(vec![Expression {
                        key: "tier".to_string(),
                        operator: Operator::Exists,
                        values: vec![],
                    }]),
                },
            ),
        ] {
            assert_eq!(
                SelectorLiteral::from_value(value).unwrap(),
                SelectorLiteral::Structured(expected)
            );
        }
    }

    #[test]
    fn flat() {
        let literal = SelectorLiteral::from_value(json!({
            "app": "web",
            "tier": "",
            "track": null,
            "canary": false,
            "weight": 0,
            "enabled": true,
            "version": 2,
        }))
        .unwrap();
        assert_eq!(
            literal,
            SelectorLiteral::Flat(btreemap! {
                "app".to_string() => Some("web".to_string()),
                "tier".to_string() => Some("".to_string()),
                "track".to_string() => None,
                "canary".to_string() => None,
                "weight".to_string() => None,
                "enabled".to_string() => Some("true".to_string()),
                "version".to_string() => Some("2".to_string()),
            })
        );
    }

    #[test]
    fn rejects_malformed_literals() {
        for value in [
            json!({ "matchExpressions": [{ "key": "a", "operator": "Gt", "values": ["1"] }] }),
            json!({ "matchLabels": { "a": null } }),
            json!({ "app": ["web"] }),
            json!({ "app": { "name": "web" } }),
            json!(["app"]),
            json!("app=web"),
        ] {
            assert!(
                SelectorLiteral::from_value(value.clone()).is_err(),
                "{} must not parse",
                value
            );
        }
    }

    #[test]
    fn yaml() {
        let literal = SelectorLiteral::from_yaml(
            r#"
matchExpressions:
  - key: app
    operator: In
    values: [web, api]
  - key: legacy
    operator: DoesNotExist
"#,
        )
        .unwrap();
        let SelectorLiteral::Structured(selector) = literal else {
            panic!("expected a structured literal");
        };
        let exprs = selector.match_expressions.unwrap();
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].values, vec!["web".to_string(), "api".to_string()]);
        assert_eq!(exprs[1].operator, Operator::DoesNotExist);

        let flat = SelectorLiteral::from_yaml("app: web\ntier:\n").unwrap();
        assert_eq!(
            flat,
            SelectorLiteral::Flat(btreemap! {
                "app".to_string() => Some("web".to_string()),
                "tier".to_string() => None,
            })
        );
    }

    #[test]
    fn null_literal_is_empty() {
        assert_eq!(
            SelectorLiteral::from_json("null").unwrap(),
            SelectorLiteral::Flat(FlatSelector::new())
        );
    }
}
