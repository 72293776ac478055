use crate::{
    conjunct::{Conjunct, ConjunctId, Operator},
    error::Error,
    labels::{Labeled, Map},
    literal::{Expression, LabelSelector, SelectorLiteral},
    select::Select,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace};


/// A conjunction of label constraints.
///
/// A selector with no conjuncts matches everything or nothing, depending on
/// how it was built. It never covers another selector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    conjuncts: BTreeMap<ConjunctId, Conjunct>,
    empty_selects_all: bool,
}

// === impl Selector ===

impl Selector {
    /// Returns a selector with no conjuncts.
    pub fn new(empty_selects_all: bool) -> Self {
        Self {
            conjuncts: BTreeMap::new(),
            empty_selects_all,
        }
    }

    /// Builds a selector from either literal encoding.
    ///
    /// Each `matchLabels` entry and each flat entry with a value becomes a
    /// single-valued `In`; a flat entry without a value becomes `Exists`.
    pub fn from_literal(literal: &SelectorLiteral, empty_selects_all: bool) -> Result<Self, Error> {
        let mut selector = Self::new(empty_selects_all);
        match literal {
            SelectorLiteral::Structured(LabelSelector {
                match_labels,
                match_expressions,
            }) => {
                for (key, value) in match_labels.iter().flatten() {
                    selector.add_conjunct(key.clone(), Operator::In, vec![value.clone()])?;
                }
                for Expression {
                    key,
                    operator,
                    values,
                } in match_expressions.iter().flatten()
                {
                    selector.add_conjunct(key.clone(), *operator, values.clone())?;
                }
            }
            SelectorLiteral::Flat(entries) => {
                for (key, value) in entries {
                    match value {
                        Some(value) => {
                            selector.add_conjunct(key.clone(), Operator::In, vec![value.clone()])?
                        }
                        None => selector.add_conjunct(key.clone(), Operator::Exists, vec![])?,
                    };
                }
            }
        }
        Ok(selector)
    }

    /// Builds a selector from an optional literal; `None` yields an empty
    /// selector.
    pub fn from_optional_literal(
        literal: Option<&SelectorLiteral>,
        empty_selects_all: bool,
    ) -> Result<Self, Error> {
        match literal {
            Some(literal) => Self::from_literal(literal, empty_selects_all),
            None => Ok(Self::new(empty_selects_all)),
        }
    }

    pub fn from_value(value: serde_json::Value, empty_selects_all: bool) -> Result<Self, Error> {
        let literal = SelectorLiteral::from_value(value).map_err(Error::Literal)?;
        Self::from_literal(&literal, empty_selects_all)
    }

    pub fn from_json(s: &str, empty_selects_all: bool) -> Result<Self, Error> {
        let literal = SelectorLiteral::from_json(s).map_err(Error::Literal)?;
        Self::from_literal(&literal, empty_selects_all)
    }

    pub fn from_yaml(s: &str, empty_selects_all: bool) -> Result<Self, Error> {
        let literal = SelectorLiteral::from_yaml(s)?;
        Self::from_literal(&literal, empty_selects_all)
    }

    /// Sets whether a selector without conjuncts matches everything.
    pub fn with_empty_selects_all(mut self, empty_selects_all: bool) -> Self {
        self.empty_selects_all = empty_selects_all;
        self
    }

    #[inline]
    pub fn empty_selects_all(&self) -> bool {
        self.empty_selects_all
    }

    // === Mutation ===

    /// Inserts a conjunct, replacing an identical one, and returns a copy of
    /// what was stored.
    ///
    /// `values` are discarded for `Exists` and `DoesNotExist`, and required
    /// for `In` and `NotIn`.
    pub fn add_conjunct(
        &mut self,
        key: impl Into<String>,
        operator: Operator,
        values: Vec<String>,
    ) -> Result<Conjunct, Error> {
        let key = key.into();
        if operator.takes_values() && values.is_empty() {
            return Err(Error::MissingValues { key, operator });
        }

        let conjunct = Conjunct::new(key, operator, values);
        trace!(conjunct = %conjunct, "Adding");
        self.conjuncts
            .insert(conjunct.id().clone(), conjunct.clone());
        Ok(conjunct)
    }

    /// Removes a conjunct by id. Unknown ids are ignored.
    pub fn remove_conjunct(&mut self, id: impl AsRef<ConjunctId>) -> Option<Conjunct> {
        let removed = self.conjuncts.remove(id.as_ref());
        if let Some(conjunct) = removed.as_ref() {
            trace!(conjunct = %conjunct, "Removed");
        }
        removed
    }

    pub fn clear_conjuncts(&mut self) {
        self.conjuncts.clear();
    }

    // === Inspection ===

    /// Returns true if there are no conjuncts, regardless of
    /// `empty_selects_all`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    /// Iterates over conjuncts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Conjunct> + '_ {
        self.conjuncts.values()
    }

    pub fn each<F: FnMut(&Conjunct)>(&self, visit: F) {
        self.iter().for_each(visit)
    }

    pub fn get(&self, id: impl AsRef<ConjunctId>) -> Option<&Conjunct> {
        self.conjuncts.get(id.as_ref())
    }

    pub fn contains(&self, id: impl AsRef<ConjunctId>) -> bool {
        self.conjuncts.contains_key(id.as_ref())
    }

    pub fn conjuncts_for_key<'s>(&'s self, key: &'s str) -> impl Iterator<Item = &'s Conjunct> + 's {
        self.iter().filter(move |c| c.key() == key)
    }

    // === Evaluation ===

    pub fn matches_labels(&self, labels: &Map) -> bool {
        self.matches_labeled(labels)
    }

    /// Tests an object's labels. Nullish objects never match; objects without
    /// labels are matched as though their labels were empty.
    pub fn matches<L: Labeled + ?Sized>(&self, resource: &L) -> bool {
        if resource.is_nullish() {
            return false;
        }
        self.matches_labeled(resource)
    }

    fn matches_labeled<L: Labeled + ?Sized>(&self, labels: &L) -> bool {
        if self.conjuncts.is_empty() {
            return self.empty_selects_all;
        }
        self.iter().all(|c| c.matches(labels))
    }

    /// Filters a sequence or keyed mapping of objects, preserving order or
    /// keys.
    pub fn select<'r, C>(&self, resources: &'r C) -> C::Selected<'r>
    where
        C: Select + ?Sized,
    {
        resources.select_by(self)
    }

    // === Covering ===

    /// Returns true if every object matched by `other` is also matched by
    /// this selector.
    ///
    /// An empty selector covers nothing, including another empty selector.
    pub fn covers(&self, other: &Selector) -> bool {
        if self.is_empty() {
            return false;
        }

        self.iter().all(|required| {
            let covered = other.iter().any(|c| required.is_implied_by(c));
            if !covered {
                debug!(conjunct = %required, "Not covered");
            }
            covered
        })
    }

    /// Like [`Selector::covers`], for callers that may not have a selector to
    /// compare against.
    pub fn try_covers(&self, other: Option<&Selector>) -> Result<bool, Error> {
        let other = other.ok_or(Error::InvalidArgument("covers requires a selector"))?;
        Ok(self.covers(other))
    }

    // === Export ===

    /// Returns the structured literal, expressing every conjunct as a
    /// `matchExpressions` entry.
    pub fn to_literal(&self) -> LabelSelector {
        LabelSelector {
            match_labels: None,
            match_expressions: Some(
                self.iter()
                    .map(|c| Expression {
                        key: c.key().to_string(),
                        operator: c.operator(),
                        values: c.values().to_vec(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn export_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::Json)
    }
}

impl Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_literal().serialize(serializer)
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut selector = Self::default();
        for (k, v) in iter {
            let c = Conjunct::new(k, Operator::In, vec![v]);
            selector.conjuncts.insert(c.id().clone(), c);
        }
        selector
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Selector {
    type Item = &'a Conjunct;
    type IntoIter = std::collections::btree_map::Values<'a, ConjunctId, Conjunct>;

    fn into_iter(self) -> Self::IntoIter {
        self.conjuncts.values()
    }
}

// === k8s-openapi ===

impl From<&Selector> for metav1::LabelSelector {
    fn from(selector: &Selector) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(
                selector
                    .iter()
                    .map(|c| metav1::LabelSelectorRequirement {
                        key: c.key().to_string(),
                        operator: c.operator().as_str().to_string(),
                        values: if c.operator().takes_values() {
                            Some(c.values().to_vec())
                        } else {
                            None
                        },
                    })
                    .collect(),
            ),
        }
    }
}

impl TryFrom<&metav1::LabelSelector> for Selector {
    type Error = Error;

    fn try_from(selector: &metav1::LabelSelector) -> Result<Self, Self::Error> {
        let mut s = Self::default();
        for (key, value) in selector.match_labels.iter().flatten() {
            s.add_conjunct(key.clone(), Operator::In, vec![value.clone()])?;
        }
        for req in selector.match_expressions.iter().flatten() {
            let operator = req.operator.parse::<Operator>()?;
            s.add_conjunct(
                req.key.clone(),
                operator,
                req.values.clone().unwrap_or_default(),
            )?;
        }
        Ok(s)
    }
}
