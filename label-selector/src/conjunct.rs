use crate::labels::Labeled;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// The kind of constraint a conjunct places on a label.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("unknown operator: {0:?} (expected one of In, NotIn, Exists, DoesNotExist)")]
pub struct UnknownOperator(pub String);

/// Identifies a conjunct by value.
///
/// The order of `values` is significant: `a in (x, y)` and `a in (y, x)` are
/// distinct conjuncts, even though they constrain labels identically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConjunctId {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

/// A single label constraint within a selector's conjunction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conjunct {
    id: ConjunctId,
    display: String,
}

// === impl Operator ===

impl Operator {
    /// The canonical name used in `matchExpressions`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        }
    }

    /// Returns true if the operator compares a label against a list of values.
    #[inline]
    pub fn takes_values(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// Renders the lowercase form used in human-readable conjuncts.
impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Exists => "exists",
            Self::DoesNotExist => "does not exist",
        })
    }
}

/// Accepts both the canonical names and the lowercase display forms.
impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" | "in" => Ok(Self::In),
            "NotIn" | "not in" | "notin" => Ok(Self::NotIn),
            "Exists" | "exists" => Ok(Self::Exists),
            "DoesNotExist" | "does not exist" => Ok(Self::DoesNotExist),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

// === impl ConjunctId ===

impl ConjunctId {
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[inline]
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl AsRef<ConjunctId> for ConjunctId {
    #[inline]
    fn as_ref(&self) -> &ConjunctId {
        self
    }
}

// === impl Conjunct ===

impl Conjunct {
    /// Builds a conjunct, discarding `values` for operators that don't use
    /// them.
    ///
    /// Callers must ensure `In` and `NotIn` have at least one value.
    pub(crate) fn new(key: String, operator: Operator, mut values: Vec<String>) -> Self {
        if !operator.takes_values() {
            values.clear();
        }
        let display = match operator {
            Operator::In | Operator::NotIn => {
                format!("{} {} ({})", key, operator, values.join(", "))
            }
            Operator::Exists | Operator::DoesNotExist => format!("{} {}", key, operator),
        };
        Self {
            id: ConjunctId {
                key,
                operator,
                values,
            },
            display,
        }
    }

    #[inline]
    pub fn id(&self) -> &ConjunctId {
        &self.id
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.id.key
    }

    #[inline]
    pub fn operator(&self) -> Operator {
        self.id.operator
    }

    #[inline]
    pub fn values(&self) -> &[String] {
        &self.id.values
    }

    /// The human-readable form, e.g. `app in (web, api)`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Tests a single constraint against an object's labels.
    ///
    /// An empty-string value is present: it satisfies `Exists` and fails
    /// `DoesNotExist`. An absent label satisfies every `NotIn`.
    pub fn matches<L: Labeled + ?Sized>(&self, labels: &L) -> bool {
        let value = labels.label(self.key());
        match self.operator() {
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::In => match value {
                Some(v) => self.values().iter().any(|want| want == v),
                None => false,
            },
            Operator::NotIn => match value {
                Some(v) => self.values().iter().all(|excluded| excluded != v),
                None => true,
            },
        }
    }

    /// Returns true if every object matched by `other` is also matched by
    /// this conjunct.
    ///
    /// `DoesNotExist` is only implied by an identical conjunct.
    pub(crate) fn is_implied_by(&self, other: &Conjunct) -> bool {
        if self.id == other.id {
            return true;
        }
        if self.key() != other.key() {
            return false;
        }

        match (self.operator(), other.operator()) {
            // Any value-restricted requirement implies the key is present.
            (Operator::Exists, Operator::In) => true,
            (Operator::In, Operator::In) => {
                let permitted = self.value_set();
                !other.values().is_empty()
                    && other.values().iter().all(|v| permitted.contains(v.as_str()))
            }
            (Operator::NotIn, Operator::NotIn) => {
                let excluded = other.value_set();
                let required = self.value_set();
                excluded.intersection(&required).count() == required.len()
            }
            _ => false,
        }
    }

    fn value_set(&self) -> BTreeSet<&str> {
        self.values().iter().map(String::as_str).collect()
    }
}

impl AsRef<ConjunctId> for Conjunct {
    #[inline]
    fn as_ref(&self) -> &ConjunctId {
        &self.id
    }
}

impl fmt::Display for Conjunct {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
