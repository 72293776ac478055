use crate::conjunct::{Operator, UnknownOperator};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("operator {operator:?} requires at least one value for key {key:?}")]
    MissingValues { key: String, operator: Operator },

    #[error(transparent)]
    UnknownOperator(#[from] UnknownOperator),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("invalid selector literal: {0}")]
    Literal(#[source] serde_json::Error),

    #[error("invalid selector literal: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to encode selector: {0}")]
    Json(#[source] serde_json::Error),
}
