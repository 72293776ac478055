#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Label selectors: matching labeled objects against a conjunction of
//! constraints, and deciding whether one selector covers another.

mod conjunct;
mod error;
pub mod labels;
pub mod literal;
pub mod query;
mod select;
mod selector;

pub use self::{
    conjunct::{Conjunct, ConjunctId, Operator, UnknownOperator},
    error::Error,
    labels::{Labeled, Labels, Map},
    literal::{Expression, FlatSelector, LabelSelector, SelectorLiteral},
    select::Select,
    selector::Selector,
};
