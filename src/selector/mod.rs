//! Selector builder: turns `(field, operator)` keys and raw condition
//! documents into the canonical nested selector sent to the backend.

mod conditions;
mod key;
mod merge;

pub use conditions::{Condition, Conditions};
pub use key::{Field, Key, Op, Pattern, field};
pub use merge::{is_operator_document, merge_condition, merge_selectors, seedable_attributes};
