//! Rule engine for FlowGuard.
//!
//! This module provides the rule records ([`rule`]), the specificity-scored
//! matching algorithm ([`matcher`]) and the store-backed rule list with
//! throttled reloading ([`table`]) that decides which rule, if any, governs
//! an outbound connection.

pub mod matcher;
pub mod rule;
pub mod table;

pub use matcher::FlowInfo;
pub use rule::{NewRule, Rule, RuleAction, ANY};
pub use table::RuleTable;
