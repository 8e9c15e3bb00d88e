//! # Storage Pushdown Rules
//!
//! This crate provides the rewrite rules that move work from the query engine into
//! the time-series storage layer, along with the leaf classifier for that storage
//! dialect.
//!
//! ## Rules
//!
//! - **`PushDownRangeRule`**: `from |> range` becomes a bounded `ReadRange`. Every other
//!   rule matches on `ReadRange`, so this one has to fire first.
//! - **`PushDownFilterRule`**: moves the pushable conjuncts of a `filter` into the
//!   `ReadRange` below it. Repeated filters accumulate into one stored predicate.
//! - **`PushDownReadTagKeysRule`**: `keys |> keep |> distinct` over a read becomes a
//!   `ReadTagKeys` index lookup.
//! - **`PushDownReadTagValuesRule`**: `keep/drop |> group |> distinct` over a read
//!   becomes a `ReadTagValues` index lookup.
//!
//! The rules are registered in that order. The driver works bottom-up, so a filter
//! is always pushed before the shape rules above it look at the read.

pub mod classifier;
pub mod push_down_filter;
pub mod push_down_range;
pub mod push_down_read_tag_keys;
pub mod push_down_read_tag_values;

use fluxopt_core::predicate::LeafClassifier;
use fluxopt_core::rule::RuleRegistry;
use std::sync::Arc;

pub use classifier::StorageClassifier;

/// Create a rule registry with all storage rules, using `classifier` to decide which
/// filter conjuncts are pushable.
pub fn default_rule_registry(classifier: Arc<dyn LeafClassifier>) -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    registry.add_rule(Box::new(push_down_range::PushDownRangeRule));
    registry.add_rule(Box::new(push_down_filter::PushDownFilterRule::new(classifier)));
    registry.add_rule(Box::new(push_down_read_tag_keys::PushDownReadTagKeysRule));
    registry.add_rule(Box::new(push_down_read_tag_values::PushDownReadTagValuesRule));

    registry
}

/// [`default_rule_registry`] with the [`StorageClassifier`].
pub fn storage_rule_registry() -> RuleRegistry {
    default_rule_registry(Arc::new(StorageClassifier))
}
