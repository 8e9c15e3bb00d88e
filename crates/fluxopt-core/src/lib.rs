//! # fluxopt-core: Physical Plan Rewriting Core
//!
//! This crate holds the data structures and algorithms of the physical-plan pushdown
//! optimizer. A compiled query arrives as a DAG with one node per operator; the
//! rewrite driver applies pattern-matched rules until the range selection, filters
//! and shape summaries that the storage layer can execute have been folded into
//! storage read nodes.
//!
//! ## Module Overview
//!
//! - **`plan`**: The arena-backed plan DAG and its create/replace/merge edit primitives.
//! - **`spec`**: The closed set of operator payloads and their kind tags.
//! - **`expr`**: Predicate expressions and function literals carried by filters.
//! - **`pattern`**: Structural matching of operator chains.
//! - **`predicate`**: Splitting a predicate into a storage-pushable part and a remainder.
//! - **`rule`**: The Rule trait and the RuleRegistry keyed by root kind.
//! - **`rewrite`**: The fixed-point rewrite driver.
//! - **`error`**: Hard failures that abort a pass.

pub mod error;
pub mod expr;
pub mod pattern;
pub mod plan;
pub mod predicate;
pub mod rewrite;
pub mod rule;
pub mod spec;
