//! # Predicate Partitioning
//!
//! Splits a filter body into the part the storage layer can evaluate and the part
//! that must stay in the engine.
//!
//! The body is split only at conjunctions. Each conjunct ("leaf") is handed to the
//! storage dialect's [`LeafClassifier`]; an `or`, a negation, or any other expression
//! stays one leaf and is never split further, because pushing half of a disjunction
//! would change which rows survive.
//!
//! ```text
//! r._measurement == "cpu" and r.host == "a" and (r.cpu == "0" or r.cpu == "1")
//!   leaves:    [_measurement == "cpu"] [host == "a"] [cpu == "0" or cpu == "1"]
//!   pushable:  _measurement == "cpu" and (cpu == "0" or cpu == "1")
//!   remainder: host == "a"
//! ```
//!
//! Both parts keep the original left-to-right leaf order.

use crate::error::{PlanError, PlanResult};
use crate::expr::{exprs_to_conjunction, Expr};

/// Decides whether one leaf predicate can be executed by the storage layer.
///
/// Supplied by the storage dialect. `param` is the name of the filter function's
/// record parameter (`r` in `(r) => r.host == "a"`).
pub trait LeafClassifier: Send + Sync {
    fn is_pushable(&self, param: &str, leaf: &Expr) -> bool;
}

impl<F> LeafClassifier for F
where
    F: Fn(&str, &Expr) -> bool + Send + Sync,
{
    fn is_pushable(&self, param: &str, leaf: &Expr) -> bool {
        self(param, leaf)
    }
}

/// Result of splitting a predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Conjunction of the pushable leaves; `None` when nothing can be pushed.
    pub pushable: Option<Expr>,
    /// Conjunction of the remaining leaves; `None` when everything was pushed.
    pub remainder: Option<Expr>,
}

/// Split `expr` at its conjunctions and classify every leaf with `is_pushable`.
///
/// Fails if a leaf cannot be boolean-valued (a bare non-boolean literal or an
/// arithmetic expression), which means the predicate tree is malformed.
pub fn partition_predicates<F>(expr: &Expr, mut is_pushable: F) -> PlanResult<Partition>
where
    F: FnMut(&Expr) -> bool,
{
    let mut pushable = Vec::new();
    let mut remainder = Vec::new();
    for leaf in expr.conjuncts() {
        check_leaf(leaf)?;
        if is_pushable(leaf) {
            pushable.push(leaf.clone());
        } else {
            remainder.push(leaf.clone());
        }
    }
    Ok(Partition {
        pushable: exprs_to_conjunction(pushable),
        remainder: exprs_to_conjunction(remainder),
    })
}

fn check_leaf(leaf: &Expr) -> PlanResult<()> {
    let arithmetic = matches!(leaf, Expr::Binary { op, .. } if !op.is_comparison());
    if leaf.is_non_boolean_literal() || arithmetic {
        return Err(PlanError::InvalidPredicate(format!(
            "`{}` is not a boolean expression",
            leaf
        )));
    }
    Ok(())
}
