//! Leaf classifier for the time-series storage dialect.
//!
//! Storage can evaluate comparisons of tag columns against string literals or
//! regular expressions and comparisons of the `_value` column against numbers, plus
//! any `and`/`or` combination of those. Everything else stays in the engine.
//!
//! ```text
//! r._measurement == "cpu"        pushable
//! r.host =~ /^web-\d+$/          pushable
//! r._value > 0.5                 pushable
//! r.host == "a" or r._value > 1  pushable
//! r._time > 2020-01-01T00:00:00Z not pushable (not a tag)
//! r.host == r.dc                 not pushable (no literal)
//! not r.host == "a"              not pushable
//! ```

use fluxopt_core::expr::{BinaryOp, Expr};
use fluxopt_core::predicate::LeafClassifier;
use fluxopt_core::spec::{DEFAULT_VALUE_COLUMN, RESERVED_COLUMNS};

#[derive(Debug, Clone, Copy, Default)]
pub struct StorageClassifier;

impl LeafClassifier for StorageClassifier {
    fn is_pushable(&self, param: &str, leaf: &Expr) -> bool {
        match leaf {
            Expr::Logical { left, right, .. } => {
                self.is_pushable(param, left) && self.is_pushable(param, right)
            }
            Expr::Binary { op, left, right } => is_pushable_comparison(param, *op, left, right),
            _ => false,
        }
    }
}

fn is_pushable_comparison(param: &str, op: BinaryOp, left: &Expr, right: &Expr) -> bool {
    let (column, literal) = match (left.member_of(param), right.member_of(param)) {
        (Some(column), None) => (column, right),
        (None, Some(column)) => (column, left),
        _ => return false,
    };

    let is_tag = !RESERVED_COLUMNS.contains(&column);
    let is_value = column == DEFAULT_VALUE_COLUMN;
    match op {
        BinaryOp::Eq | BinaryOp::NotEq => {
            (is_tag && matches!(literal, Expr::String { .. })) || (is_value && is_number(literal))
        }
        BinaryOp::RegexMatch | BinaryOp::NotRegexMatch => {
            is_tag && matches!(literal, Expr::Regex { .. })
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            is_value && is_number(literal)
        }
        _ => false,
    }
}

fn is_number(e: &Expr) -> bool {
    matches!(e, Expr::Integer { .. } | Expr::Float { .. })
}
