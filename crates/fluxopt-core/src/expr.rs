//! # Semantic Expressions
//!
//! This module defines the expression tree carried inside `filter` functions and
//! inside the filters pushed into storage reads. It is a small semantic graph: the
//! compiler has already resolved and type-checked it, so the optimizer only needs
//! enough structure to split predicates and hand them to the storage dialect.
//!
//! ## Expressions (`Expr`)
//! Identifiers, member access (`r.host`), literals, binary comparisons and
//! arithmetic, logical `and`/`or`, unary operators and calls. Conjunctions are kept
//! as nested binary `and` nodes, the shape the compiler produces; see
//! [`Expr::conjuncts`] and [`exprs_to_conjunction`] for flattening and refolding.
//!
//! ## Functions (`FunctionExpr`)
//! A function literal such as `(r) => r._measurement == "cpu"`. The body is either a
//! single expression or a block of statements. Only single-expression bodies with one
//! parameter are candidates for pushdown.
//!
//! ## Rendering
//! `Display` renders Flux-like source text. It is used by explain output and logs,
//! never parsed back.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar expressions used in predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expr {
    /// Reference to a bound name, usually a function parameter.
    Identifier { name: String },
    /// Property access on a record (`r.host`).
    Member { object: Box<Expr>, property: String },
    /// UTF-8 string literal.
    String { value: String },
    /// 64-bit signed integer literal.
    Integer { value: i64 },
    /// Float literal, wrapped in OrderedFloat for Eq/Hash support.
    Float { value: OrderedFloat<f64> },
    /// Boolean literal.
    Boolean { value: bool },
    /// Regular expression literal (`/^cpu.*/`).
    Regex { pattern: String },
    /// Duration literal in nanoseconds.
    Duration { nanos: i64 },
    /// Comparison or arithmetic.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuit `and` / `or`.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `not` / unary minus.
    Unary { op: UnaryOp, argument: Box<Expr> },
    /// Named function call (`strings.hasPrefix(v: r.host, prefix: "a")`).
    Call {
        callee: String,
        arguments: Vec<Argument>,
    },
}

/// A named call argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Regex match (`=~`).
    RegexMatch,
    /// Regex non-match (`!~`).
    NotRegexMatch,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::RegexMatch => "=~",
            BinaryOp::NotRegexMatch => "!~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Whether the operator produces a boolean.
    pub fn is_comparison(&self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier { name: name.into() }
    }

    /// `object.property` where `object` is an identifier.
    pub fn member(object: impl Into<String>, property: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(Expr::ident(object)),
            property: property.into(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::String {
            value: value.into(),
        }
    }

    pub fn integer(value: i64) -> Self {
        Expr::Integer { value }
    }

    pub fn float(value: f64) -> Self {
        Expr::Float {
            value: OrderedFloat(value),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Boolean { value }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Expr::Regex {
            pattern: pattern.into(),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(argument: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            argument: Box::new(argument),
        }
    }

    /// Flatten nested `and` nodes: `(a and (b and c))` → `[a, b, c]`.
    ///
    /// `or` and every other expression is a single conjunct.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// True for literals that cannot evaluate to a boolean.
    pub fn is_non_boolean_literal(&self) -> bool {
        matches!(
            self,
            Expr::String { .. }
                | Expr::Integer { .. }
                | Expr::Float { .. }
                | Expr::Regex { .. }
                | Expr::Duration { .. }
        )
    }

    /// The property name when this is `param.property` for the given parameter.
    pub fn member_of(&self, param: &str) -> Option<&str> {
        match self {
            Expr::Member { object, property } => match object.as_ref() {
                Expr::Identifier { name } if name == param => Some(property),
                _ => None,
            },
            _ => None,
        }
    }

    /// Rename every free occurrence of identifier `from` to `to`.
    ///
    /// Expressions contain no binders, so every identifier is free.
    pub fn rename_identifier(&self, from: &str, to: &str) -> Expr {
        match self {
            Expr::Identifier { name } if name == from => Expr::ident(to),
            Expr::Member { object, property } => Expr::Member {
                object: Box::new(object.rename_identifier(from, to)),
                property: property.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.rename_identifier(from, to)),
                right: Box::new(right.rename_identifier(from, to)),
            },
            Expr::Logical { op, left, right } => Expr::Logical {
                op: *op,
                left: Box::new(left.rename_identifier(from, to)),
                right: Box::new(right.rename_identifier(from, to)),
            },
            Expr::Unary { op, argument } => Expr::Unary {
                op: *op,
                argument: Box::new(argument.rename_identifier(from, to)),
            },
            Expr::Call { callee, arguments } => Expr::Call {
                callee: callee.clone(),
                arguments: arguments
                    .iter()
                    .map(|a| Argument {
                        name: a.name.clone(),
                        value: a.value.rename_identifier(from, to),
                    })
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

/// Fold expressions left-to-right into a conjunction: `[a, b, c]` → `(a and b) and c`.
///
/// Returns `None` for an empty input.
pub fn exprs_to_conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(Expr::and)
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionParam {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Expr>,
}

/// Statements of a block body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Statement {
    Variable { name: String, init: Expr },
    Expression { expr: Expr },
    Return { argument: Expr },
}

/// Body of a function literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FunctionBody {
    Expr(Expr),
    Block(Vec<Statement>),
}

/// A function literal such as `(r) => r._measurement == "cpu"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub params: Vec<FunctionParam>,
    pub body: FunctionBody,
}

impl FunctionExpr {
    /// A one-parameter function with an expression body.
    pub fn predicate(param: impl Into<String>, body: Expr) -> Self {
        Self {
            params: vec![FunctionParam {
                key: param.into(),
                default: None,
            }],
            body: FunctionBody::Expr(body),
        }
    }

    /// The sole parameter name, if the function takes exactly one.
    pub fn single_param(&self) -> Option<&str> {
        match self.params.as_slice() {
            [p] => Some(p.key.as_str()),
            _ => None,
        }
    }

    /// The body when it is a single expression.
    pub fn body_expr(&self) -> Option<&Expr> {
        match &self.body {
            FunctionBody::Expr(e) => Some(e),
            FunctionBody::Block(_) => None,
        }
    }

    /// Copy of this function with the body replaced.
    pub fn with_body(&self, body: Expr) -> Self {
        Self {
            params: self.params.clone(),
            body: FunctionBody::Expr(body),
        }
    }
}

fn write_duration(f: &mut fmt::Formatter<'_>, nanos: i64) -> fmt::Result {
    const UNITS: [(&str, i64); 6] = [
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];
    if nanos == 0 {
        return write!(f, "0s");
    }
    if nanos < 0 {
        write!(f, "-")?;
    }
    let mut rest = nanos.unsigned_abs();
    for (unit, size) in UNITS {
        let size = size as u64;
        if rest >= size {
            write!(f, "{}{}", rest / size, unit)?;
            rest %= size;
        }
    }
    Ok(())
}

/// Renders a duration in Flux literal syntax (`-1h30m`).
pub struct DisplayDuration(pub i64);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_duration(f, self.0)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier { name } => write!(f, "{}", name),
            Expr::Member { object, property } => write!(f, "{}.{}", object, property),
            Expr::String { value } => write!(f, "{:?}", value),
            Expr::Integer { value } => write!(f, "{}", value),
            Expr::Float { value } => write!(f, "{:?}", value.0),
            Expr::Boolean { value } => write!(f, "{}", value),
            Expr::Regex { pattern } => write!(f, "/{}/", pattern),
            Expr::Duration { nanos } => write_duration(f, *nanos),
            Expr::Binary { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expr::Logical { op, left, right } => {
                let kw = match op {
                    LogicalOp::And => "and",
                    LogicalOp::Or => "or",
                };
                write_operand(f, left, *op)?;
                write!(f, " {} ", kw)?;
                write_operand(f, right, *op)
            }
            Expr::Unary { op, argument } => match op {
                UnaryOp::Not => write!(f, "not {}", argument),
                UnaryOp::Neg => write!(f, "-{}", argument),
            },
            Expr::Call { callee, arguments } => {
                write!(f, "{}(", callee)?;
                for (i, a) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", a.name, a.value)?;
                }
                write!(f, ")")
            }
        }
    }
}

// Parenthesize a logical operand whose operator differs from its parent's.
fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, parent: LogicalOp) -> fmt::Result {
    match operand {
        Expr::Logical { op, .. } if *op != parent => write!(f, "({})", operand),
        _ => write!(f, "{}", operand),
    }
}

impl fmt::Display for FunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|p| p.key.as_str()).collect();
        write!(f, "({}) => ", params.join(", "))?;
        match &self.body {
            FunctionBody::Expr(e) => write!(f, "{}", e),
            FunctionBody::Block(stmts) => write!(f, "{{ {} statements }}", stmts.len()),
        }
    }
}
