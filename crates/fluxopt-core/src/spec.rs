//! # Procedure Specs
//!
//! Every plan node carries exactly one [`ProcedureSpec`], the operation-specific
//! payload of a physical operator. The set is closed: the compiler emits the
//! "universe" operators (`from`, `range`, `filter`, `keys`, `schemaMutation`,
//! `group`, `distinct`) and the rewrite rules produce the storage-backed reads
//! (`ReadRange`, `ReadTagKeys`, `ReadTagValues`).
//!
//! ## Kinds
//!
//! [`ProcedureKind`] strips a spec down to its discriminant. Patterns and the rule
//! registry dispatch on it, and the execution engine uses its string name to select
//! a physical implementation. Each kind also fixes the number of predecessors a node
//! of that kind has (`arity`): reads and `from` are sources, everything else is unary.

use crate::expr::{DisplayDuration, FunctionExpr};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TIME_COLUMN: &str = "_time";
pub const DEFAULT_VALUE_COLUMN: &str = "_value";
pub const DEFAULT_START_COLUMN: &str = "_start";
pub const DEFAULT_STOP_COLUMN: &str = "_stop";

/// Columns that every storage table carries and that are never tag keys.
pub const RESERVED_COLUMNS: [&str; 4] = [
    DEFAULT_TIME_COLUMN,
    DEFAULT_VALUE_COLUMN,
    DEFAULT_START_COLUMN,
    DEFAULT_STOP_COLUMN,
];

/// Operator kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcedureKind {
    #[serde(rename = "from")]
    From,
    #[serde(rename = "range")]
    Range,
    #[serde(rename = "filter")]
    Filter,
    #[serde(rename = "keys")]
    Keys,
    #[serde(rename = "schemaMutation")]
    SchemaMutation,
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "distinct")]
    Distinct,
    ReadRange,
    ReadTagKeys,
    ReadTagValues,
}

impl ProcedureKind {
    /// Stable name shared with the execution engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureKind::From => "from",
            ProcedureKind::Range => "range",
            ProcedureKind::Filter => "filter",
            ProcedureKind::Keys => "keys",
            ProcedureKind::SchemaMutation => "schemaMutation",
            ProcedureKind::Group => "group",
            ProcedureKind::Distinct => "distinct",
            ProcedureKind::ReadRange => "ReadRange",
            ProcedureKind::ReadTagKeys => "ReadTagKeys",
            ProcedureKind::ReadTagValues => "ReadTagValues",
        }
    }

    /// Number of predecessors a node of this kind has.
    pub fn arity(&self) -> usize {
        match self {
            ProcedureKind::From
            | ProcedureKind::ReadRange
            | ProcedureKind::ReadTagKeys
            | ProcedureKind::ReadTagValues => 0,
            ProcedureKind::Range
            | ProcedureKind::Filter
            | ProcedureKind::Keys
            | ProcedureKind::SchemaMutation
            | ProcedureKind::Group
            | ProcedureKind::Distinct => 1,
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in time, either relative to query execution time or absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Time {
    /// Signed offset from "now" in nanoseconds. `Relative(0)` is now.
    Relative(i64),
    /// Nanoseconds since the unix epoch.
    Absolute(i64),
}

impl Time {
    pub const NOW: Time = Time::Relative(0);
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Time::Relative(0) => write!(f, "now"),
            Time::Relative(d) => write!(f, "{}", DisplayDuration(*d)),
            Time::Absolute(ns) => write!(f, "{}ns", ns),
        }
    }
}

/// Time range restricting a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub start: Time,
    pub stop: Time,
}

impl Bounds {
    /// `range(start: <offset>)`, stopping at now.
    pub fn since(offset_nanos: i64) -> Self {
        Self {
            start: Time::Relative(offset_nanos),
            stop: Time::NOW,
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FromSpec {
    pub bucket: String,
    #[serde(default)]
    pub bucket_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeSpec {
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
    pub func: FunctionExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeysSpec {
    pub column: String,
}

/// One step of a `schemaMutation` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    /// Keep only the named columns, or the columns matching `predicate`.
    Keep {
        columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<FunctionExpr>,
    },
    /// Drop the named columns, or the columns matching `predicate`.
    Drop {
        columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<FunctionExpr>,
    },
    /// Rename columns, `(old, new)` pairs.
    Rename { columns: Vec<(String, String)> },
    /// Copy `column` into a new column `as_`.
    Duplicate {
        column: String,
        #[serde(rename = "as")]
        as_: String,
    },
}

impl Mutation {
    pub fn keep<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Mutation::Keep {
            columns: columns.into_iter().map(Into::into).collect(),
            predicate: None,
        }
    }

    pub fn drop<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Mutation::Drop {
            columns: columns.into_iter().map(Into::into).collect(),
            predicate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaMutationSpec {
    pub mutations: Vec<Mutation>,
}

/// Policy by which rows are partitioned into tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupMode {
    By,
    Except,
    None,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSpec {
    pub mode: GroupMode,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistinctSpec {
    pub column: String,
}

/// Storage read of one bucket over a time range, with an optional pushed filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadRangeSpec {
    pub bucket: String,
    #[serde(default)]
    pub bucket_id: String,
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FunctionExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadTagKeysSpec {
    pub read_range: ReadRangeSpec,
    pub value_column_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadTagValuesSpec {
    pub read_range: ReadRangeSpec,
    pub tag_key: String,
}

/// Operation-specific payload of a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProcedureSpec {
    #[serde(rename = "from")]
    From(FromSpec),
    #[serde(rename = "range")]
    Range(RangeSpec),
    #[serde(rename = "filter")]
    Filter(FilterSpec),
    #[serde(rename = "keys")]
    Keys(KeysSpec),
    #[serde(rename = "schemaMutation")]
    SchemaMutation(SchemaMutationSpec),
    #[serde(rename = "group")]
    Group(GroupSpec),
    #[serde(rename = "distinct")]
    Distinct(DistinctSpec),
    ReadRange(ReadRangeSpec),
    ReadTagKeys(ReadTagKeysSpec),
    ReadTagValues(ReadTagValuesSpec),
}

impl ProcedureSpec {
    pub fn kind(&self) -> ProcedureKind {
        match self {
            ProcedureSpec::From(_) => ProcedureKind::From,
            ProcedureSpec::Range(_) => ProcedureKind::Range,
            ProcedureSpec::Filter(_) => ProcedureKind::Filter,
            ProcedureSpec::Keys(_) => ProcedureKind::Keys,
            ProcedureSpec::SchemaMutation(_) => ProcedureKind::SchemaMutation,
            ProcedureSpec::Group(_) => ProcedureKind::Group,
            ProcedureSpec::Distinct(_) => ProcedureKind::Distinct,
            ProcedureSpec::ReadRange(_) => ProcedureKind::ReadRange,
            ProcedureSpec::ReadTagKeys(_) => ProcedureKind::ReadTagKeys,
            ProcedureSpec::ReadTagValues(_) => ProcedureKind::ReadTagValues,
        }
    }
}

fn write_read_range(f: &mut fmt::Formatter<'_>, r: &ReadRangeSpec) -> fmt::Result {
    write!(f, "bucket={:?}, bounds={}", r.bucket, r.bounds)?;
    if let Some(filter) = &r.filter {
        write!(f, ", filter={}", filter)?;
    }
    Ok(())
}

impl fmt::Display for ProcedureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind())?;
        match self {
            ProcedureSpec::From(s) => write!(f, "bucket={:?}", s.bucket)?,
            ProcedureSpec::Range(s) => write!(f, "bounds={}", s.bounds)?,
            ProcedureSpec::Filter(s) => write!(f, "fn={}", s.func)?,
            ProcedureSpec::Keys(s) => write!(f, "column={:?}", s.column)?,
            ProcedureSpec::SchemaMutation(s) => write!(f, "mutations={}", s.mutations.len())?,
            ProcedureSpec::Group(s) => write!(f, "mode={:?}, keys={:?}", s.mode, s.keys)?,
            ProcedureSpec::Distinct(s) => write!(f, "column={:?}", s.column)?,
            ProcedureSpec::ReadRange(s) => write_read_range(f, s)?,
            ProcedureSpec::ReadTagKeys(s) => {
                write_read_range(f, &s.read_range)?;
                write!(f, ", value_column={:?}", s.value_column_name)?;
            }
            ProcedureSpec::ReadTagValues(s) => {
                write_read_range(f, &s.read_range)?;
                write!(f, ", tag_key={:?}", s.tag_key)?;
            }
        }
        write!(f, ")")
    }
}
