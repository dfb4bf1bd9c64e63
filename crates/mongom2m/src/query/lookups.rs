//! Query lookups and Q objects for building filters.
//!
//! [`Lookup`] is a field-level comparison and [`Q`] combines lookups with AND,
//! OR, and NOT. Together they are the host-side filter syntax: query sets,
//! relationship managers, and the relationship predicate translator all take
//! a `Q`.
//!
//! # Examples
//!
//! ```
//! use mongom2m::query::lookups::{Q, Lookup};
//! use mongom2m::value::Value;
//!
//! // name = "Alice" AND age > 25
//! let q = Q::filter("name", Lookup::Exact(Value::from("Alice")))
//!     & Q::filter("age", Lookup::Gt(Value::from(25)));
//!
//! // NOT(active = false)
//! let negated = !Q::filter("active", Lookup::Exact(Value::from(false)));
//! assert_eq!(negated.to_string(), "NOT (active=false)");
//! ```

use std::fmt;
use std::ops;

use crate::value::Value;

/// A field-level lookup operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match.
    Exact(Value),
    /// Case-insensitive exact match.
    IExact(Value),
    /// Substring match.
    Contains(String),
    /// Case-insensitive substring match.
    IContains(String),
    /// Membership test.
    In(Vec<Value>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Prefix match.
    StartsWith(String),
    /// Case-insensitive prefix match.
    IStartsWith(String),
    /// Suffix match.
    EndsWith(String),
    /// Case-insensitive suffix match.
    IEndsWith(String),
    /// Inclusive range test.
    Range(Value, Value),
    /// NULL / missing test.
    IsNull(bool),
    /// Regular expression match.
    Regex(String),
    /// Case-insensitive regular expression match.
    IRegex(String),
}

impl Lookup {
    /// The Django-style suffix of this lookup (`exact`, `in`, `gt`, ...).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::IExact(_) => "iexact",
            Self::Contains(_) => "contains",
            Self::IContains(_) => "icontains",
            Self::In(_) => "in",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::StartsWith(_) => "startswith",
            Self::IStartsWith(_) => "istartswith",
            Self::EndsWith(_) => "endswith",
            Self::IEndsWith(_) => "iendswith",
            Self::Range(..) => "range",
            Self::IsNull(_) => "isnull",
            Self::Regex(_) => "regex",
            Self::IRegex(_) => "iregex",
        }
    }

    /// Applies `f` to every value operand, keeping the lookup kind.
    ///
    /// String-pattern lookups carry no value operand and are returned as is.
    pub fn try_map_values<E>(
        self,
        mut f: impl FnMut(Value) -> Result<Value, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::Exact(v) => Self::Exact(f(v)?),
            Self::IExact(v) => Self::IExact(f(v)?),
            Self::In(vs) => Self::In(vs.into_iter().map(f).collect::<Result<_, _>>()?),
            Self::Gt(v) => Self::Gt(f(v)?),
            Self::Gte(v) => Self::Gte(f(v)?),
            Self::Lt(v) => Self::Lt(f(v)?),
            Self::Lte(v) => Self::Lte(f(v)?),
            Self::Range(lo, hi) => Self::Range(f(lo)?, f(hi)?),
            other => other,
        })
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::IExact(v) | Self::Gt(v) | Self::Gte(v) | Self::Lt(v) | Self::Lte(v) => {
                write!(f, "{v}")
            }
            Self::Contains(s)
            | Self::IContains(s)
            | Self::StartsWith(s)
            | Self::IStartsWith(s)
            | Self::EndsWith(s)
            | Self::IEndsWith(s)
            | Self::Regex(s)
            | Self::IRegex(s) => write!(f, "{s}"),
            Self::In(vs) => write!(f, "{}", Value::List(vs.clone())),
            Self::Range(lo, hi) => write!(f, "({lo}, {hi})"),
            Self::IsNull(b) => write!(f, "{b}"),
        }
    }
}

/// A composable query filter, equivalent to Django's `Q` object.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single field lookup.
    Filter {
        /// The field name or dotted path.
        field: String,
        /// The lookup operation.
        lookup: Lookup,
    },
    /// Logical AND of multiple conditions.
    And(Vec<Q>),
    /// Logical OR of multiple conditions.
    Or(Vec<Q>),
    /// Logical negation of a condition.
    Not(Box<Q>),
}

impl Q {
    /// Creates a new filter Q object.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    /// Shorthand for `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::filter(field, Lookup::Exact(value.into()))
    }

    /// Returns `true` if this is an empty AND/OR (always true).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Returns every field name referenced by the leaves of this tree.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Filter { field, .. } => vec![field.as_str()],
            Self::And(children) | Self::Or(children) => {
                children.iter().flat_map(Self::fields).collect()
            }
            Self::Not(inner) => inner.fields(),
        }
    }
}

impl fmt::Display for Q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Q], sep: &str) -> fmt::Result {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "({child})")?;
            }
            Ok(())
        }

        match self {
            Self::Filter {
                field,
                lookup: lookup @ Lookup::Exact(_),
            } => write!(f, "{field}={lookup}"),
            Self::Filter { field, lookup } => write!(f, "{field}__{}={lookup}", lookup.name()),
            Self::And(children) => join(f, children, "AND"),
            Self::Or(children) => join(f, children, "OR"),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ANDs
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ORs
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        // Double negation cancellation
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
