//! Typed `where` conditions
//!
//! Conditions are either an [`Expr`] tree interpreted here, or a compiled
//! closure supplied by the caller. Rule files can only produce the former,
//! so nothing read from disk is ever executed as code.

use concord_types::{Event, GlobalState, Payload};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Expression over the triggering event and the global state
///
/// Serialized externally tagged, so a rule file can write
/// `{ gt: [ { state: "Counter.value" }, { literal: 10 } ] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// A constant
    Literal(Payload),
    /// Dotted path into the triggering event's payload
    Event(String),
    /// Dotted path `<concept name>.<field>[.<field>...]` into the global state
    State(String),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<Payload>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn event(path: impl Into<String>) -> Self {
        Expr::Event(path.into())
    }

    pub fn state(path: impl Into<String>) -> Self {
        Expr::State(path.into())
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Eq(Box::new(lhs), Box::new(rhs))
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Expr::Ne(Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Expr::Lt(Box::new(lhs), Box::new(rhs))
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Expr::Le(Box::new(lhs), Box::new(rhs))
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Expr::Gt(Box::new(lhs), Box::new(rhs))
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Expr::Ge(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    /// Evaluate to a value; missing paths evaluate to `null`
    pub fn eval(&self, event: &Event, state: &GlobalState) -> Payload {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Event(path) => event_path(event.payload(), path)
                .cloned()
                .unwrap_or(Payload::Null),
            Expr::State(path) => state.lookup(path).cloned().unwrap_or(Payload::Null),
            Expr::Eq(lhs, rhs) => Payload::Bool(values_equal(
                &lhs.eval(event, state),
                &rhs.eval(event, state),
            )),
            Expr::Ne(lhs, rhs) => Payload::Bool(!values_equal(
                &lhs.eval(event, state),
                &rhs.eval(event, state),
            )),
            Expr::Lt(lhs, rhs) => ordered(lhs, rhs, event, state, |o| o == Ordering::Less),
            Expr::Le(lhs, rhs) => ordered(lhs, rhs, event, state, |o| o != Ordering::Greater),
            Expr::Gt(lhs, rhs) => ordered(lhs, rhs, event, state, |o| o == Ordering::Greater),
            Expr::Ge(lhs, rhs) => ordered(lhs, rhs, event, state, |o| o != Ordering::Less),
            Expr::And(items) => {
                Payload::Bool(items.iter().all(|item| item.holds(event, state)))
            }
            Expr::Or(items) => Payload::Bool(items.iter().any(|item| item.holds(event, state))),
            Expr::Not(inner) => Payload::Bool(!inner.holds(event, state)),
        }
    }

    /// Evaluate and interpret the result as a boolean
    pub fn holds(&self, event: &Event, state: &GlobalState) -> bool {
        truthy(&self.eval(event, state))
    }
}

fn event_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Payload> {
    let mut current = payload;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

fn ordered(
    lhs: &Expr,
    rhs: &Expr,
    event: &Event,
    state: &GlobalState,
    accept: impl Fn(Ordering) -> bool,
) -> Payload {
    let result = compare(&lhs.eval(event, state), &rhs.eval(event, state)).is_some_and(accept);
    Payload::Bool(result)
}

/// Numbers compare numerically (so `1 == 1.0`); everything else structurally
fn values_equal(lhs: &Payload, rhs: &Payload) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

/// Ordering for numbers, strings and booleans; `None` for anything else
fn compare(lhs: &Payload, rhs: &Payload) -> Option<Ordering> {
    match (lhs, rhs) {
        (Payload::Number(a), Payload::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Payload::String(a), Payload::String(b)) => Some(a.cmp(b)),
        (Payload::Bool(a), Payload::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// `null`, `false`, zero and empty strings/collections are false
pub fn truthy(value: &Payload) -> bool {
    match value {
        Payload::Null => false,
        Payload::Bool(b) => *b,
        Payload::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Payload::String(s) => !s.is_empty(),
        Payload::Array(items) => !items.is_empty(),
        Payload::Object(map) => !map.is_empty(),
    }
}

type StatePredicate = Arc<dyn Fn(&GlobalState) -> bool + Send + Sync>;

/// The `where` clause of a synchronization
#[derive(Clone)]
pub enum Condition {
    /// Interpreted expression tree
    Expr(Expr),
    /// Compiled predicate over the global state
    Predicate(StatePredicate),
}

impl Condition {
    /// Wrap a closure over the global state
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&GlobalState) -> bool + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    pub fn holds(&self, event: &Event, state: &GlobalState) -> bool {
        match self {
            Condition::Expr(expr) => expr.holds(event, state),
            Condition::Predicate(predicate) => predicate(state),
        }
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Condition::Expr(expr)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(<closure>)"),
        }
    }
}
