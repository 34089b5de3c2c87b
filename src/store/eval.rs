//! Expression and filter evaluation for the in-process store
//!
//! Expressions and `$match` filters are compiled once per `aggregate` call,
//! so malformed pipelines are rejected before any document is touched and
//! evaluation itself never fails.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::pipeline::json_type_name;
use crate::{PipebenchError, Result};

/// Split a dotted field path (`imdb.rating`) into its segments
pub fn split_path(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Err(PipebenchError::InvalidPipeline(
            "field path is empty".to_string(),
        ));
    }
    if path.starts_with('$') {
        return Err(PipebenchError::InvalidPipeline(format!(
            "field path '{}' must not start with '$'",
            path
        )));
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PipebenchError::InvalidPipeline(format!(
            "field path '{}' has an empty segment",
            path
        )));
    }
    Ok(segments)
}

/// Resolve a field path, `None` when any segment is missing
pub fn get_path<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

/// Set a field path, creating (or replacing non-object) intermediate levels
pub fn set_path(doc: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

/// Remove a field path if present
pub fn remove_path(doc: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        current = match current.as_object_mut().and_then(|map| map.get_mut(segment)) {
            Some(next) => next,
            None => return,
        };
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(last);
    }
}

/// Canonical ordering across JSON types: missing/null, numbers, strings,
/// objects, arrays, booleans
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order over optional JSON values, missing sorting as null
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(Some(left), Some(right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            for ((left_key, left), (right_key, right)) in x.iter().zip(y.iter()) {
                let ordering = left_key
                    .cmp(right_key)
                    .then_with(|| compare_values(Some(left), Some(right)));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    type_rank(a) == type_rank(b) && compare_values(a, b) == Ordering::Equal
}

fn number(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Sum numbers, staying integral while every operand is an integer
fn sum_numbers(values: &[&Number]) -> Value {
    let integral = values
        .iter()
        .try_fold(0i64, |acc, n| n.as_i64().and_then(|v| acc.checked_add(v)));
    match integral {
        Some(total) => Value::Number(total.into()),
        None => number(values.iter().filter_map(|n| n.as_f64()).sum()),
    }
}

fn multiply_numbers(values: &[&Number]) -> Value {
    let integral = values
        .iter()
        .try_fold(1i64, |acc, n| n.as_i64().and_then(|v| acc.checked_mul(v)));
    match integral {
        Some(total) => Value::Number(total.into()),
        None => number(values.iter().filter_map(|n| n.as_f64()).product()),
    }
}

/// Folding expression operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accumulator {
    Avg,
    Sum,
    Min,
    Max,
}

/// Arithmetic expression operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arithmetic {
    Add,
    Multiply,
}

/// Compiled aggregation expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"$a.b"` field reference
    Field(Vec<String>),
    /// Constant value
    Literal(Value),
    /// Object whose values are expressions
    Object(Vec<(String, Expr)>),
    /// Array whose elements are expressions
    Array(Vec<Expr>),
    /// `$avg`, `$sum`, `$min`, `$max`; `spread` is the single-operand form,
    /// which folds over the elements of an array operand
    Accumulate {
        op: Accumulator,
        args: Vec<Expr>,
        spread: bool,
    },
    /// `$add`, `$multiply`
    Arithmetic { op: Arithmetic, args: Vec<Expr> },
}

impl Expr {
    /// Compile an expression from its JSON form
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.starts_with("$$") => Err(PipebenchError::UnsupportedStage(
                format!("variable reference '{}'", s),
            )),
            Value::String(s) if s.starts_with('$') => Ok(Expr::Field(split_path(&s[1..])?)),
            Value::Array(items) => Ok(Expr::Array(
                items.iter().map(Expr::parse).collect::<Result<_>>()?,
            )),
            Value::Object(map) => Self::parse_object(map),
            other => Ok(Expr::Literal(other.clone())),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self> {
        let operator = map.keys().find(|k| k.starts_with('$'));
        let Some(operator) = operator else {
            let fields = map
                .iter()
                .map(|(key, value)| Ok((key.clone(), Expr::parse(value)?)))
                .collect::<Result<_>>()?;
            return Ok(Expr::Object(fields));
        };

        if map.len() != 1 {
            return Err(PipebenchError::InvalidPipeline(format!(
                "expression object with operator '{}' must have exactly one key",
                operator
            )));
        }
        let argument = &map[operator];

        let accumulator = match operator.as_str() {
            "$literal" => return Ok(Expr::Literal(argument.clone())),
            "$avg" => Some(Accumulator::Avg),
            "$sum" => Some(Accumulator::Sum),
            "$min" => Some(Accumulator::Min),
            "$max" => Some(Accumulator::Max),
            _ => None,
        };
        if let Some(op) = accumulator {
            return Ok(match argument {
                Value::Array(items) => Expr::Accumulate {
                    op,
                    args: items.iter().map(Expr::parse).collect::<Result<_>>()?,
                    spread: false,
                },
                single => Expr::Accumulate {
                    op,
                    args: vec![Expr::parse(single)?],
                    spread: true,
                },
            });
        }

        let arithmetic = match operator.as_str() {
            "$add" => Arithmetic::Add,
            "$multiply" => Arithmetic::Multiply,
            other => {
                return Err(PipebenchError::UnsupportedStage(format!(
                    "expression operator '{}'",
                    other
                )))
            }
        };
        match argument {
            Value::Array(items) => Ok(Expr::Arithmetic {
                op: arithmetic,
                args: items.iter().map(Expr::parse).collect::<Result<_>>()?,
            }),
            other => Err(PipebenchError::InvalidPipeline(format!(
                "'{}' expects an array of operands, found {}",
                operator,
                json_type_name(other)
            ))),
        }
    }

    /// Evaluate against a document; `None` means the result is missing
    pub fn eval(&self, doc: &Value) -> Option<Value> {
        match self {
            Expr::Field(path) => get_path(doc, path).cloned(),
            Expr::Literal(value) => Some(value.clone()),
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, expr) in fields {
                    if let Some(value) = expr.eval(doc) {
                        map.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(map))
            }
            Expr::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|e| e.eval(doc).unwrap_or(Value::Null))
                    .collect(),
            )),
            Expr::Accumulate { op, args, spread } => {
                let mut operands = Vec::new();
                for arg in args {
                    match arg.eval(doc) {
                        Some(Value::Array(items)) if *spread => operands.extend(items),
                        Some(value) => operands.push(value),
                        None => {}
                    }
                }
                Some(accumulate(*op, &operands))
            }
            Expr::Arithmetic { op, args } => {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.eval(doc) {
                        Some(Value::Number(n)) => operands.push(n),
                        _ => return Some(Value::Null),
                    }
                }
                let refs: Vec<&Number> = operands.iter().collect();
                Some(match op {
                    Arithmetic::Add => sum_numbers(&refs),
                    Arithmetic::Multiply => multiply_numbers(&refs),
                })
            }
        }
    }
}

fn accumulate(op: Accumulator, operands: &[Value]) -> Value {
    let numbers: Vec<&Number> = operands
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect();

    match op {
        Accumulator::Sum => sum_numbers(&numbers),
        Accumulator::Avg if numbers.is_empty() => Value::Null,
        Accumulator::Avg => {
            let total: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            number(total / numbers.len() as f64)
        }
        Accumulator::Min | Accumulator::Max => {
            let best = numbers.iter().copied().reduce(|best, candidate| {
                let ordering = candidate
                    .as_f64()
                    .partial_cmp(&best.as_f64())
                    .unwrap_or(Ordering::Equal);
                let better = match op {
                    Accumulator::Min => ordering == Ordering::Less,
                    _ => ordering == Ordering::Greater,
                };
                if better {
                    candidate
                } else {
                    best
                }
            });
            best.map(|n| Value::Number(n.clone())).unwrap_or(Value::Null)
        }
    }
}

/// Single field condition inside `$match`
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

impl Condition {
    fn parse(operator: &str, argument: &Value) -> Result<Self> {
        let list = |argument: &Value| -> Result<Vec<Value>> {
            argument.as_array().cloned().ok_or_else(|| {
                PipebenchError::InvalidPipeline(format!("'{}' expects an array", operator))
            })
        };
        Ok(match operator {
            "$eq" => Condition::Eq(argument.clone()),
            "$ne" => Condition::Ne(argument.clone()),
            "$gt" => Condition::Gt(argument.clone()),
            "$gte" => Condition::Gte(argument.clone()),
            "$lt" => Condition::Lt(argument.clone()),
            "$lte" => Condition::Lte(argument.clone()),
            "$in" => Condition::In(list(argument)?),
            "$nin" => Condition::Nin(list(argument)?),
            "$exists" => Condition::Exists(match argument {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
                _ => true,
            }),
            other => {
                return Err(PipebenchError::UnsupportedStage(format!(
                    "query operator '{}'",
                    other
                )))
            }
        })
    }

    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(target) => equals(field, target),
            Condition::Ne(target) => !equals(field, target),
            Condition::Gt(target) => ordered(field, target, |o| o == Ordering::Greater),
            Condition::Gte(target) => ordered(field, target, |o| o != Ordering::Less),
            Condition::Lt(target) => ordered(field, target, |o| o == Ordering::Less),
            Condition::Lte(target) => ordered(field, target, |o| o != Ordering::Greater),
            Condition::In(targets) => targets.iter().any(|t| equals(field, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| equals(field, t)),
            Condition::Exists(expected) => field.is_some() == *expected,
        }
    }
}

/// Equality with array fields matching when any element matches
fn equals(field: Option<&Value>, target: &Value) -> bool {
    if values_equal(field, Some(target)) {
        return true;
    }
    match field {
        Some(Value::Array(items)) if !target.is_array() => {
            items.iter().any(|item| values_equal(Some(item), Some(target)))
        }
        _ => false,
    }
}

/// Range comparison restricted to values of the same type
fn ordered(field: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: Option<&Value>| {
        type_rank(value) == type_rank(Some(target)) && accept(compare_values(value, Some(target)))
    };
    match field {
        Some(Value::Array(items)) if !target.is_array() => items.iter().any(|i| check(Some(i))),
        other => check(other),
    }
}

/// Compiled `$match` filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field {
        path: Vec<String>,
        conditions: Vec<Condition>,
    },
}

impl Filter {
    /// Compile a `$match` document
    pub fn parse(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            PipebenchError::InvalidPipeline(format!(
                "$match expects an object, found {}",
                json_type_name(value)
            ))
        })?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, argument) in map {
            clauses.push(match key.as_str() {
                "$and" => Filter::And(Self::parse_list(key, argument)?),
                "$or" => Filter::Or(Self::parse_list(key, argument)?),
                "$nor" => Filter::Nor(Self::parse_list(key, argument)?),
                other if other.starts_with('$') => {
                    return Err(PipebenchError::UnsupportedStage(format!(
                        "query operator '{}'",
                        other
                    )))
                }
                path => Filter::Field {
                    path: split_path(path)?,
                    conditions: Self::parse_conditions(argument)?,
                },
            });
        }
        Ok(Filter::And(clauses))
    }

    fn parse_list(operator: &str, argument: &Value) -> Result<Vec<Filter>> {
        match argument.as_array() {
            Some(items) if !items.is_empty() => items.iter().map(Filter::parse).collect(),
            _ => Err(PipebenchError::InvalidPipeline(format!(
                "'{}' expects a non-empty array",
                operator
            ))),
        }
    }

    fn parse_conditions(argument: &Value) -> Result<Vec<Condition>> {
        match argument {
            Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map
                .iter()
                .map(|(operator, value)| Condition::parse(operator, value))
                .collect(),
            other => Ok(vec![Condition::Eq(other.clone())]),
        }
    }

    /// Whether a document passes the filter
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Filter::Field { path, conditions } => {
                let field = get_path(doc, path);
                conditions.iter().all(|c| c.matches(field))
            }
        }
    }
}
