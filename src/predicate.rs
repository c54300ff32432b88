//! Predicate trees for `CollectionService::find`/`delete_many` (spec §9,
//! "expression-tree predicate parsing").
//!
//! The host language builds one of these instead of the engine reflecting
//! on a lambda: a tagged tree of comparisons over field paths. The engine
//! evaluates it directly against a document, and separately inspects it to
//! see whether it can be answered (or narrowed) with an index scan instead
//! of a full collection scan.

use std::ops::Bound;

use crate::codec::{Document, Value};
use crate::index::{make_key, IndexDefinition};

/// A boolean expression over a document's fields.
///
/// `Eq`/`Lt`/`Le`/`Gt`/`Ge`/`Contains`/`StartsWith`/`EndsWith` take two
/// operands, each itself a [`Predicate`] — ordinarily a [`Predicate::FieldRef`]
/// on the left and a [`Predicate::Literal`] on the right, mirroring the
/// shape of an expression tree built from a host-language lambda.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Eq(Box<Predicate>, Box<Predicate>),
    Lt(Box<Predicate>, Box<Predicate>),
    Le(Box<Predicate>, Box<Predicate>),
    Gt(Box<Predicate>, Box<Predicate>),
    Ge(Box<Predicate>, Box<Predicate>),
    Contains(Box<Predicate>, Box<Predicate>),
    StartsWith(Box<Predicate>, Box<Predicate>),
    EndsWith(Box<Predicate>, Box<Predicate>),
    /// A (possibly dotted, e.g. `"address.city"`) path into the document.
    FieldRef(String),
    Literal(Value),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(Box::new(Self::FieldRef(field.into())), Box::new(Self::Literal(value.into())))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(Box::new(Self::FieldRef(field.into())), Box::new(Self::Literal(value.into())))
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Le(Box::new(Self::FieldRef(field.into())), Box::new(Self::Literal(value.into())))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(Box::new(Self::FieldRef(field.into())), Box::new(Self::Literal(value.into())))
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ge(Box::new(Self::FieldRef(field.into())), Box::new(Self::Literal(value.into())))
    }

    pub fn and(clauses: Vec<Predicate>) -> Self {
        Self::And(clauses)
    }

    pub fn or(clauses: Vec<Predicate>) -> Self {
        Self::Or(clauses)
    }

    pub fn not(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Resolve a leaf operand (`FieldRef` or `Literal`) against a document.
    /// Dotted field paths descend into nested documents. Returns `None` if
    /// the path is absent or this node isn't a leaf.
    fn resolve<'a>(&'a self, doc: &'a Document) -> Option<&'a Value> {
        match self {
            Predicate::Literal(v) => Some(v),
            Predicate::FieldRef(path) => lookup_path(doc, path),
            _ => None,
        }
    }

    /// Evaluate this predicate against `doc`.
    pub fn eval(&self, doc: &Document) -> bool {
        match self {
            Predicate::And(clauses) => clauses.iter().all(|p| p.eval(doc)),
            Predicate::Or(clauses) => clauses.iter().any(|p| p.eval(doc)),
            Predicate::Not(inner) => !inner.eval(doc),
            Predicate::Eq(a, b) => compare(a, b, doc, |o| o == std::cmp::Ordering::Equal),
            Predicate::Lt(a, b) => compare(a, b, doc, |o| o == std::cmp::Ordering::Less),
            Predicate::Le(a, b) => compare(a, b, doc, |o| o != std::cmp::Ordering::Greater),
            Predicate::Gt(a, b) => compare(a, b, doc, |o| o == std::cmp::Ordering::Greater),
            Predicate::Ge(a, b) => compare(a, b, doc, |o| o != std::cmp::Ordering::Less),
            Predicate::Contains(a, b) => string_or_array_op(a, b, doc, |hay, needle| hay.contains(needle)),
            Predicate::StartsWith(a, b) => string_or_array_op(a, b, doc, |hay, needle| hay.starts_with(needle)),
            Predicate::EndsWith(a, b) => string_or_array_op(a, b, doc, |hay, needle| hay.ends_with(needle)),
            // A bare FieldRef/Literal isn't a boolean expression on its own;
            // treat it as "truthy" only for a non-null, non-false value.
            Predicate::FieldRef(_) | Predicate::Literal(_) => self
                .resolve(doc)
                .map(|v| !matches!(v, Value::Null | Value::Boolean(false)))
                .unwrap_or(false),
        }
    }

    /// If this predicate (or a clause of a top-level `And`) constrains
    /// `index`'s *first* field to a contiguous range, return that range so
    /// the caller can run an index scan instead of a full collection scan.
    /// Composite (multi-field) narrowing is not attempted — see DESIGN.md.
    pub fn as_index_range(&self, index: &IndexDefinition) -> Option<(Bound<Document>, Bound<Document>)> {
        let field = index.fields.first()?;
        let clauses: Vec<&Predicate> = match self {
            Predicate::And(clauses) => clauses.iter().collect(),
            other => vec![other],
        };

        let mut low = Bound::Unbounded;
        let mut high = Bound::Unbounded;
        let mut found = false;

        for clause in clauses {
            let (path, value, op) = match clause {
                Predicate::Eq(a, b) => (field_name(a)?, literal_value(b)?, '='),
                Predicate::Lt(a, b) => (field_name(a)?, literal_value(b)?, '<'),
                Predicate::Le(a, b) => (field_name(a)?, literal_value(b)?, 'l'),
                Predicate::Gt(a, b) => (field_name(a)?, literal_value(b)?, '>'),
                Predicate::Ge(a, b) => (field_name(a)?, literal_value(b)?, 'g'),
                _ => continue,
            };
            if path != field {
                continue;
            }
            let key = make_key(std::slice::from_ref(value));
            found = true;
            match op {
                '=' => {
                    low = Bound::Included(key.clone());
                    high = Bound::Included(key);
                }
                '<' => high = Bound::Excluded(key),
                'l' => high = Bound::Included(key),
                '>' => low = Bound::Excluded(key),
                'g' => low = Bound::Included(key),
                _ => unreachable!(),
            }
        }

        found.then_some((low, high))
    }
}

fn field_name(operand: &Predicate) -> Option<&str> {
    match operand {
        Predicate::FieldRef(name) => Some(name.as_str()),
        _ => None,
    }
}

fn literal_value(operand: &Predicate) -> Option<&Value> {
    match operand {
        Predicate::Literal(v) => Some(v),
        _ => None,
    }
}

fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn compare(a: &Predicate, b: &Predicate, doc: &Document, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let (Some(left), Some(right)) = (a.resolve(doc), b.resolve(doc)) else {
        return false;
    };
    match left.partial_cmp(right) {
        Some(ordering) => accept(ordering),
        None => false,
    }
}

fn string_or_array_op(a: &Predicate, b: &Predicate, doc: &Document, op: impl Fn(&str, &str) -> bool) -> bool {
    let (Some(left), Some(right)) = (a.resolve(doc), b.resolve(doc)) else {
        return false;
    };
    match (left, right) {
        (Value::String(hay), Value::String(needle)) => op(hay, needle),
        (Value::Array(items), needle) => items.contains(needle),
        _ => false,
    }
}
