//! Query expression evaluation for in-memory document filtering.
//!
//! Follows document-database matching rules: equality against an array field matches when
//! any element is equal, dotted paths reach into nested documents, and a missing field
//! compares like `null`.

use bson::{Binary, Bson, Document as RawDocument, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use polydoc_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Types without a dedicated variant compare by raw
/// equality and have no ordering.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Binary(&'a Binary),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            Bson::Binary(binary) => Comparable::Binary(binary),
            Bson::Undefined => Comparable::Null,
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            // Length first, then subtype, then bytes.
            (Comparable::Binary(a), Comparable::Binary(b)) => Some(
                a.bytes
                    .len()
                    .cmp(&b.bytes.len())
                    .then_with(|| u8::from(a.subtype).cmp(&u8::from(b.subtype)))
                    .then_with(|| a.bytes.cmp(&b.bytes)),
            ),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Equal to `other`, or an array holding an element equal to it.
    fn matches(&self, other: &Comparable<'a>) -> bool {
        self == other
            || matches!(self, Comparable::Array(items) if items.iter().any(|item| item == other))
    }

    /// Sort rank across types, so mixed-type fields still sort deterministically.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Binary(_) => 8,
            Comparable::Other(_) => 9,
        }
    }

    /// Total order used for sorting results.
    pub(crate) fn sort_cmp(&self, other: &Comparable<'a>) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

/// Resolves a dotted path such as `author.address.country`.
pub(crate) fn lookup<'d>(document: &'d RawDocument, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(nested) => nested.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a RawDocument,
}

impl<'a> DocumentEvaluator<'a> {
    /// Evaluator bound to a single record.
    pub fn new(document: &'a RawDocument) -> Self {
        Self { document }
    }

    /// Whether the record satisfies `expr`.
    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Whether `document` matches `filter`. A missing filter matches everything.
    pub fn matches(document: &RawDocument, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }

    fn compare(field_value: &Bson, op: &FieldOp, value: &Bson) -> bool {
        let left = Comparable::from(field_value);
        let right = Comparable::from(value);

        match op {
            FieldOp::Eq => left.matches(&right),
            FieldOp::Ne => !left.matches(&right),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => match left.partial_cmp(&right) {
                Some(ordering) => match op {
                    FieldOp::Gt => ordering == Ordering::Greater,
                    FieldOp::Gte => ordering != Ordering::Less,
                    FieldOp::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                },
                None => false,
            },
            FieldOp::Contains => match (&left, &right) {
                (Comparable::Array(items), _) => items.iter().any(|item| item == &right),
                (Comparable::String(haystack), Comparable::String(needle)) => haystack.contains(needle),
                _ => false,
            },
            FieldOp::NotContains => !Self::compare(field_value, &FieldOp::Contains, value),
            FieldOp::StartsWith => match (&left, &right) {
                (Comparable::String(s), Comparable::String(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            FieldOp::EndsWith => match (&left, &right) {
                (Comparable::String(s), Comparable::String(suffix)) => s.ends_with(suffix),
                _ => false,
            },
            FieldOp::AnyOf => match &right {
                Comparable::Array(candidates) => candidates.iter().any(|candidate| left.matches(candidate)),
                single => left.matches(single),
            },
            FieldOp::NoneOf => !Self::compare(field_value, &FieldOp::AnyOf, value),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        match lookup(self.document, field) {
            Some(field_value) => Ok(Self::compare(field_value, op, value)),
            None => Ok(match op {
                FieldOp::Eq => *value == Bson::Null,
                FieldOp::Ne => *value != Bson::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                _ => false,
            }),
        }
    }
}
