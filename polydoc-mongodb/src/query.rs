//! Translation of filter expressions into MongoDB query documents.

use bson::{Bson, Document, doc};

use polydoc_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates [`Expr`] trees into MongoDB's native query syntax.
///
/// Field paths are passed through unchanged so dotted paths reach into nested documents.
/// String operators escape their operand before building a `$regex`.
pub(crate) struct MongoQueryTranslator;

fn escape(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn string_operand<'v>(op: &str, value: &'v Bson) -> Result<&'v str, DocumentStoreError> {
    value
        .as_str()
        .ok_or_else(|| DocumentStoreError::Backend(format!("{} operator requires a string value", op)))
}

fn list_operand(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` only applies to operator expressions; `$nor` negates a whole filter.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape(s) },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape(s) } },
                    other => doc! { "$not": { "$elemMatch": { "$eq": other } } },
                },
                FieldOp::StartsWith => {
                    doc! { "$regex": format!("^{}", escape(string_operand("StartsWith", value)?)) }
                }
                FieldOp::EndsWith => {
                    doc! { "$regex": format!("{}$", escape(string_operand("EndsWith", value)?)) }
                }
                FieldOp::AnyOf => doc! { "$in": list_operand(value) },
                FieldOp::NoneOf => doc! { "$nin": list_operand(value) },
            }
        })
    }
}
