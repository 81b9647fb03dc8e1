//! Central expression lowering (spec §4.5.2, §4.5.3). Handles every
//! `Expression` variant except top-level aggregate/window `FunctionCall`s,
//! which `select::build_stages` hoists into `$group`/`$setWindowFields`
//! stages before general expression lowering ever sees them.

use bson::{Bson, Document, bson};

use crate::catalogue::{FunctionKind, Recipe, catalogue};
use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{BinaryOp, Expression, FunctionCall, InSource, Literal, SubqueryKind, UnaryOp};
use crate::parser::TUPLE_MARKER;

use super::ordering::{like_pattern_to_regex, regex_match};
use super::subquery::{lower_exists_subquery, lower_in_subquery, lower_row_subquery, lower_scalar_subquery};
use super::{LowerCtx, Scope};

/// A 24-character hex string compared against `_id`/`id` is treated as an
/// `ObjectId` literal (SPEC_FULL.md's MongoDB-identity supplement), not a
/// plain string.
pub(crate) fn looks_like_object_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub(crate) fn is_object_id_column(expr: &Expression) -> bool {
    matches!(expr, Expression::Column(id) if id.name.eq_ignore_ascii_case("_id") || id.name.eq_ignore_ascii_case("id"))
}

pub(crate) fn lower_literal(lit: &Literal) -> TranslationResult<Bson> {
    Ok(match lit {
        Literal::Integer(n) => Bson::Int64(*n),
        Literal::Float(f) => Bson::Double(*f),
        Literal::String(s) => Bson::String(s.clone()),
        Literal::Boolean(b) => Bson::Boolean(*b),
        Literal::Null => Bson::Null,
        Literal::Date(s) => bson!({ "$dateFromString": { "dateString": s.clone() } }),
        Literal::Interval(amount, unit) => {
            bson!({ "__amount": amount, "__unit": unit.mongo_unit() })
        }
    })
}

/// Lowers a string literal into an `ObjectId` when the expression it is
/// compared against is an `_id`/`id` column and it looks like one.
fn lower_value_against(other_side: &Expression, this_side: &Expression) -> TranslationResult<Option<Bson>> {
    if !is_object_id_column(other_side) {
        return Ok(None);
    }
    if let Expression::Lit(Literal::String(s)) = this_side {
        if looks_like_object_id(s) {
            let oid = bson::oid::ObjectId::parse_str(s).map_err(|_| {
                ErrorKind::UnsupportedArgument {
                    function: "_id comparison".to_string(),
                    message: format!("`{s}` is not a valid ObjectId"),
                }
            })?;
            return Ok(Some(Bson::ObjectId(oid)));
        }
    }
    Ok(None)
}

pub(crate) fn lower_expression(
    expr: &Expression,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    match expr {
        Expression::Column(id) => Ok(Bson::String(scope.field_path(id))),
        Expression::Lit(lit) => lower_literal(lit),
        Expression::Unary(op, inner) => lower_unary(*op, inner, scope, ctx, pipeline),
        Expression::Binary(op, lhs, rhs) => lower_binary(*op, lhs, rhs, scope, ctx, pipeline),
        Expression::Like {
            expr: target,
            pattern,
            negated,
        } => {
            let input = lower_expression(target, scope, ctx, pipeline)?;
            let Expression::Lit(Literal::String(pat)) = pattern.as_ref() else {
                return Err(ErrorKind::UnsupportedArgument {
                    function: "LIKE".to_string(),
                    message: "pattern must be a string literal".to_string(),
                }
                .into());
            };
            let m = regex_match(input, pat);
            Ok(if *negated { bson!({ "$not": [m] }) } else { m })
        }
        Expression::Regexp {
            expr: target,
            pattern,
            negated,
        } => {
            let input = lower_expression(target, scope, ctx, pipeline)?;
            let pat = lower_expression(pattern, scope, ctx, pipeline)?;
            let m = bson!({ "$regexMatch": { "input": input, "regex": pat } });
            Ok(if *negated { bson!({ "$not": [m] }) } else { m })
        }
        Expression::In { expr: target, source, negated } => {
            lower_in(target, source, *negated, scope, ctx, pipeline)
        }
        Expression::Between { expr: target, low, high } => {
            let t = lower_expression(target, scope, ctx, pipeline)?;
            let l = lower_expression(low, scope, ctx, pipeline)?;
            let h = lower_expression(high, scope, ctx, pipeline)?;
            Ok(bson!({ "$and": [{ "$gte": [t.clone(), l] }, { "$lte": [t, h] }] }))
        }
        Expression::IsNull { expr: target, negated } => {
            let t = lower_expression(target, scope, ctx, pipeline)?;
            let eq_null = bson!({ "$eq": [t, Bson::Null] });
            Ok(if *negated { bson!({ "$not": [eq_null] }) } else { eq_null })
        }
        Expression::FunctionCall(call) => lower_call(call, scope, ctx, pipeline),
        Expression::Case(case) => super::conditional::lower_case(case, scope, ctx, pipeline),
        Expression::If { cond, then_branch, else_branch } => {
            super::conditional::lower_if(cond, then_branch, else_branch, scope, ctx, pipeline)
        }
        Expression::Coalesce(args) => super::conditional::lower_coalesce(args, scope, ctx, pipeline),
        Expression::NullIf(a, b) => super::conditional::lower_nullif(a, b, scope, ctx, pipeline),
        Expression::Subquery { query, kind } => match kind {
            SubqueryKind::Scalar => lower_scalar_subquery(query, scope, ctx, pipeline),
            SubqueryKind::Exists => lower_exists_subquery(query, scope, ctx, pipeline, false),
            SubqueryKind::NotExists => lower_exists_subquery(query, scope, ctx, pipeline, true),
            SubqueryKind::Row => Err(ErrorKind::UnsupportedConstruct(
                "row subquery is only valid as the right-hand side of a tuple equality".to_string(),
            )
            .into()),
        },
        Expression::Star => Err(ErrorKind::UnsupportedConstruct(
            "`*` is only valid as a bare projection".to_string(),
        )
        .into()),
        Expression::QualifiedStar(_) => Err(ErrorKind::UnsupportedConstruct(
            "qualified `*` is only valid as a bare projection".to_string(),
        )
        .into()),
    }
}

fn lower_unary(
    op: UnaryOp,
    inner: &Expression,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let v = lower_expression(inner, scope, ctx, pipeline)?;
    Ok(match op {
        UnaryOp::Neg => bson!({ "$multiply": [v, -1] }),
        UnaryOp::Not => bson!({ "$not": [v] }),
        UnaryOp::BitNot => bson!({ "$bitNot": v }),
    })
}

fn lower_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    // `(a, b) = (SELECT ...)` row-subquery promotion (spec §4.5.2): the
    // tuple marker and a Row-kind subquery only ever occur together as the
    // two children of one `=` node, never reachable from the generic
    // per-kind subquery dispatch above.
    if op == BinaryOp::Eq {
        if let (Expression::FunctionCall(f), Expression::Subquery { query, kind: SubqueryKind::Row }) =
            (lhs, rhs)
        {
            if f.name == TUPLE_MARKER {
                return lower_row_subquery(&f.args, query, scope, ctx, pipeline);
            }
        }
    }

    if matches!(op, BinaryOp::Eq | BinaryOp::Neq) {
        if let Some(oid) = lower_value_against(lhs, rhs)? {
            let l = lower_expression(lhs, scope, ctx, pipeline)?;
            let mongo_op = if op == BinaryOp::Eq { "$eq" } else { "$ne" };
            return Ok(bson!({ mongo_op: [l, oid] }));
        }
        if let Some(oid) = lower_value_against(rhs, lhs)? {
            let r = lower_expression(rhs, scope, ctx, pipeline)?;
            let mongo_op = if op == BinaryOp::Eq { "$eq" } else { "$ne" };
            return Ok(bson!({ mongo_op: [oid, r] }));
        }
    }

    let l = lower_expression(lhs, scope, ctx, pipeline)?;
    let r = lower_expression(rhs, scope, ctx, pipeline)?;
    let mongo_op = match op {
        BinaryOp::Add => "$add",
        BinaryOp::Sub => "$subtract",
        BinaryOp::Mul => "$multiply",
        BinaryOp::Div => "$divide",
        BinaryOp::Mod => "$mod",
        BinaryOp::Eq => "$eq",
        BinaryOp::Neq => "$ne",
        BinaryOp::Lt => "$lt",
        BinaryOp::Lte => "$lte",
        BinaryOp::Gt => "$gt",
        BinaryOp::Gte => "$gte",
        BinaryOp::And => "$and",
        BinaryOp::Or => "$or",
        BinaryOp::Concat => "$concat",
        BinaryOp::BitAnd => "$bitAnd",
        BinaryOp::BitOr => "$bitOr",
        BinaryOp::BitXor => "$bitXor",
    };
    Ok(bson!({ mongo_op: [l, r] }))
}

fn lower_in(
    target: &Expression,
    source: &InSource,
    negated: bool,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    match source {
        InSource::List(items) => {
            let t = lower_expression(target, scope, ctx, pipeline)?;
            let mut lowered = Vec::with_capacity(items.len());
            for item in items {
                lowered.push(lower_expression(item, scope, ctx, pipeline)?);
            }
            let membership = bson!({ "$in": [t, lowered] });
            Ok(if negated { bson!({ "$not": [membership] }) } else { membership })
        }
        InSource::Subquery(query) => lower_in_subquery(target, query, negated, scope, ctx, pipeline),
    }
}

pub(crate) fn lower_call(
    call: &FunctionCall,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    // Aggregate/window calls are hoisted into `$group`/`$setWindowFields`
    // stages by `select::build_stages` before general expression lowering
    // runs; by the time we get here they resolve as plain field lookups.
    if let Some(field) = scope.resolve_hoisted(call) {
        return Ok(Bson::String(format!("${field}")));
    }
    let entry = catalogue().get(&call.name).ok_or_else(|| ErrorKind::UnknownFunction(call.name.clone()))?;
    match &entry.recipe {
        Recipe::Aggregate(_) | Recipe::Window(_) => Err(ErrorKind::UnsupportedConstruct(format!(
            "{} is an aggregate/window function and must appear directly in SELECT/HAVING/ORDER BY, not nested in an expression",
            call.name
        ))
        .into()),
        Recipe::Scalar(f) => {
            entry.check_arity(call.args.len())?;
            let mut args = Vec::with_capacity(call.args.len());
            for a in &call.args {
                args.push(lower_expression(a, scope, ctx, pipeline)?);
            }
            debug_assert!(entry.kind == FunctionKind::Scalar);
            f(&call.name, &args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Identifier;

    fn scope() -> Scope {
        Scope {
            base: Some("o".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn column_lowers_to_field_path() {
        let mut pipeline = Vec::new();
        let id = Identifier { name: "total".to_string(), qualifier: None };
        let out = lower_expression(&Expression::Column(id), &scope(), &LowerCtx::new(&Default::default()), &mut pipeline).unwrap();
        assert_eq!(out, Bson::String("$total".to_string()));
    }

    #[test]
    fn object_id_string_literal_coerces_against_id_column() {
        let ctx = LowerCtx::new(&Default::default());
        let mut pipeline = Vec::new();
        let lhs = Expression::Column(Identifier { name: "_id".to_string(), qualifier: None });
        let rhs = Expression::Lit(Literal::String("507f1f77bcf86cd799439011".to_string()));
        let out = lower_binary(BinaryOp::Eq, &lhs, &rhs, &scope(), &ctx, &mut pipeline).unwrap();
        let Bson::Document(d) = &out else { panic!() };
        let Bson::Array(args) = d.get("$eq").unwrap() else { panic!() };
        assert!(matches!(args[1], Bson::ObjectId(_)));
    }

    #[test]
    fn non_id_string_literal_is_not_coerced() {
        let ctx = LowerCtx::new(&Default::default());
        let mut pipeline = Vec::new();
        let lhs = Expression::Column(Identifier { name: "name".to_string(), qualifier: None });
        let rhs = Expression::Lit(Literal::String("507f1f77bcf86cd799439011".to_string()));
        let out = lower_binary(BinaryOp::Eq, &lhs, &rhs, &scope(), &ctx, &mut pipeline).unwrap();
        let Bson::Document(d) = &out else { panic!() };
        let Bson::Array(args) = d.get("$eq").unwrap() else { panic!() };
        assert!(matches!(args[1], Bson::String(_)));
    }

    #[test]
    fn like_pattern_compiles_to_anchored_regex_match() {
        let ctx = LowerCtx::new(&Default::default());
        let mut pipeline = Vec::new();
        let target = Expression::Column(Identifier { name: "name".to_string(), qualifier: None });
        let pattern = Expression::Lit(Literal::String("A%".to_string()));
        let out = lower_expression(
            &Expression::Like { expr: Box::new(target), pattern: Box::new(pattern), negated: false },
            &scope(),
            &ctx,
            &mut pipeline,
        )
        .unwrap();
        assert_eq!(out, bson!({ "$regexMatch": { "input": "$name", "regex": "^A.*" } }));
    }
}
