//! `SELECT` lowering (spec §4.5, §4.7): the find-vs-aggregate decision,
//! pipeline stage assembly, joins, GROUP BY/window hoisting, and the
//! deterministic-ordering shim all live here.

use bson::{Bson, Document, bson, doc};

use crate::catalogue::{FunctionKind, Recipe, catalogue};
use crate::error::{ErrorKind, TranslationResult};
use crate::invocation::{Invocation, Op};
use crate::ir::{
    BinaryOp, Cte, Expression, FunctionCall, Identifier, InSource, Join, JoinKind, Literal,
    OrderByItem, OrderKey, Projection, SelectStatement, Statement, TableRef,
};
use crate::options::TranslateOptions;

use super::expr::{looks_like_object_id, lower_expression};
use super::ordering::{self, like_pattern_to_regex};
use super::{LowerCtx, Scope};

pub(crate) fn lower_select(
    select: &SelectStatement,
    _database: &str,
    ctx: &LowerCtx,
) -> TranslationResult<Invocation> {
    if is_find_eligible(select) {
        return lower_find(select, ctx);
    }
    let (collection, pipeline) = build_full_pipeline(select, ctx)?;
    let mut inv = Invocation::aggregate(collection, pipeline);
    if !select.order_by.is_empty() {
        inv.collation = Some(collation_document(ctx.options));
    }
    Ok(inv)
}

pub(crate) fn lower_with(
    ctes: &[Cte],
    body: &Statement,
    database: &str,
    ctx: &LowerCtx,
) -> TranslationResult<Invocation> {
    let Statement::Select(select) = body else {
        return Err(ErrorKind::UnsupportedConstruct(
            "WITH is only supported directly above a SELECT".to_string(),
        )
        .into());
    };

    let plain: Vec<Cte> = ctes.iter().filter(|c| !c.recursive).cloned().collect();
    let mut select = substitute_ctes(select, &plain);

    let recursive: Vec<&Cte> = ctes.iter().filter(|c| c.recursive).collect();
    let Some(cte) = recursive.first() else {
        return lower_select(&select, database, ctx);
    };
    if recursive.len() > 1 {
        return Err(ErrorKind::UnsupportedCTE(recursive[1].name.clone()).into());
    }

    let (base_collection, mut pre_stages) = lower_recursive_cte(cte, ctx)?;
    match &mut select.from {
        Some(TableRef::Named { name, .. }) if *name == cte.name => {
            *name = base_collection.clone();
        }
        _ => return Err(ErrorKind::UnsupportedCTE(cte.name.clone()).into()),
    }

    let (collection, pipeline) = build_full_pipeline(&select, ctx)?;
    pre_stages.extend(pipeline);
    let mut inv = Invocation::aggregate(collection, pre_stages);
    if !select.order_by.is_empty() {
        inv.collation = Some(collation_document(ctx.options));
    }
    Ok(inv)
}

/// Lowers a single self-referential-equality recursive CTE to `$graphLookup`
/// (spec §4.5.1 step 1): only `SELECT ... FROM base JOIN <cte-name> ON
/// base.child_key = <cte-name>.parent_key [WHERE anchor-filter]` is
/// recognised. Anything else (no self-join, a non-equality condition, extra
/// joins/GROUP BY/DISTINCT on the recursive term) raises `UnsupportedCTE`.
/// Returns the base collection name and the stages that materialise the
/// CTE's row set (anchor rows plus every row reached by the recursion),
/// meant to be spliced in ahead of the outer query's own pipeline.
fn lower_recursive_cte(cte: &Cte, ctx: &LowerCtx) -> TranslationResult<(String, Vec<Document>)> {
    let query = &cte.query;
    let Some(TableRef::Named { name: base_name, alias: base_alias }) = &query.from else {
        return Err(ErrorKind::UnsupportedCTE(cte.name.clone()).into());
    };
    if query.joins.len() != 1 || !query.group_by.is_empty() || query.having.is_some() || query.distinct {
        return Err(ErrorKind::UnsupportedCTE(cte.name.clone()).into());
    }
    let join = &query.joins[0];
    let self_alias = match &join.target {
        TableRef::Named { name, alias } if name == &cte.name => alias.clone().unwrap_or_else(|| name.clone()),
        _ => return Err(ErrorKind::UnsupportedCTE(cte.name.clone()).into()),
    };
    let (child_id, parent_id) = extract_join_keys(join.on.as_ref(), &self_alias)?;
    let connect_from_field = child_id.name.clone();
    let connect_to_field = parent_id.name.clone();
    let base_binding = base_alias.clone().unwrap_or_else(|| base_name.clone());

    let mut pipeline = Vec::new();
    if let Some(where_expr) = &query.where_clause {
        let scope = Scope {
            base: Some(base_binding),
            ..Default::default()
        };
        lower_filter(where_expr, &scope, ctx, &mut pipeline)?;
    }
    pipeline.push(doc! {
        "$graphLookup": {
            "from": base_name.clone(),
            "startWith": format!("${connect_from_field}"),
            "connectFromField": connect_from_field.clone(),
            "connectToField": connect_to_field.clone(),
            "as": "__descendants",
        }
    });
    // `$graphLookup` only ever finds descendants, never the anchor row
    // itself, so splice it back in before flattening: strip the produced
    // array off a copy of the current document, then concatenate it with
    // the descendants found.
    pipeline.push(doc! {
        "$set": { "__anchor": { "$mergeObjects": ["$$ROOT", { "__descendants": "$$REMOVE" }] } }
    });
    pipeline.push(doc! {
        "$set": { "__rows": { "$concatArrays": [["$__anchor"], "$__descendants"] } }
    });
    pipeline.push(doc! { "$unset": ["__anchor", "__descendants"] });
    pipeline.push(doc! { "$unwind": "$__rows" });
    pipeline.push(doc! { "$replaceRoot": { "newRoot": "$__rows" } });

    Ok((base_name.clone(), pipeline))
}

fn substitute_ctes(select: &SelectStatement, ctes: &[Cte]) -> SelectStatement {
    let mut out = select.clone();
    out.from = out.from.take().map(|t| substitute_table_ref(t, ctes));
    out.joins = out
        .joins
        .into_iter()
        .map(|mut j| {
            j.target = substitute_table_ref(j.target, ctes);
            j
        })
        .collect();
    out
}

/// Only FROM/JOIN targets at this statement's own level are substituted — a
/// CTE referenced only inside a nested subquery is a documented limitation.
fn substitute_table_ref(t: TableRef, ctes: &[Cte]) -> TableRef {
    if let TableRef::Named { name, alias } = &t {
        if let Some(cte) = ctes.iter().find(|c| &c.name == name) {
            let alias = alias.clone().unwrap_or_else(|| name.clone());
            return TableRef::Derived {
                query: Box::new(cte.query.clone()),
                alias,
            };
        }
    }
    t
}

/// Normalises `FROM a RIGHT JOIN b ON ...` into `FROM b LEFT JOIN a ON ...`
/// (MongoDB's `$lookup` has no native right-join form). Scoped to a single
/// RIGHT JOIN per statement; combined with other joins it is rejected.
fn normalize_right_joins(select: &mut SelectStatement) -> TranslationResult<()> {
    let right_count = select.joins.iter().filter(|j| j.kind == JoinKind::Right).count();
    if right_count == 0 {
        return Ok(());
    }
    if right_count > 1 || select.joins.len() > 1 {
        return Err(ErrorKind::UnsupportedConstruct(
            "RIGHT JOIN combined with other joins in the same statement is not supported".to_string(),
        )
        .into());
    }
    let join = select.joins.remove(0);
    let old_from = select.from.take().ok_or_else(|| {
        ErrorKind::UnsupportedConstruct("RIGHT JOIN requires a FROM clause".to_string())
    })?;
    select.from = Some(join.target);
    select.joins.push(Join {
        kind: JoinKind::Left,
        target: old_from,
        on: join.on,
    });
    Ok(())
}

/// FROM/JOIN/WHERE/window/GROUP BY/HAVING — the prefix shared by the
/// top-level aggregate path, derived-table resolution, and every subquery
/// shape. Stops short of DISTINCT/ORDER BY/projection/LIMIT so callers can
/// finish it their own way (subqueries project a single value or row).
pub(crate) fn lower_body(
    select: &SelectStatement,
    ctx: &LowerCtx,
    correlated: Vec<(Identifier, String)>,
) -> TranslationResult<(SelectStatement, String, Vec<Document>, Scope)> {
    let mut select = select.clone();
    normalize_right_joins(&mut select)?;

    let mut pipeline = Vec::new();
    let (collection, mut scope) = resolve_from(&select.from, ctx, &mut pipeline)?;
    scope.correlated = correlated;

    for join in &select.joins {
        lower_join(join, &mut scope, ctx, &mut pipeline)?;
    }
    if let Some(w) = &select.where_clause {
        lower_filter(w, &scope, ctx, &mut pipeline)?;
    }
    build_set_window_fields(&select, &mut scope, ctx, &mut pipeline)?;
    if query_has_aggregate(&select) {
        build_group_stage(&select, &mut scope, ctx, &mut pipeline)?;
        if let Some(h) = &select.having {
            lower_filter(h, &scope, ctx, &mut pipeline)?;
        }
    }
    Ok((select, collection, pipeline, scope))
}

/// `lower_body` plus DISTINCT/ORDER BY/projection/the ordering shim/
/// LIMIT+OFFSET — a fully self-contained pipeline, usable standalone (a
/// top-level aggregate statement) or nested (a derived table's FROM).
fn build_full_pipeline(select: &SelectStatement, ctx: &LowerCtx) -> TranslationResult<(String, Vec<Document>)> {
    let (select, collection, mut pipeline, scope) = lower_body(select, ctx, Vec::new())?;

    let has_limit = select.limit.is_some();
    let has_explicit_order = !select.order_by.is_empty();

    if select.distinct {
        build_projection_stage(&select, &scope, ctx, &mut pipeline)?;
        build_distinct_dedupe(&mut pipeline);
        if let Some(sort) = build_sort_doc(&select.order_by, &select.projections)? {
            pipeline.push(doc! { "$sort": sort });
        }
    } else {
        if let Some(sort) = build_sort_doc(&select.order_by, &select.projections)? {
            pipeline.push(doc! { "$sort": sort });
        }
        build_projection_stage(&select, &scope, ctx, &mut pipeline)?;
    }

    ordering::apply_ordering_shim(&mut pipeline, has_limit, has_explicit_order, ctx.options.implicit_order_on_limit);
    if let Some(offset) = select.offset {
        pipeline.push(doc! { "$skip": offset as i64 });
    }
    if let Some(limit) = select.limit {
        pipeline.push(doc! { "$limit": limit as i64 });
    }
    Ok((collection, pipeline))
}

/// A table-less SELECT (`SELECT 1+1`) has no collection to aggregate over;
/// rather than evaluating the expression in Rust, it runs as an aggregation
/// against a synthetic one-document source (spec §9) so all arithmetic stays
/// inside the pipeline. `collection` is the empty string: the caller issues
/// this pipeline via `db.aggregate()`, not `db.<collection>.aggregate()`.
fn resolve_from(
    from: &Option<TableRef>,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<(String, Scope)> {
    let Some(from) = from.as_ref() else {
        let one_doc = vec![Bson::Document(Document::new())];
        pipeline.push(doc! { "$documents": one_doc });
        return Ok((String::new(), Scope::default()));
    };
    match from {
        TableRef::Named { name, alias } => {
            let base = alias.clone().unwrap_or_else(|| name.clone());
            Ok((
                name.clone(),
                Scope {
                    base: Some(base),
                    ..Default::default()
                },
            ))
        }
        TableRef::Derived { query, alias } => {
            let (collection, inner_pipeline) = build_full_pipeline(query, ctx)?;
            pipeline.extend(inner_pipeline);
            Ok((
                collection,
                Scope {
                    base: Some(alias.clone()),
                    ..Default::default()
                },
            ))
        }
    }
}

/// A JOIN's `ON` must be a single equality comparing a column of the joined
/// target against a column elsewhere in scope (spec scope: compound/
/// non-equi join predicates are not supported). Returns `(outer side,
/// target side)`.
fn extract_join_keys(on: Option<&Expression>, target_binding: &str) -> TranslationResult<(Identifier, Identifier)> {
    let on = on.ok_or_else(|| ErrorKind::UnsupportedConstruct("JOIN requires an ON clause".to_string()))?;
    let Expression::Binary(BinaryOp::Eq, l, r) = on else {
        return Err(ErrorKind::UnsupportedConstruct(
            "JOIN ON must be a single equality comparison".to_string(),
        )
        .into());
    };
    let (Expression::Column(lc), Expression::Column(rc)) = (l.as_ref(), r.as_ref()) else {
        return Err(ErrorKind::UnsupportedConstruct("JOIN ON must compare two columns".to_string()).into());
    };
    if lc.qualifier.as_deref() == Some(target_binding) {
        Ok((rc.clone(), lc.clone()))
    } else if rc.qualifier.as_deref() == Some(target_binding) {
        Ok((lc.clone(), rc.clone()))
    } else {
        Err(ErrorKind::UnsupportedConstruct("JOIN ON must reference the joined table".to_string()).into())
    }
}

fn lower_join(join: &Join, scope: &mut Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<()> {
    match &join.target {
        TableRef::Named { name, alias } => {
            let binding = alias.clone().unwrap_or_else(|| name.clone());
            let (local_id, foreign_id) = extract_join_keys(join.on.as_ref(), &binding)?;
            let var = ctx.fresh("j");
            let local_expr = scope.field_path(&local_id);
            let inner_pipeline = vec![doc! {
                "$match": { "$expr": { "$eq": [format!("${}", foreign_id.name), format!("$${var}")] } }
            }];
            pipeline.push(doc! {
                "$lookup": {
                    "from": name.clone(),
                    "let": { var: local_expr },
                    "pipeline": inner_pipeline,
                    "as": binding.clone(),
                }
            });
            let preserve_empty = join.kind == JoinKind::Left;
            pipeline.push(doc! {
                "$unwind": { "path": format!("${binding}"), "preserveNullAndEmptyArrays": preserve_empty }
            });
            scope.joins.push(binding);
            Ok(())
        }
        TableRef::Derived { query, alias } => {
            let (local_id, foreign_id) = extract_join_keys(join.on.as_ref(), alias)?;
            let var = ctx.fresh("j");
            let local_expr = scope.field_path(&local_id);
            let (collection, mut inner_pipeline) = build_full_pipeline(query, ctx)?;
            inner_pipeline.push(doc! {
                "$match": { "$expr": { "$eq": [format!("${}", foreign_id.name), format!("$${var}")] } }
            });
            pipeline.push(doc! {
                "$lookup": {
                    "from": collection,
                    "let": { var: local_expr },
                    "pipeline": inner_pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
                    "as": alias.clone(),
                }
            });
            let preserve_empty = join.kind == JoinKind::Left;
            pipeline.push(doc! {
                "$unwind": { "path": format!("${alias}"), "preserveNullAndEmptyArrays": preserve_empty }
            });
            scope.joins.push(alias.clone());
            Ok(())
        }
    }
}

fn lower_filter(where_expr: &Expression, scope: &Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<()> {
    if let Some(flat) = try_flat_filter(where_expr, scope)? {
        pipeline.push(doc! { "$match": flat });
        return Ok(());
    }
    let lowered = lower_expression(where_expr, scope, ctx, pipeline)?;
    pipeline.push(doc! { "$match": { "$expr": lowered } });
    Ok(())
}

fn is_comparison(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte
    )
}

fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Lte => BinaryOp::Gte,
        BinaryOp::Gte => BinaryOp::Lte,
        other => other,
    }
}

fn flat_literal_value(lit: &Literal, id: &Identifier) -> TranslationResult<Bson> {
    let is_id = id.name.eq_ignore_ascii_case("_id") || id.name.eq_ignore_ascii_case("id");
    if is_id {
        if let Literal::String(s) = lit {
            if looks_like_object_id(s) {
                let oid = bson::oid::ObjectId::parse_str(s).map_err(|_| ErrorKind::UnsupportedArgument {
                    function: "_id comparison".to_string(),
                    message: format!("`{s}` is not a valid ObjectId"),
                })?;
                return Ok(Bson::ObjectId(oid));
            }
        }
    }
    super::expr::lower_literal(lit)
}

/// A flat `$match` key: a plain field path for a bare column, or a hoisted
/// aggregate/window's output field when the comparison sits in a `HAVING`
/// clause evaluated after `$group`/`$setWindowFields` already ran.
fn flat_field_name(expr: &Expression, scope: &Scope) -> Option<String> {
    match expr {
        Expression::Column(id) if is_bare_field(id, scope) => {
            Some(scope.field_path(id).trim_start_matches('$').to_string())
        }
        Expression::FunctionCall(call) => scope.resolve_hoisted(call),
        _ => None,
    }
}

fn literal_against_field(field_expr: &Expression, lit: &Literal) -> TranslationResult<Bson> {
    match field_expr {
        Expression::Column(id) => flat_literal_value(lit, id),
        _ => super::expr::lower_literal(lit),
    }
}

fn flat_cmp_doc(op: BinaryOp, value: Bson) -> Bson {
    match op {
        BinaryOp::Eq => value,
        BinaryOp::Neq => bson!({ "$ne": value }),
        BinaryOp::Lt => bson!({ "$lt": value }),
        BinaryOp::Lte => bson!({ "$lte": value }),
        BinaryOp::Gt => bson!({ "$gt": value }),
        BinaryOp::Gte => bson!({ "$gte": value }),
        _ => unreachable!("guarded by is_comparison"),
    }
}

/// Tries to express `expr` as a flat `$match` document (no `$expr`
/// wrapping) — the idiomatic, indexable form for simple predicates. Bails
/// out (returning `None`) the moment it sees anything that would need a
/// computed aggregation expression: function calls, subqueries, or a
/// comparison between two columns.
fn try_flat_expr(expr: &Expression, scope: &Scope) -> TranslationResult<Option<Document>> {
    match expr {
        Expression::Binary(BinaryOp::And, l, r) => {
            match (try_flat_expr(l, scope)?, try_flat_expr(r, scope)?) {
                (Some(a), Some(b)) => Ok(Some(doc! { "$and": [a, b] })),
                _ => Ok(None),
            }
        }
        Expression::Binary(BinaryOp::Or, l, r) => {
            match (try_flat_expr(l, scope)?, try_flat_expr(r, scope)?) {
                (Some(a), Some(b)) => Ok(Some(doc! { "$or": [a, b] })),
                _ => Ok(None),
            }
        }
        Expression::Binary(op, lhs, rhs) if is_comparison(*op) => {
            if let Some(field) = flat_field_name(lhs, scope) {
                if let Expression::Lit(lit) = rhs.as_ref() {
                    let value = literal_against_field(lhs, lit)?;
                    return Ok(Some(doc! { field: flat_cmp_doc(*op, value) }));
                }
            }
            if let Some(field) = flat_field_name(rhs, scope) {
                if let Expression::Lit(lit) = lhs.as_ref() {
                    let value = literal_against_field(rhs, lit)?;
                    return Ok(Some(doc! { field: flat_cmp_doc(flip(*op), value) }));
                }
            }
            Ok(None)
        }
        Expression::Like { expr: target, pattern, negated } => {
            let Expression::Column(id) = target.as_ref() else { return Ok(None) };
            if !is_bare_field(id, scope) {
                return Ok(None);
            }
            let Expression::Lit(Literal::String(pat)) = pattern.as_ref() else { return Ok(None) };
            let field = scope.field_path(id).trim_start_matches('$').to_string();
            let regex = Bson::RegularExpression(bson::Regex {
                pattern: like_pattern_to_regex(pat),
                options: String::new(),
            });
            Ok(Some(if *negated {
                doc! { field: { "$not": regex } }
            } else {
                doc! { field: regex }
            }))
        }
        Expression::IsNull { expr: target, negated } => {
            let Expression::Column(id) = target.as_ref() else { return Ok(None) };
            if !is_bare_field(id, scope) {
                return Ok(None);
            }
            let field = scope.field_path(id).trim_start_matches('$').to_string();
            Ok(Some(if *negated {
                doc! { field: { "$ne": Bson::Null } }
            } else {
                doc! { field: Bson::Null }
            }))
        }
        Expression::In {
            expr: target,
            source: InSource::List(items),
            negated,
        } => {
            let Expression::Column(id) = target.as_ref() else { return Ok(None) };
            if !is_bare_field(id, scope) {
                return Ok(None);
            }
            let field = scope.field_path(id).trim_start_matches('$').to_string();
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let Expression::Lit(lit) = item else { return Ok(None) };
                values.push(flat_literal_value(lit, id)?);
            }
            Ok(Some(if *negated {
                doc! { field: { "$nin": values } }
            } else {
                doc! { field: { "$in": values } }
            }))
        }
        _ => Ok(None),
    }
}

/// Correlated references resolve to a `$$var`, which has no meaning inside
/// a flat `$match` document — only plain/joined field paths qualify.
fn is_bare_field(id: &Identifier, scope: &Scope) -> bool {
    !scope.field_path(id).starts_with("$$")
}

fn try_flat_filter(expr: &Expression, scope: &Scope) -> TranslationResult<Option<Document>> {
    try_flat_expr(expr, scope)
}

fn is_aggregate_name(name: &str) -> bool {
    catalogue().get(name).map(|e| e.kind == FunctionKind::Aggregate).unwrap_or(false)
}

fn collect_calls(expr: &Expression, pred: &dyn Fn(&FunctionCall) -> bool, out: &mut Vec<FunctionCall>) {
    use Expression::*;
    match expr {
        Column(_) | Lit(_) | Star | QualifiedStar(_) | Subquery { .. } => {}
        Unary(_, e) => collect_calls(e, pred, out),
        Binary(_, l, r) => {
            collect_calls(l, pred, out);
            collect_calls(r, pred, out);
        }
        Like { expr, pattern, .. } | Regexp { expr, pattern, .. } => {
            collect_calls(expr, pred, out);
            collect_calls(pattern, pred, out);
        }
        In { expr, source, .. } => {
            collect_calls(expr, pred, out);
            if let InSource::List(items) = source {
                for i in items {
                    collect_calls(i, pred, out);
                }
            }
        }
        Between { expr, low, high } => {
            collect_calls(expr, pred, out);
            collect_calls(low, pred, out);
            collect_calls(high, pred, out);
        }
        IsNull { expr, .. } => collect_calls(expr, pred, out),
        FunctionCall(call) => {
            if pred(call) {
                if !out.contains(call) {
                    out.push(call.clone());
                }
            } else {
                for a in &call.args {
                    collect_calls(a, pred, out);
                }
            }
        }
        Case(case) => {
            if let Some(op) = &case.operand {
                collect_calls(op, pred, out);
            }
            for (w, t) in &case.branches {
                collect_calls(w, pred, out);
                collect_calls(t, pred, out);
            }
            if let Some(e) = &case.else_branch {
                collect_calls(e, pred, out);
            }
        }
        If { cond, then_branch, else_branch } => {
            collect_calls(cond, pred, out);
            collect_calls(then_branch, pred, out);
            collect_calls(else_branch, pred, out);
        }
        Coalesce(args) => {
            for a in args {
                collect_calls(a, pred, out);
            }
        }
        NullIf(a, b) => {
            collect_calls(a, pred, out);
            collect_calls(b, pred, out);
        }
    }
}

fn is_plain_aggregate(call: &FunctionCall) -> bool {
    call.window.is_none() && is_aggregate_name(&call.name)
}

fn is_window_call(call: &FunctionCall) -> bool {
    call.window.is_some()
}

fn query_has_aggregate(select: &SelectStatement) -> bool {
    if !select.group_by.is_empty() {
        return true;
    }
    let mut out = Vec::new();
    for p in &select.projections {
        collect_calls(&p.expr, &is_plain_aggregate, &mut out);
    }
    if let Some(h) = &select.having {
        collect_calls(h, &is_plain_aggregate, &mut out);
    }
    !out.is_empty()
}

/// What a `$group`-stage accumulator needs done to it afterward, for the
/// recipes that return a raw array rather than a finished scalar (spec
/// §4.4's DISTINCT-aggregate and `GROUP_CONCAT` families).
enum Finish {
    CountDistinct,
    SumDistinct,
    AvgDistinct,
    GroupConcat { separator: String, sort_desc: bool },
}

fn finish_for(call: &FunctionCall) -> Option<Finish> {
    match call.name.as_str() {
        "COUNT" if call.distinct => Some(Finish::CountDistinct),
        "SUM" if call.distinct => Some(Finish::SumDistinct),
        "AVG" if call.distinct => Some(Finish::AvgDistinct),
        "GROUP_CONCAT" => Some(Finish::GroupConcat {
            separator: call.separator.clone().unwrap_or_else(|| ",".to_string()),
            sort_desc: call.order_by.first().map(|o| !o.asc).unwrap_or(false),
        }),
        _ => None,
    }
}

fn finish_expr(field: &str, finish: &Finish) -> Bson {
    let raw = format!("${field}");
    match finish {
        Finish::CountDistinct => bson!({ "$size": raw }),
        Finish::SumDistinct => bson!({ "$sum": raw }),
        Finish::AvgDistinct => bson!({ "$avg": raw }),
        Finish::GroupConcat { separator, sort_desc } => {
            let input = bson!({ "$sortArray": { "input": raw, "sortBy": if *sort_desc { -1 } else { 1 } } });
            bson!({ "$reduce": {
                "input": input,
                "initialValue": "",
                "in": { "$concat": [
                    "$$value",
                    { "$cond": [{ "$eq": ["$$value", ""] }, "", separator.clone()] },
                    { "$toString": "$$this" },
                ] },
            } })
        }
    }
}

/// Lowers an aggregate call's argument, special-casing bare `COUNT(*)`: the
/// catalogue's `is_star` check (spec §4.4) looks for this exact sentinel
/// rather than a lowering-engine error on `Expression::Star`.
fn lower_aggregate_arg(expr: &Expression, scope: &Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<Bson> {
    if matches!(expr, Expression::Star) {
        return Ok(Bson::String("$$ROOT_STAR".to_string()));
    }
    lower_expression(expr, scope, ctx, pipeline)
}

fn insert_aggregate(
    call: &FunctionCall,
    preferred: Option<String>,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
    group_stage: &mut Document,
    finishes: &mut Vec<(String, Finish)>,
) -> TranslationResult<String> {
    if let Some(field) = scope.resolve_hoisted(call) {
        return Ok(field);
    }
    let entry = catalogue().get(&call.name).ok_or_else(|| ErrorKind::UnknownFunction(call.name.clone()))?;
    let Recipe::Aggregate(f) = &entry.recipe else {
        return Err(ErrorKind::UnsupportedConstruct(format!(
            "{} cannot be used as an aggregate accumulator",
            call.name
        ))
        .into());
    };
    entry.check_arity(call.args.len())?;
    let mut args = Vec::with_capacity(call.args.len());
    for a in &call.args {
        args.push(lower_aggregate_arg(a, scope, ctx, pipeline)?);
    }
    let accumulator = f(&call.name, &args, call.distinct)?;
    let field = preferred.unwrap_or_else(|| ctx.fresh("agg"));
    group_stage.insert(field.clone(), accumulator);
    if let Some(finish) = finish_for(call) {
        finishes.push((field.clone(), finish));
    }
    Ok(field)
}

fn build_group_stage(select: &SelectStatement, scope: &mut Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<()> {
    let single_key = select.group_by.len() == 1;
    let mut id_doc = Document::new();
    let mut bare_id = None;
    for (i, g) in select.group_by.iter().enumerate() {
        let lowered = lower_expression(g, scope, ctx, pipeline)?;
        if single_key {
            bare_id = Some(lowered);
        } else {
            id_doc.insert(format!("k{i}"), lowered);
        }
    }
    let id_value = if let Some(bare) = bare_id {
        bare
    } else if id_doc.is_empty() {
        Bson::Null
    } else {
        Bson::Document(id_doc)
    };
    let mut group_stage = doc! { "_id": id_value };

    for (i, g) in select.group_by.iter().enumerate() {
        if let Expression::Column(id) = g {
            let id_ref = if single_key { "$_id".to_string() } else { format!("$_id.k{i}") };
            group_stage.insert(id.name.clone(), doc! { "$first": id_ref });
        }
    }

    let mut calls = Vec::new();
    for p in &select.projections {
        collect_calls(&p.expr, &is_plain_aggregate, &mut calls);
    }
    if let Some(h) = &select.having {
        collect_calls(h, &is_plain_aggregate, &mut calls);
    }

    let mut finishes = Vec::new();
    for call in &calls {
        let preferred = select
            .projections
            .iter()
            .find(|p| matches!(&p.expr, Expression::FunctionCall(c) if c == call))
            .and_then(|p| p.output_name());
        let field = insert_aggregate(call, preferred, scope, ctx, pipeline, &mut group_stage, &mut finishes)?;
        scope.aggregates.push((call.clone(), field));
    }

    pipeline.push(doc! { "$group": group_stage });
    if !finishes.is_empty() {
        let mut set_doc = Document::new();
        for (field, finish) in &finishes {
            set_doc.insert(field.clone(), finish_expr(field, finish));
        }
        pipeline.push(doc! { "$set": set_doc });
    }
    Ok(())
}

fn build_set_window_fields(select: &SelectStatement, scope: &mut Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<()> {
    let mut calls = Vec::new();
    for p in &select.projections {
        collect_calls(&p.expr, &is_window_call, &mut calls);
    }
    if calls.is_empty() {
        return Ok(());
    }

    // `$setWindowFields` has one partition/sort per stage; multiple OVER()
    // clauses in one SELECT share the first call's, a documented scope
    // limitation.
    let primary = calls[0]
        .window
        .as_ref()
        .expect("is_window_call guarantees Some");
    let mut partition_by = Vec::new();
    for p in &primary.partition_by {
        partition_by.push(lower_expression(p, scope, ctx, pipeline)?);
    }
    let mut sort_by = Document::new();
    for item in &primary.order_by {
        if let OrderKey::Expr(Expression::Column(id)) = &item.key {
            sort_by.insert(scope.field_path(id).trim_start_matches('$'), if item.asc { 1 } else { -1 });
        }
    }

    let mut output = Document::new();
    for call in &calls {
        let entry = catalogue().get(&call.name).ok_or_else(|| ErrorKind::UnknownFunction(call.name.clone()))?;
        let Recipe::Window(f) = &entry.recipe else {
            return Err(ErrorKind::UnsupportedConstruct(format!("{} requires an OVER clause", call.name)).into());
        };
        entry.check_arity(call.args.len())?;
        let mut args = Vec::with_capacity(call.args.len());
        for a in &call.args {
            args.push(lower_expression(a, scope, ctx, pipeline)?);
        }
        let operator = f(&call.name, &args)?;
        let field = ctx.fresh("win");
        output.insert(field.clone(), operator);
        scope.windows.push((call.clone(), field));
    }

    let mut stage = Document::new();
    if !partition_by.is_empty() {
        stage.insert("partitionBy", if partition_by.len() == 1 { partition_by.into_iter().next().unwrap() } else { Bson::Array(partition_by) });
    }
    if !sort_by.is_empty() {
        stage.insert("sortBy", sort_by);
    }
    stage.insert("output", output);
    pipeline.push(doc! { "$setWindowFields": stage });
    Ok(())
}

fn build_distinct_dedupe(pipeline: &mut Vec<Document>) {
    pipeline.push(doc! { "$group": { "_id": "$$ROOT" } });
    pipeline.push(doc! { "$replaceRoot": { "newRoot": "$_id" } });
}

fn build_sort_doc(order_by: &[OrderByItem], projections: &[Projection]) -> TranslationResult<Option<Document>> {
    if order_by.is_empty() {
        return Ok(None);
    }
    let mut sort = Document::new();
    for item in order_by {
        let name = match &item.key {
            OrderKey::Expr(Expression::Column(id)) => id.name.clone(),
            OrderKey::Position(pos) => {
                let idx = (*pos as usize).checked_sub(1).ok_or_else(|| {
                    ErrorKind::UnsupportedConstruct("ORDER BY position must be 1 or greater".to_string())
                })?;
                let p = projections.get(idx).ok_or_else(|| {
                    ErrorKind::UnsupportedConstruct(format!("ORDER BY position {pos} is out of range"))
                })?;
                p.output_name().ok_or_else(|| {
                    ErrorKind::UnsupportedConstruct(
                        "ORDER BY position refers to an unaliased computed projection".to_string(),
                    )
                })?
            }
            OrderKey::Expr(_) => {
                return Err(ErrorKind::UnsupportedConstruct(
                    "ORDER BY on a computed expression requires an explicit alias".to_string(),
                )
                .into());
            }
        };
        sort.insert(name, if item.asc { 1 } else { -1 });
    }
    Ok(Some(sort))
}

fn build_projection_stage(select: &SelectStatement, scope: &Scope, ctx: &LowerCtx, pipeline: &mut Vec<Document>) -> TranslationResult<()> {
    let temp_fields = ctx.take_temp_fields();
    if !temp_fields.is_empty() {
        pipeline.push(doc! { "$unset": temp_fields });
    }

    let is_bare_star = select.projections.len() == 1 && matches!(select.projections[0].expr, Expression::Star);
    if is_bare_star {
        pipeline.push(doc! { "$replaceRoot": { "newRoot": "$$ROOT" } });
        return Ok(());
    }
    let is_qualified_star = select.projections.len() == 1
        && matches!(select.projections[0].expr, Expression::QualifiedStar(_));
    if is_qualified_star {
        let Expression::QualifiedStar(q) = &select.projections[0].expr else {
            unreachable!()
        };
        pipeline.push(doc! { "$replaceRoot": { "newRoot": format!("${q}") } });
        return Ok(());
    }
    if select.projections.iter().any(|p| matches!(p.expr, Expression::Star | Expression::QualifiedStar(_))) {
        return Err(ErrorKind::UnsupportedConstruct(
            "mixing `*` with other projections is not supported".to_string(),
        )
        .into());
    }

    let mut project = Document::new();
    let mut saw_id = false;
    for p in &select.projections {
        let name = p.output_name().unwrap_or_else(|| ctx.fresh("expr"));
        if name == "_id" {
            saw_id = true;
        }
        let value = lower_expression(&p.expr, scope, ctx, pipeline)?;
        let value = if value == Bson::String(format!("${name}")) { Bson::Int32(1) } else { value };
        project.insert(name, value);
    }
    if !saw_id {
        project.insert("_id", 0);
    }
    pipeline.push(doc! { "$project": project });
    Ok(())
}

fn collation_document(options: &TranslateOptions) -> Document {
    doc! {
        "locale": options.collation.locale.clone(),
        "caseLevel": options.collation.case_level,
        "strength": options.collation.strength,
        "numericOrdering": options.collation.numeric_ordering,
    }
}

/// The `find` path applies (spec §4.5.1) only when nothing forces an
/// aggregation pipeline: no joins, no GROUP BY/HAVING/DISTINCT/window
/// functions, no subquery in WHERE, no derived-table FROM, and every
/// projection is a bare column or `*`.
fn is_find_eligible(select: &SelectStatement) -> bool {
    if !select.joins.is_empty() {
        return false;
    }
    if !select.group_by.is_empty() || select.having.is_some() || select.distinct {
        return false;
    }
    if matches!(select.from, Some(TableRef::Derived { .. }) | None) {
        return false;
    }
    let mut windows = Vec::new();
    for p in &select.projections {
        collect_calls(&p.expr, &is_window_call, &mut windows);
        if !windows.is_empty() {
            return false;
        }
        if !matches!(p.expr, Expression::Column(_) | Expression::Star | Expression::QualifiedStar(_)) {
            return false;
        }
    }
    if select.projections.len() > 1
        && select
            .projections
            .iter()
            .any(|p| matches!(p.expr, Expression::Star | Expression::QualifiedStar(_)))
    {
        return false;
    }
    if let Some(w) = &select.where_clause {
        if where_has_subquery(w) {
            return false;
        }
    }
    true
}

fn where_has_subquery(expr: &Expression) -> bool {
    use Expression::*;
    match expr {
        Subquery { .. } => true,
        In { expr, source, .. } => where_has_subquery(expr) || matches!(source, InSource::Subquery(_)),
        Column(_) | Lit(_) | Star | QualifiedStar(_) => false,
        Unary(_, e) | IsNull { expr: e, .. } => where_has_subquery(e),
        Binary(_, l, r) | NullIf(l, r) => where_has_subquery(l) || where_has_subquery(r),
        Like { expr, pattern, .. } | Regexp { expr, pattern, .. } => {
            where_has_subquery(expr) || where_has_subquery(pattern)
        }
        Between { expr, low, high } => where_has_subquery(expr) || where_has_subquery(low) || where_has_subquery(high),
        FunctionCall(call) => call.args.iter().any(where_has_subquery),
        Case(case) => {
            case.operand.as_deref().is_some_and(where_has_subquery)
                || case.branches.iter().any(|(w, t)| where_has_subquery(w) || where_has_subquery(t))
                || case.else_branch.as_deref().is_some_and(where_has_subquery)
        }
        If { cond, then_branch, else_branch } => {
            where_has_subquery(cond) || where_has_subquery(then_branch) || where_has_subquery(else_branch)
        }
        Coalesce(args) => args.iter().any(where_has_subquery),
    }
}

fn lower_find(select: &SelectStatement, ctx: &LowerCtx) -> TranslationResult<Invocation> {
    let Some(TableRef::Named { name, alias }) = &select.from else {
        unreachable!("is_find_eligible requires a named FROM")
    };
    let scope = Scope {
        base: Some(alias.clone().unwrap_or_else(|| name.clone())),
        ..Default::default()
    };

    let mut inv = Invocation::new(name.clone(), Op::Find);
    if let Some(where_expr) = &select.where_clause {
        let doc = try_flat_filter(where_expr, &scope)?.ok_or_else(|| {
            ErrorKind::UnsupportedConstruct("this WHERE clause requires an aggregation pipeline".to_string())
        })?;
        inv.filter = Some(doc);
    }

    let is_star = matches!(select.projections.first().map(|p| &p.expr), Some(Expression::Star));
    if !is_star {
        let mut proj = Document::new();
        let mut saw_id = false;
        for p in &select.projections {
            if let Expression::Column(id) = &p.expr {
                proj.insert(id.name.clone(), 1);
                if id.name == "_id" {
                    saw_id = true;
                }
            }
        }
        if !saw_id {
            proj.insert("_id", 0);
        }
        inv.projection = Some(proj);
    }

    let sort = build_sort_doc(&select.order_by, &select.projections)?;
    let has_limit = select.limit.is_some();
    inv.sort = ordering::shim_find_sort(sort, has_limit, ctx.options.implicit_order_on_limit);
    if !select.order_by.is_empty() {
        inv.collation = Some(collation_document(ctx.options));
    }
    if let Some(limit) = select.limit {
        inv.limit = Some(limit as i64);
    }
    if let Some(offset) = select.offset {
        inv.skip = Some(offset as i64);
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TranslateOptions;

    fn options() -> TranslateOptions {
        TranslateOptions::default()
    }

    #[test]
    fn simple_select_star_is_find_eligible() {
        let select = SelectStatement {
            projections: vec![Projection { expr: Expression::Star, alias: None }],
            from: Some(TableRef::Named { name: "customers".to_string(), alias: None }),
            ..Default::default()
        };
        assert!(is_find_eligible(&select));
        let opts = options();
        let ctx = LowerCtx::new(&opts);
        let inv = lower_select(&select, "db", &ctx).unwrap();
        assert_eq!(inv.op, Some(Op::Find));
        assert_eq!(inv.collection, "customers");
    }

    #[test]
    fn group_by_forces_aggregate_pipeline() {
        let select = SelectStatement {
            projections: vec![Projection {
                expr: Expression::FunctionCall(FunctionCall {
                    name: "COUNT".to_string(),
                    args: vec![Expression::Star],
                    distinct: false,
                    window: None,
                    order_by: vec![],
                    separator: None,
                }),
                alias: Some("n".to_string()),
            }],
            from: Some(TableRef::Named { name: "orders".to_string(), alias: None }),
            group_by: vec![Expression::column("status")],
            ..Default::default()
        };
        assert!(!is_find_eligible(&select));
        let opts = options();
        let ctx = LowerCtx::new(&opts);
        let inv = lower_select(&select, "db", &ctx).unwrap();
        assert_eq!(inv.op, Some(Op::Aggregate));
        let pipeline = inv.pipeline.unwrap();
        assert!(pipeline.iter().any(|s| s.contains_key("$group")));
    }

    #[test]
    fn single_key_group_by_uses_bare_id_and_aliases_the_accumulator() {
        let select = SelectStatement {
            projections: vec![
                Projection { expr: Expression::column("country"), alias: None },
                Projection {
                    expr: Expression::FunctionCall(FunctionCall {
                        name: "COUNT".to_string(),
                        args: vec![Expression::Star],
                        distinct: false,
                        window: None,
                        order_by: vec![],
                        separator: None,
                    }),
                    alias: Some("n".to_string()),
                },
            ],
            from: Some(TableRef::Named { name: "customers".to_string(), alias: None }),
            group_by: vec![Expression::column("country")],
            having: Some(Expression::Binary(
                BinaryOp::Gt,
                Box::new(Expression::column("n")),
                Box::new(Expression::Lit(Literal::Integer(5))),
            )),
            order_by: vec![OrderByItem { key: OrderKey::Expr(Expression::column("n")), asc: false }],
            ..Default::default()
        };
        let opts = options();
        let ctx = LowerCtx::new(&opts);
        let inv = lower_select(&select, "db", &ctx).unwrap();
        let pipeline = inv.pipeline.unwrap();

        let group = pipeline.iter().find_map(|s| s.get_document("$group").ok()).unwrap();
        assert_eq!(group.get_str("_id").unwrap(), "$country");
        assert_eq!(group.get_document("n").unwrap(), &doc! { "$sum": 1 });

        let having = pipeline.iter().find_map(|s| s.get_document("$match").ok()).unwrap();
        assert_eq!(having.get_document("n").unwrap(), &doc! { "$gt": 5 });

        let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).unwrap();
        assert_eq!(project.get_i32("country").unwrap(), 1);
        assert_eq!(project.get_i32("n").unwrap(), 1);
    }

    #[test]
    fn right_join_is_normalized_to_left() {
        let mut select = SelectStatement {
            from: Some(TableRef::Named { name: "a".to_string(), alias: Some("a".to_string()) }),
            joins: vec![Join {
                kind: JoinKind::Right,
                target: TableRef::Named { name: "b".to_string(), alias: Some("b".to_string()) },
                on: Some(Expression::Binary(
                    BinaryOp::Eq,
                    Box::new(Expression::Column(Identifier::qualified("a", "id"))),
                    Box::new(Expression::Column(Identifier::qualified("b", "a_id"))),
                )),
            }],
            ..Default::default()
        };
        normalize_right_joins(&mut select).unwrap();
        assert_eq!(select.from, Some(TableRef::Named { name: "b".to_string(), alias: Some("b".to_string()) }));
        assert_eq!(select.joins[0].kind, JoinKind::Left);
    }
}
