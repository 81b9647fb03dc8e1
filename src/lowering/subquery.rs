//! Subquery lowering (spec §4.5.2): every shape lowers to a `$lookup`
//! against the subquery's own collection, correlated columns are passed
//! through as `$lookup.let` variables, and the calling expression context
//! only ever sees the resulting single field the `$lookup`/`$set` pair
//! leaves behind — never the pipeline machinery itself.

use bson::{Bson, Document, bson, doc};

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{Expression, Identifier, SelectStatement};

use super::expr::lower_expression;
use super::select::lower_body;
use super::{LowerCtx, Scope};

/// Finds every qualified column reference inside `select` whose qualifier
/// belongs to `outer`, i.e. every place this subquery reaches into its
/// enclosing query. Does not descend into nested subqueries: a reference
/// escaping two levels of nesting is a documented limitation.
fn collect_correlated(select: &SelectStatement, outer: &Scope, ctx: &LowerCtx) -> Vec<(Identifier, String)> {
    let mut found = Vec::new();
    walk_select(select, &mut found);
    found.sort_by(|a, b| (&a.qualifier, &a.name).cmp(&(&b.qualifier, &b.name)));
    found.dedup();

    let mut out = Vec::new();
    for id in found {
        let owned = matches!(&id.qualifier, Some(q) if outer.owns(q));
        if owned {
            let var = ctx.fresh("v");
            out.push((id, var));
        }
    }
    out
}

fn walk_select(select: &SelectStatement, out: &mut Vec<Identifier>) {
    for p in &select.projections {
        walk_expr(&p.expr, out);
    }
    if let Some(w) = &select.where_clause {
        walk_expr(w, out);
    }
    for g in &select.group_by {
        walk_expr(g, out);
    }
    if let Some(h) = &select.having {
        walk_expr(h, out);
    }
    for j in &select.joins {
        if let Some(on) = &j.on {
            walk_expr(on, out);
        }
    }
}

fn walk_expr(expr: &Expression, out: &mut Vec<Identifier>) {
    use Expression::*;
    match expr {
        Column(id) => out.push(id.clone()),
        Lit(_) | Star | QualifiedStar(_) => {}
        Unary(_, e) => walk_expr(e, out),
        Binary(_, l, r) => {
            walk_expr(l, out);
            walk_expr(r, out);
        }
        Like { expr, pattern, .. } => {
            walk_expr(expr, out);
            walk_expr(pattern, out);
        }
        Regexp { expr, pattern, .. } => {
            walk_expr(expr, out);
            walk_expr(pattern, out);
        }
        In { expr, source, .. } => {
            walk_expr(expr, out);
            if let crate::ir::InSource::List(items) = source {
                for i in items {
                    walk_expr(i, out);
                }
            }
        }
        Between { expr, low, high } => {
            walk_expr(expr, out);
            walk_expr(low, out);
            walk_expr(high, out);
        }
        IsNull { expr, .. } => walk_expr(expr, out),
        FunctionCall(call) => {
            for a in &call.args {
                walk_expr(a, out);
            }
        }
        Case(case) => {
            if let Some(op) = &case.operand {
                walk_expr(op, out);
            }
            for (w, t) in &case.branches {
                walk_expr(w, out);
                walk_expr(t, out);
            }
            if let Some(e) = &case.else_branch {
                walk_expr(e, out);
            }
        }
        If { cond, then_branch, else_branch } => {
            walk_expr(cond, out);
            walk_expr(then_branch, out);
            walk_expr(else_branch, out);
        }
        Coalesce(args) => {
            for a in args {
                walk_expr(a, out);
            }
        }
        NullIf(a, b) => {
            walk_expr(a, out);
            walk_expr(b, out);
        }
        Subquery { .. } => {}
    }
}

fn build_lookup(
    select: &SelectStatement,
    outer: &Scope,
    ctx: &LowerCtx,
    extra_stages: Vec<Document>,
    alias: &str,
) -> TranslationResult<Document> {
    let correlated = collect_correlated(select, outer, ctx);
    let mut let_doc = Document::new();
    for (id, var) in &correlated {
        let_doc.insert(var.clone(), outer.field_path(id));
    }
    let (_, collection, mut pipeline, _scope) = lower_body(select, ctx, correlated)?;
    pipeline.extend(extra_stages);
    Ok(doc! {
        "$lookup": {
            "from": collection,
            "let": let_doc,
            "pipeline": pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            "as": alias,
        }
    })
}

pub(crate) fn lower_scalar_subquery(
    select: &SelectStatement,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let proj = select.projections.first().ok_or_else(|| {
        ErrorKind::UnsupportedConstruct("scalar subquery must select exactly one column".to_string())
    })?;
    let alias = ctx.fresh("scalar");

    // The projection is lowered against the subquery's own body scope, so
    // build the lookup in two passes: once to get the scope for the value
    // expression, then splice the value-projecting stage onto its pipeline.
    let correlated = collect_correlated(select, scope, ctx);
    let mut let_doc = Document::new();
    for (id, var) in &correlated {
        let_doc.insert(var.clone(), scope.field_path(id));
    }
    let (_, collection, mut inner_pipeline, inner_scope) = lower_body(select, ctx, correlated)?;
    let value = lower_expression(&proj.expr, &inner_scope, ctx, &mut inner_pipeline)?;
    inner_pipeline.push(doc! { "$project": { "_id": 0, "value": value } });
    inner_pipeline.push(doc! { "$limit": 1 });

    pipeline.push(doc! {
        "$lookup": {
            "from": collection,
            "let": let_doc,
            "pipeline": inner_pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            "as": alias,
        }
    });
    pipeline.push(doc! {
        "$set": { alias.clone(): { "$arrayElemAt": [format!("${alias}.value"), 0] } }
    });
    ctx.mark_temp_field(alias.clone());
    Ok(Bson::String(format!("${alias}")))
}

pub(crate) fn lower_exists_subquery(
    select: &SelectStatement,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
    negated: bool,
) -> TranslationResult<Bson> {
    let alias = ctx.fresh("exists");
    let lookup = build_lookup(
        select,
        scope,
        ctx,
        vec![doc! { "$limit": 1 }, doc! { "$project": { "_id": 1 } }],
        &alias,
    )?;
    pipeline.push(lookup);
    let exists = bson!({ "$gt": [{ "$size": format!("${alias}") }, 0] });
    pipeline.push(doc! { "$set": { alias.clone(): exists } });
    ctx.mark_temp_field(alias.clone());
    let field = Bson::String(format!("${alias}"));
    Ok(if negated { bson!({ "$not": [field] }) } else { field })
}

pub(crate) fn lower_in_subquery(
    target: &Expression,
    select: &SelectStatement,
    negated: bool,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let proj = select.projections.first().ok_or_else(|| {
        ErrorKind::UnsupportedConstruct("IN subquery must select exactly one column".to_string())
    })?;
    let alias = ctx.fresh("in");

    let correlated = collect_correlated(select, scope, ctx);
    let mut let_doc = Document::new();
    for (id, var) in &correlated {
        let_doc.insert(var.clone(), scope.field_path(id));
    }
    let (_, collection, mut inner_pipeline, inner_scope) = lower_body(select, ctx, correlated)?;
    let value = lower_expression(&proj.expr, &inner_scope, ctx, &mut inner_pipeline)?;
    inner_pipeline.push(doc! { "$project": { "_id": 0, "value": value } });

    pipeline.push(doc! {
        "$lookup": {
            "from": collection,
            "let": let_doc,
            "pipeline": inner_pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            "as": alias,
        }
    });
    pipeline.push(doc! {
        "$set": { alias.clone(): { "$map": { "input": format!("${alias}"), "as": "d", "in": "$$d.value" } } }
    });
    ctx.mark_temp_field(alias.clone());

    let t = lower_expression(target, scope, ctx, pipeline)?;
    let membership = bson!({ "$in": [t, format!("${alias}")] });
    Ok(if negated { bson!({ "$not": [membership] }) } else { membership })
}

pub(crate) fn lower_row_subquery(
    tuple_args: &[Expression],
    select: &SelectStatement,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    if tuple_args.len() != select.projections.len() {
        return Err(ErrorKind::UnsupportedConstruct(
            "row subquery column count does not match the left-hand tuple".to_string(),
        )
        .into());
    }
    let alias = ctx.fresh("row");

    let correlated = collect_correlated(select, scope, ctx);
    let mut let_doc = Document::new();
    for (id, var) in &correlated {
        let_doc.insert(var.clone(), scope.field_path(id));
    }
    let (_, collection, mut inner_pipeline, inner_scope) = lower_body(select, ctx, correlated)?;
    let mut project = doc! { "_id": 0 };
    for (i, p) in select.projections.iter().enumerate() {
        let v = lower_expression(&p.expr, &inner_scope, ctx, &mut inner_pipeline)?;
        project.insert(format!("c{i}"), v);
    }
    inner_pipeline.push(doc! { "$project": project });
    inner_pipeline.push(doc! { "$limit": 1 });

    pipeline.push(doc! {
        "$lookup": {
            "from": collection,
            "let": let_doc,
            "pipeline": inner_pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            "as": alias,
        }
    });
    pipeline.push(doc! {
        "$set": { alias.clone(): { "$arrayElemAt": [format!("${alias}"), 0] } }
    });
    ctx.mark_temp_field(alias.clone());

    let mut comparisons = Vec::with_capacity(tuple_args.len());
    for (i, arg) in tuple_args.iter().enumerate() {
        let lhs = lower_expression(arg, scope, ctx, pipeline)?;
        comparisons.push(bson!({ "$eq": [lhs, format!("${alias}.c{i}")] }));
    }
    Ok(bson!({ "$and": comparisons }))
}
