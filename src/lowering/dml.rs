//! `INSERT`/`UPDATE`/`DELETE` lowering (spec §4.5.4). Writes never need an
//! aggregation pipeline for their own sake; only `UPDATE ... SET` with a
//! column-referencing right-hand side forces the pipeline-style update form.

use bson::{Bson, Document};

use crate::error::TranslationResult;
use crate::ir::Expression;
use crate::invocation::{Invocation, Op, Update};

use super::expr::{lower_expression, lower_literal};
use super::{LowerCtx, Scope};

pub(crate) fn lower_insert(
    table: &str,
    columns: &[String],
    rows: &[Vec<Expression>],
    ctx: &LowerCtx,
) -> TranslationResult<Invocation> {
    let mut documents = Vec::with_capacity(rows.len());
    for row in rows {
        let mut doc = Document::new();
        for (col, value) in columns.iter().zip(row) {
            let Expression::Lit(lit) = value else {
                return Err(crate::error::ErrorKind::UnsupportedConstruct(
                    "INSERT values must be literals".to_string(),
                )
                .into());
            };
            doc.insert(col.clone(), lower_literal(lit)?);
        }
        documents.push(doc);
    }
    let _ = ctx;
    if documents.len() == 1 {
        let mut inv = Invocation::new(table.to_string(), Op::InsertOne);
        inv.document = documents.into_iter().next();
        Ok(inv)
    } else {
        let mut inv = Invocation::new(table.to_string(), Op::InsertMany);
        inv.documents = Some(documents);
        Ok(inv)
    }
}

pub(crate) fn lower_update(
    table: &str,
    assignments: &[(String, Expression)],
    where_clause: &Option<Expression>,
    ctx: &LowerCtx,
) -> TranslationResult<Invocation> {
    let scope = Scope {
        base: Some(table.to_string()),
        ..Default::default()
    };
    let mut inv = Invocation::new(table.to_string(), Op::UpdateMany);

    if let Some(w) = where_clause {
        let mut pipeline = Vec::new();
        let lowered = lower_expression(w, &scope, ctx, &mut pipeline)?;
        inv.filter = Some(bson::doc! { "$expr": lowered });
    }

    let references_column = assignments.iter().any(|(_, v)| expr_references_column(v));
    if references_column {
        let mut pipeline = Vec::new();
        let mut set_doc = Document::new();
        for (col, value) in assignments {
            let v = lower_expression(value, &scope, ctx, &mut pipeline)?;
            set_doc.insert(col.clone(), v);
        }
        pipeline.push(bson::doc! { "$set": set_doc });
        inv.update = Some(Update::Pipeline(pipeline));
    } else {
        let mut pipeline = Vec::new();
        let mut set_doc = Document::new();
        for (col, value) in assignments {
            let v = lower_expression(value, &scope, ctx, &mut pipeline)?;
            set_doc.insert(col.clone(), v);
        }
        inv.update = Some(Update::Document(bson::doc! { "$set": set_doc }));
    }
    Ok(inv)
}

fn expr_references_column(expr: &Expression) -> bool {
    use Expression::*;
    match expr {
        Column(_) => true,
        Lit(_) | Star | QualifiedStar(_) => false,
        Unary(_, e) | IsNull { expr: e, .. } => expr_references_column(e),
        Binary(_, l, r) | NullIf(l, r) => expr_references_column(l) || expr_references_column(r),
        Like { expr, pattern, .. } | Regexp { expr, pattern, .. } => {
            expr_references_column(expr) || expr_references_column(pattern)
        }
        In { expr, source, .. } => {
            expr_references_column(expr)
                || matches!(source, crate::ir::InSource::List(items) if items.iter().any(expr_references_column))
        }
        Between { expr, low, high } => {
            expr_references_column(expr) || expr_references_column(low) || expr_references_column(high)
        }
        FunctionCall(call) => call.args.iter().any(expr_references_column),
        Case(case) => {
            case.operand.as_deref().is_some_and(expr_references_column)
                || case.branches.iter().any(|(w, t)| expr_references_column(w) || expr_references_column(t))
                || case.else_branch.as_deref().is_some_and(expr_references_column)
        }
        If { cond, then_branch, else_branch } => {
            expr_references_column(cond) || expr_references_column(then_branch) || expr_references_column(else_branch)
        }
        Coalesce(args) => args.iter().any(expr_references_column),
        Subquery { .. } => false,
    }
}

pub(crate) fn lower_delete(
    table: &str,
    where_clause: &Option<Expression>,
    ctx: &LowerCtx,
) -> TranslationResult<Invocation> {
    let scope = Scope {
        base: Some(table.to_string()),
        ..Default::default()
    };
    let mut inv = Invocation::new(table.to_string(), Op::DeleteMany);
    if let Some(w) = where_clause {
        let mut pipeline = Vec::new();
        let lowered = lower_expression(w, &scope, ctx, &mut pipeline)?;
        inv.filter = Some(bson::doc! { "$expr": lowered });
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Literal;
    use crate::options::TranslateOptions;

    #[test]
    fn single_row_insert_uses_insert_one() {
        let opts = TranslateOptions::default();
        let ctx = LowerCtx::new(&opts);
        let rows = vec![vec![Expression::Lit(Literal::Integer(1)), Expression::Lit(Literal::String("a".to_string()))]];
        let inv = lower_insert("widgets", &["id".to_string(), "name".to_string()], &rows, &ctx).unwrap();
        assert_eq!(inv.op, Some(Op::InsertOne));
        assert!(inv.document.is_some());
    }

    #[test]
    fn multi_row_insert_uses_insert_many() {
        let opts = TranslateOptions::default();
        let ctx = LowerCtx::new(&opts);
        let rows = vec![
            vec![Expression::Lit(Literal::Integer(1))],
            vec![Expression::Lit(Literal::Integer(2))],
        ];
        let inv = lower_insert("widgets", &["id".to_string()], &rows, &ctx).unwrap();
        assert_eq!(inv.op, Some(Op::InsertMany));
        assert_eq!(inv.documents.unwrap().len(), 2);
    }

    #[test]
    fn update_with_literal_only_set_uses_plain_document() {
        let opts = TranslateOptions::default();
        let ctx = LowerCtx::new(&opts);
        let assignments = vec![("status".to_string(), Expression::Lit(Literal::String("done".to_string())))];
        let inv = lower_update("tasks", &assignments, &None, &ctx).unwrap();
        assert!(matches!(inv.update, Some(Update::Document(_))));
    }

    #[test]
    fn update_referencing_a_column_uses_pipeline_form() {
        let opts = TranslateOptions::default();
        let ctx = LowerCtx::new(&opts);
        let assignments = vec![("total".to_string(), Expression::column("subtotal"))];
        let inv = lower_update("orders", &assignments, &None, &ctx).unwrap();
        assert!(matches!(inv.update, Some(Update::Pipeline(_))));
    }
}
