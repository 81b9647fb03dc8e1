//! `CASE`/`IF`/`COALESCE`/`NULLIF` lowering (spec §4.5.3). These are
//! structural forms recognised as dedicated `Expression` variants by the
//! parser, never looked up in the function catalogue.

use bson::{Bson, Document, bson};

use crate::error::TranslationResult;
use crate::ir::{CaseExpr, Expression};

use super::expr::lower_expression;
use super::{LowerCtx, Scope};

pub(crate) fn lower_case(
    case: &CaseExpr,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let mut branches = Vec::with_capacity(case.branches.len());
    for (when, then) in &case.branches {
        let cond = match &case.operand {
            Some(operand) => {
                let o = lower_expression(operand, scope, ctx, pipeline)?;
                let w = lower_expression(when, scope, ctx, pipeline)?;
                bson!({ "$eq": [o, w] })
            }
            None => lower_expression(when, scope, ctx, pipeline)?,
        };
        let then_lowered = lower_expression(then, scope, ctx, pipeline)?;
        branches.push(bson!({ "case": cond, "then": then_lowered }));
    }
    let default = match &case.else_branch {
        Some(e) => lower_expression(e, scope, ctx, pipeline)?,
        None => Bson::Null,
    };
    Ok(bson!({ "$switch": { "branches": branches, "default": default } }))
}

pub(crate) fn lower_if(
    cond: &Expression,
    then_branch: &Expression,
    else_branch: &Expression,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let c = lower_expression(cond, scope, ctx, pipeline)?;
    let t = lower_expression(then_branch, scope, ctx, pipeline)?;
    let e = lower_expression(else_branch, scope, ctx, pipeline)?;
    Ok(bson!({ "$cond": [c, t, e] }))
}

pub(crate) fn lower_coalesce(
    args: &[Expression],
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let mut lowered = Vec::with_capacity(args.len());
    for a in args {
        lowered.push(lower_expression(a, scope, ctx, pipeline)?);
    }
    Ok(nest_if_null(lowered))
}

fn nest_if_null(mut args: Vec<Bson>) -> Bson {
    if args.len() == 1 {
        return args.pop().expect("checked len == 1");
    }
    let first = args.remove(0);
    bson!({ "$ifNull": [first, nest_if_null(args)] })
}

pub(crate) fn lower_nullif(
    a: &Expression,
    b: &Expression,
    scope: &Scope,
    ctx: &LowerCtx,
    pipeline: &mut Vec<Document>,
) -> TranslationResult<Bson> {
    let av = lower_expression(a, scope, ctx, pipeline)?;
    let bv = lower_expression(b, scope, ctx, pipeline)?;
    Ok(bson!({ "$cond": [{ "$eq": [av.clone(), bv] }, Bson::Null, av] }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_nests_if_null_right_associatively() {
        let out = nest_if_null(vec![Bson::String("$a".into()), Bson::String("$b".into()), Bson::Int32(0)]);
        assert_eq!(
            out,
            bson!({ "$ifNull": ["$a", { "$ifNull": ["$b", 0] }] })
        );
    }
}
