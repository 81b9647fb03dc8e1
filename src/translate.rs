//! The core's public surface (spec §6): `translate`/`translate_many`, each a
//! pure function of its SQL text, target database name, and options.

use tracing::{debug, instrument};

use crate::error::TranslationResult;
use crate::invocation::Invocation;
use crate::lowering;
use crate::options::TranslateOptions;
use crate::parser;

/// Translate a single SQL statement into its MongoDB invocation. `sql` must
/// contain exactly one statement; a trailing `;` is tolerated.
#[instrument(skip(sql, options), fields(database))]
pub fn translate(sql: &str, database: &str, options: &TranslateOptions) -> TranslationResult<Invocation> {
    let stmt = parser::parse_statement(sql)?;
    let invocation = lowering::lower(&stmt, database, options)?;
    debug!(collection = %invocation.collection, "translated statement");
    Ok(invocation)
}

/// Translate every `;`-delimited statement in `sql`. Aborts on the first
/// error and reports the offending statement's 0-based index via the
/// error's `hint`.
#[instrument(skip(sql, options), fields(database))]
pub fn translate_many(
    sql: &str,
    database: &str,
    options: &TranslateOptions,
) -> TranslationResult<Vec<Invocation>> {
    let statements = parser::parse_statements(sql)?;
    let mut invocations = Vec::with_capacity(statements.len());
    for (index, stmt) in statements.iter().enumerate() {
        let invocation = lowering::lower(stmt, database, options)
            .map_err(|e| e.with_hint(format!("statement #{index}")))?;
        invocations.push(invocation);
    }
    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_is_deterministic() {
        let opts = TranslateOptions::default();
        let a = translate("SELECT * FROM widgets", "shop", &opts).unwrap();
        let b = translate("SELECT * FROM widgets", "shop", &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn translate_many_splits_on_semicolons() {
        let opts = TranslateOptions::default();
        let invocations = translate_many(
            "SELECT * FROM widgets; SELECT * FROM gadgets;",
            "shop",
            &opts,
        )
        .unwrap();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].collection, "widgets");
        assert_eq!(invocations[1].collection, "gadgets");
    }

    #[test]
    fn translate_many_reports_statement_index_on_error() {
        let opts = TranslateOptions::default();
        let err = translate_many("SELECT * FROM widgets; NOT VALID SQL;", "shop", &opts).unwrap_err();
        assert_eq!(err.hint.as_deref(), Some("statement #1"));
    }
}
