//! The lowering engine: turns the parser's IR into a MongoDB `Invocation`
//! (spec §4.5, §4.6). Consulted after parsing is complete; nothing here
//! re-examines source text or tokens.

mod conditional;
mod dml;
mod expr;
mod ordering;
mod select;
mod subquery;

use std::cell::{Cell, RefCell};

use crate::error::TranslationResult;
use crate::ir::{FunctionCall, Identifier, Statement};
use crate::invocation::Invocation;
use crate::options::TranslateOptions;

/// Per-statement mutable state threaded through lowering: a counter for
/// fresh aliases (`$lookup` `as:` names, synthetic HAVING accumulators) and
/// the set of fields those aliases produced, which must be excluded from
/// the final projection once consumed (spec §4.5.2's `__in_1`-style
/// cleanup).
pub(crate) struct LowerCtx<'a> {
    pub options: &'a TranslateOptions,
    counter: Cell<u32>,
    temp_fields: RefCell<Vec<String>>,
}

impl<'a> LowerCtx<'a> {
    fn new(options: &'a TranslateOptions) -> Self {
        Self {
            options,
            counter: Cell::new(0),
            temp_fields: RefCell::new(Vec::new()),
        }
    }

    /// A process-unique-per-statement name for a synthetic pipeline field.
    pub(crate) fn fresh(&self, prefix: &str) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        format!("__{prefix}_{n}")
    }

    /// Record that `field` was introduced purely to carry an intermediate
    /// value (a `$lookup` alias, a hoisted HAVING accumulator) and must not
    /// survive into the statement's final output.
    pub(crate) fn mark_temp_field(&self, field: impl Into<String>) {
        self.temp_fields.borrow_mut().push(field.into());
    }

    pub(crate) fn take_temp_fields(&self) -> Vec<String> {
        std::mem::take(&mut self.temp_fields.borrow_mut())
    }
}

/// Identifier-resolution scope for one level of a query (spec §4.5.2
/// correlation rules). `base` is the unqualified binding name usable for
/// bare/qualified-to-self references; `joins` lists the other bindings
/// visible at this level; `correlated` lists outer-query bindings reachable
/// only as `$let` variables inside a `$lookup` pipeline.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    pub base: Option<String>,
    pub joins: Vec<String>,
    pub correlated: Vec<(Identifier, String)>,
    /// Aggregate `FunctionCall`s hoisted into the level's `$group` stage,
    /// keyed by structural equality so the same call appearing in SELECT and
    /// HAVING resolves to one accumulator field.
    pub aggregates: Vec<(FunctionCall, String)>,
    /// Window `FunctionCall`s hoisted into the level's `$setWindowFields`
    /// stage.
    pub windows: Vec<(FunctionCall, String)>,
}

impl Scope {
    pub(crate) fn owns(&self, qualifier: &str) -> bool {
        self.base.as_deref() == Some(qualifier) || self.joins.iter().any(|j| j == qualifier)
    }

    /// Looks up a previously-hoisted aggregate or window call's output
    /// field, if this exact call (by structural equality) was registered.
    pub(crate) fn resolve_hoisted(&self, call: &FunctionCall) -> Option<String> {
        self.aggregates
            .iter()
            .chain(self.windows.iter())
            .find(|(c, _)| c == call)
            .map(|(_, field)| field.clone())
    }

    /// Resolves an identifier to its MongoDB field-path expression string
    /// (e.g. `"$orders.total"`, `"$$outer_id"`). Correlated references are
    /// checked first since a correlated name always shadows a same-named
    /// local binding inside the subquery pipeline that declared it.
    pub(crate) fn field_path(&self, id: &Identifier) -> String {
        for (outer_id, var_name) in &self.correlated {
            if outer_id.name == id.name && outer_id.qualifier == id.qualifier {
                return format!("$${var_name}");
            }
        }
        match &id.qualifier {
            Some(q) if self.base.as_deref() == Some(q.as_str()) => format!("${}", id.name),
            Some(q) => format!("${q}.{}", id.name),
            None => format!("${}", id.name),
        }
    }
}

/// Lowers a parsed statement into its MongoDB invocation (spec §4.6's
/// per-statement dispatch table).
pub fn lower(
    stmt: &Statement,
    database: &str,
    options: &TranslateOptions,
) -> TranslationResult<Invocation> {
    let ctx = LowerCtx::new(options);
    match stmt {
        Statement::Select(select) => select::lower_select(select, database, &ctx),
        Statement::With { ctes, body } => select::lower_with(ctes, body, database, &ctx),
        Statement::Insert { table, columns, rows } => {
            dml::lower_insert(table, columns, rows, &ctx)
        }
        Statement::Update {
            table,
            assignments,
            where_clause,
        } => dml::lower_update(table, assignments, where_clause, &ctx),
        Statement::Delete { table, where_clause } => dml::lower_delete(table, where_clause, &ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_unique_and_prefixed() {
        let options = TranslateOptions::default();
        let ctx = LowerCtx::new(&options);
        assert_eq!(ctx.fresh("in"), "__in_0");
        assert_eq!(ctx.fresh("in"), "__in_1");
    }

    #[test]
    fn scope_prefers_correlated_over_base() {
        let mut scope = Scope {
            base: Some("o".to_string()),
            ..Default::default()
        };
        let id = Identifier {
            name: "id".to_string(),
            qualifier: Some("c".to_string()),
        };
        assert_eq!(scope.field_path(&id), "$c.id");

        scope.correlated.push((id.clone(), "outer_id".to_string()));
        assert_eq!(scope.field_path(&id), "$$outer_id");
    }

    #[test]
    fn scope_collapses_self_qualified_reference() {
        let scope = Scope {
            base: Some("o".to_string()),
            ..Default::default()
        };
        let id = Identifier {
            name: "total".to_string(),
            qualifier: Some("o".to_string()),
        };
        assert_eq!(scope.field_path(&id), "$total");
    }
}
