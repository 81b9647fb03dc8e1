//! Recursive-descent parser over the token stream (spec §4.2). Entry point
//! dispatches on the first keyword; everything below is strictly
//! token-driven — no layer here re-scans the source string.

mod clauses;
mod cte;
mod dml;
mod expr;
mod select;

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::Statement;
use crate::lexer::Lexer;
use crate::reader::TokenReader;

/// Private sentinel `FunctionCall` name used to carry a parenthesised tuple
/// `(a, b)` through to the lowering engine's row-subquery promotion (spec
/// §4.5.2); re-exported here so `lowering` can recognise it.
pub(crate) use expr::TUPLE_MARKER;

/// Reserved words that also double as function names in call position
/// (`YEAR(d)`, `LEFT(s, n)`, ...). Checked only when a keyword token is
/// immediately followed by `(` in an expression context.
pub(crate) fn is_function_like_keyword(word: &str) -> bool {
    matches!(
        word,
        "LEFT" | "RIGHT" | "YEAR" | "MONTH" | "DAY" | "HOUR" | "MINUTE" | "SECOND"
            | "MICROSECOND" | "WEEK" | "QUARTER"
    )
}

/// Parse a single SQL statement into its IR. Assumes `sql` contains exactly
/// one statement (a trailing `;` is tolerated and ignored).
pub fn parse_statement(sql: &str) -> TranslationResult<Statement> {
    let tokens = Lexer::lex(sql);
    let mut reader = TokenReader::new(&tokens);
    let stmt = parse_statement_from(&mut reader)?;
    reader.consume_punct(';');
    if !reader.at_end() {
        return Err(ErrorKind::SyntaxError {
            expected: "end of statement".to_string(),
            found: reader.current().describe(),
        }
        .into());
    }
    Ok(stmt)
}

/// Parse every `;`-delimited statement in `sql` (spec §6 `translate_many`).
pub fn parse_statements(sql: &str) -> TranslationResult<Vec<Statement>> {
    let tokens = Lexer::lex(sql);
    let mut reader = TokenReader::new(&tokens);
    let mut statements = Vec::new();
    while !reader.at_end() {
        while reader.consume_punct(';') {}
        if reader.at_end() {
            break;
        }
        statements.push(parse_statement_from(&mut reader)?);
        reader.consume_punct(';');
    }
    Ok(statements)
}

fn parse_statement_from(reader: &mut TokenReader) -> TranslationResult<Statement> {
    if reader.peek_keyword("WITH") {
        return cte::parse_with(reader);
    }
    if reader.peek_keyword("SELECT") {
        return Ok(Statement::Select(select::parse_select_statement(reader)?));
    }
    if reader.peek_keyword("INSERT") {
        return dml::parse_insert(reader);
    }
    if reader.peek_keyword("UPDATE") {
        return dml::parse_update(reader);
    }
    if reader.peek_keyword("DELETE") {
        return dml::parse_delete(reader);
    }
    Err(ErrorKind::SyntaxError {
        expected: "SELECT, WITH, INSERT, UPDATE, or DELETE".to_string(),
        found: reader.current().describe(),
    }
    .into())
}
