//! INSERT/UPDATE/DELETE parsing (spec §4.5.4).

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::Statement;
use crate::reader::TokenReader;

use super::expr::parse_expression;

fn expect_keyword(reader: &mut TokenReader, word: &str) -> TranslationResult<()> {
    if reader.consume_keyword(word) {
        Ok(())
    } else {
        Err(ErrorKind::SyntaxError {
            expected: word.to_string(),
            found: reader.current().describe(),
        }
        .into())
    }
}

fn expect_punct(reader: &mut TokenReader, c: char) -> TranslationResult<()> {
    if reader.consume_punct(c) {
        Ok(())
    } else {
        Err(ErrorKind::SyntaxError {
            expected: c.to_string(),
            found: reader.current().describe(),
        }
        .into())
    }
}

fn parse_name(reader: &mut TokenReader) -> TranslationResult<String> {
    match reader.current().as_name() {
        Some(name) => {
            let name = name.to_string();
            reader.next();
            Ok(name)
        }
        None => Err(ErrorKind::SyntaxError {
            expected: "identifier".to_string(),
            found: reader.current().describe(),
        }
        .into()),
    }
}

/// `INSERT INTO t (c1,…) VALUES (v11,…), (v21,…)`.
pub fn parse_insert(reader: &mut TokenReader) -> TranslationResult<Statement> {
    expect_keyword(reader, "INSERT")?;
    expect_keyword(reader, "INTO")?;
    let table = parse_name(reader)?;

    let mut columns = Vec::new();
    if reader.consume_punct('(') {
        columns.push(parse_name(reader)?);
        while reader.consume_punct(',') {
            columns.push(parse_name(reader)?);
        }
        expect_punct(reader, ')')?;
    }

    expect_keyword(reader, "VALUES")?;
    let mut rows = vec![parse_value_row(reader)?];
    while reader.consume_punct(',') {
        rows.push(parse_value_row(reader)?);
    }

    Ok(Statement::Insert {
        table,
        columns,
        rows,
    })
}

fn parse_value_row(reader: &mut TokenReader) -> TranslationResult<Vec<crate::ir::Expression>> {
    expect_punct(reader, '(')?;
    let mut values = vec![parse_expression(reader)?];
    while reader.consume_punct(',') {
        values.push(parse_expression(reader)?);
    }
    expect_punct(reader, ')')?;
    Ok(values)
}

/// `UPDATE t SET c=e,… WHERE p`.
pub fn parse_update(reader: &mut TokenReader) -> TranslationResult<Statement> {
    expect_keyword(reader, "UPDATE")?;
    let table = parse_name(reader)?;
    expect_keyword(reader, "SET")?;

    let mut assignments = vec![parse_assignment(reader)?];
    while reader.consume_punct(',') {
        assignments.push(parse_assignment(reader)?);
    }

    let where_clause = if reader.consume_keyword("WHERE") {
        Some(parse_expression(reader)?)
    } else {
        None
    };

    Ok(Statement::Update {
        table,
        assignments,
        where_clause,
    })
}

fn parse_assignment(reader: &mut TokenReader) -> TranslationResult<(String, crate::ir::Expression)> {
    let col = parse_name(reader)?;
    if !reader.consume_operator("=") {
        return Err(ErrorKind::SyntaxError {
            expected: "=".to_string(),
            found: reader.current().describe(),
        }
        .into());
    }
    let expr = parse_expression(reader)?;
    Ok((col, expr))
}

/// `DELETE FROM t WHERE p`.
pub fn parse_delete(reader: &mut TokenReader) -> TranslationResult<Statement> {
    expect_keyword(reader, "DELETE")?;
    expect_keyword(reader, "FROM")?;
    let table = parse_name(reader)?;
    let where_clause = if reader.consume_keyword("WHERE") {
        Some(parse_expression(reader)?)
    } else {
        None
    };
    Ok(Statement::Delete {
        table,
        where_clause,
    })
}
