//! SELECT grammar (spec §4.2 steps 2-9). Does not handle the leading
//! optional `WITH`; that wrapper lives in `cte.rs`, one layer up.

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{Projection, SelectStatement};
use crate::reader::TokenReader;
use crate::token::TokenKind;

use super::clauses::{parse_expr_list, parse_joins, parse_order_by_list, parse_table_ref};
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

pub fn parse_select_statement(reader: &mut TokenReader) -> TranslationResult<SelectStatement> {
    expect_keyword(reader, "SELECT")?;
    let distinct = reader.consume_keyword("DISTINCT");
    reader.consume_keyword("ALL");

    let projections = parse_projection_list(reader)?;

    let from = if reader.consume_keyword("FROM") {
        Some(parse_table_ref(reader)?)
    } else {
        None
    };

    let joins = match &from {
        Some(base) => parse_joins(reader, base)?,
        None => Vec::new(),
    };

    let where_clause = if reader.consume_keyword("WHERE") {
        Some(parse_expression(reader)?)
    } else {
        None
    };

    let group_by = if reader.consume_keyword("GROUP") {
        expect_keyword(reader, "BY")?;
        parse_expr_list(reader)?
    } else {
        Vec::new()
    };

    let having = if reader.consume_keyword("HAVING") {
        Some(parse_expression(reader)?)
    } else {
        None
    };

    let order_by = if reader.consume_keyword("ORDER") {
        expect_keyword(reader, "BY")?;
        parse_order_by_list(reader)?
    } else {
        Vec::new()
    };

    let (limit, offset) = parse_limit_offset(reader)?;

    Ok(SelectStatement {
        projections,
        distinct,
        from,
        joins,
        where_clause,
        group_by,
        having,
        order_by,
        limit,
        offset,
    })
}

fn parse_projection_list(reader: &mut TokenReader) -> TranslationResult<Vec<Projection>> {
    let mut projections = vec![parse_projection(reader)?];
    while reader.consume_punct(',') {
        projections.push(parse_projection(reader)?);
    }
    Ok(projections)
}

fn parse_projection(reader: &mut TokenReader) -> TranslationResult<Projection> {
    let expr = parse_expression(reader)?;
    let alias = if reader.consume_keyword("AS") {
        Some(parse_alias_name(reader)?)
    } else if let Some(name) = reader.current().as_name() {
        let alias = name.to_string();
        reader.next();
        Some(alias)
    } else {
        None
    };
    Ok(Projection { expr, alias })
}

fn parse_alias_name(reader: &mut TokenReader) -> TranslationResult<String> {
    match reader.current().as_name() {
        Some(name) => {
            let name = name.to_string();
            reader.next();
            Ok(name)
        }
        None => Err(ErrorKind::SyntaxError {
            expected: "alias".to_string(),
            found: reader.current().describe(),
        }
        .into()),
    }
}

/// `LIMIT n [OFFSET m]` or `LIMIT m, n`.
fn parse_limit_offset(reader: &mut TokenReader) -> TranslationResult<(Option<u64>, Option<u64>)> {
    if !reader.consume_keyword("LIMIT") {
        return Ok((None, None));
    }
    let first = parse_uint(reader)?;
    if reader.consume_punct(',') {
        let second = parse_uint(reader)?;
        return Ok((Some(second), Some(first)));
    }
    if reader.consume_keyword("OFFSET") {
        let offset = parse_uint(reader)?;
        return Ok((Some(first), Some(offset)));
    }
    Ok((Some(first), None))
}

fn parse_uint(reader: &mut TokenReader) -> TranslationResult<u64> {
    let tok = reader.next();
    match tok.kind {
        TokenKind::Integer(n) if n >= 0 => Ok(n as u64),
        _ => Err(ErrorKind::SyntaxError {
            expected: "non-negative integer".to_string(),
            found: tok.describe(),
        }
        .into()),
    }
}
