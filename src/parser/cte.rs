//! `WITH [RECURSIVE] name[(cols,…)] AS (SELECT …) [, …]` wrapper (spec
//! §4.2 step 1).

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{Cte, Statement};
use crate::reader::TokenReader;

use super::select::parse_select_statement;

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

pub fn parse_with(reader: &mut TokenReader) -> TranslationResult<Statement> {
    expect_keyword(reader, "WITH")?;
    let recursive_clause = reader.consume_keyword("RECURSIVE");

    let mut ctes = vec![parse_cte(reader, recursive_clause)?];
    while reader.consume_punct(',') {
        ctes.push(parse_cte(reader, recursive_clause)?);
    }

    if !reader.peek_keyword("SELECT") {
        return Err(ErrorKind::SyntaxError {
            expected: "SELECT".to_string(),
            found: reader.current().describe(),
        }
        .into());
    }
    let body = Statement::Select(parse_select_statement(reader)?);

    Ok(Statement::With {
        ctes,
        body: Box::new(body),
    })
}

fn parse_cte(reader: &mut TokenReader, recursive_clause: bool) -> TranslationResult<Cte> {
    let name = parse_name(reader)?;
    let columns = if reader.consume_punct('(') {
        let mut cols = vec![parse_name(reader)?];
        while reader.consume_punct(',') {
            cols.push(parse_name(reader)?);
        }
        expect_punct(reader, ')')?;
        Some(cols)
    } else {
        None
    };
    expect_keyword(reader, "AS")?;
    expect_punct(reader, '(')?;
    let query = parse_select_statement(reader)?;
    expect_punct(reader, ')')?;

    // `WITH RECURSIVE` applies per-clause in MariaDB; a self-reference to
    // `name` inside `query`'s FROM/joins is what the lowering engine checks
    // to decide whether a `$graphLookup` is actually needed.
    Ok(Cte {
        name,
        columns,
        query,
        recursive: recursive_clause,
    })
}
