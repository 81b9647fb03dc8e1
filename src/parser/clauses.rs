//! WHERE/JOIN/GROUP BY/ORDER BY sub-parsing (spec §4.3). Each function
//! operates over whatever sub-range of tokens the caller has already
//! positioned the reader at; none of them re-scan the source string.

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{Expression, Join, JoinKind, OrderByItem, OrderKey, TableRef};
use crate::reader::TokenReader;
use crate::token::TokenKind;

use super::expr::parse_expression;
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

fn parse_identifier_name(reader: &mut TokenReader) -> TranslationResult<String> {
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

/// `table_ref` is `name [alias]` or `(select_stmt) alias` — alias is
/// mandatory for a derived table.
pub fn parse_table_ref(reader: &mut TokenReader) -> TranslationResult<TableRef> {
    if reader.consume_punct('(') {
        let query = parse_select_statement(reader)?;
        if !reader.consume_punct(')') {
            return Err(ErrorKind::UnclosedConstruct("derived table".to_string()).into());
        }
        reader.consume_keyword("AS");
        let alias = parse_identifier_name(reader)?;
        return Ok(TableRef::Derived {
            query: Box::new(query),
            alias,
        });
    }
    let name = parse_identifier_name(reader)?;
    let alias = if reader.consume_keyword("AS") {
        Some(parse_identifier_name(reader)?)
    } else if let Some(name) = reader.current().as_name() {
        let alias = name.to_string();
        reader.next();
        Some(alias)
    } else {
        None
    };
    Ok(TableRef::Named { name, alias })
}

fn desugar_using(base: &TableRef, target: &TableRef, columns: Vec<String>) -> Expression {
    let base_name = base.binding_name().to_string();
    let target_name = target.binding_name().to_string();
    columns
        .into_iter()
        .map(|col| {
            Expression::Binary(
                crate::ir::BinaryOp::Eq,
                Box::new(Expression::Column(crate::ir::Identifier::qualified(
                    base_name.clone(),
                    col.clone(),
                ))),
                Box::new(Expression::Column(crate::ir::Identifier::qualified(
                    target_name.clone(),
                    col,
                ))),
            )
        })
        .reduce(|a, b| Expression::Binary(crate::ir::BinaryOp::And, Box::new(a), Box::new(b)))
        .expect("USING requires at least one column")
}

/// Parses every `[INNER|LEFT [OUTER]|RIGHT [OUTER]|CROSS] JOIN …` clause in
/// source order. `base` is needed to desugar `USING(col)`.
pub fn parse_joins(reader: &mut TokenReader, base: &TableRef) -> TranslationResult<Vec<Join>> {
    let mut joins = Vec::new();
    loop {
        let kind = if reader.consume_keyword("INNER") {
            expect_keyword(reader, "JOIN")?;
            JoinKind::Inner
        } else if reader.consume_keyword("LEFT") {
            reader.consume_keyword("OUTER");
            expect_keyword(reader, "JOIN")?;
            JoinKind::Left
        } else if reader.consume_keyword("RIGHT") {
            reader.consume_keyword("OUTER");
            expect_keyword(reader, "JOIN")?;
            JoinKind::Right
        } else if reader.consume_keyword("CROSS") {
            expect_keyword(reader, "JOIN")?;
            JoinKind::Cross
        } else if reader.consume_keyword("JOIN") {
            JoinKind::Inner
        } else {
            break;
        };

        let target = parse_table_ref(reader)?;
        let prior_base = joins
            .last()
            .map(|j: &Join| &j.target)
            .unwrap_or(base);
        let on = if reader.consume_keyword("ON") {
            Some(parse_expression(reader)?)
        } else if reader.consume_keyword("USING") {
            if !reader.consume_punct('(') {
                return Err(ErrorKind::SyntaxError {
                    expected: "(".to_string(),
                    found: reader.current().describe(),
                }
                .into());
            }
            let mut columns = vec![parse_identifier_name(reader)?];
            while reader.consume_punct(',') {
                columns.push(parse_identifier_name(reader)?);
            }
            if !reader.consume_punct(')') {
                return Err(ErrorKind::UnclosedConstruct("USING(...)".to_string()).into());
            }
            Some(desugar_using(prior_base, &target, columns))
        } else if matches!(kind, JoinKind::Cross) {
            None
        } else {
            None
        };
        joins.push(Join { kind, target, on });
    }
    Ok(joins)
}

/// `GROUP BY expr {, expr}*`. Assumes `GROUP` `BY` already consumed by caller.
pub fn parse_expr_list(reader: &mut TokenReader) -> TranslationResult<Vec<Expression>> {
    let mut list = vec![parse_expression(reader)?];
    while reader.consume_punct(',') {
        list.push(parse_expression(reader)?);
    }
    Ok(list)
}

/// `ORDER BY expr [ASC|DESC] {, …}*`. Positional integers and bare names are
/// preserved as `OrderKey::Position`/`Expr` for the lowering engine to
/// resolve against the projection list.
pub fn parse_order_by_list(reader: &mut TokenReader) -> TranslationResult<Vec<OrderByItem>> {
    let mut items = vec![parse_order_by_item(reader)?];
    while reader.consume_punct(',') {
        items.push(parse_order_by_item(reader)?);
    }
    Ok(items)
}

fn parse_order_by_item(reader: &mut TokenReader) -> TranslationResult<OrderByItem> {
    let key = if let TokenKind::Integer(n) = reader.current().kind {
        reader.next();
        OrderKey::Position(n as u32)
    } else {
        OrderKey::Expr(parse_expression(reader)?)
    };
    let asc = if reader.consume_keyword("DESC") {
        false
    } else {
        reader.consume_keyword("ASC");
        true
    };
    Ok(OrderByItem { key, asc })
}
