//! Recursive-descent expression parser (spec §4.2). Precedence, lowest to
//! highest: `OR < AND < NOT < comparison < | < & < + - < * / % < unary <
//! call/subscript`. Parenthesised groups disambiguate everywhere else.

use crate::error::{ErrorKind, TranslationResult};
use crate::ir::{
    BinaryOp, CaseExpr, Expression, FunctionCall, Identifier, InSource, IntervalUnit, Literal,
    SubqueryKind, UnaryOp, WindowSpec,
};
use crate::reader::TokenReader;
use crate::token::TokenKind;

use super::clauses::{parse_expr_list, parse_order_by_list};
use super::select::parse_select_statement;

/// Internal convention recognised by the lowering engine, not the catalogue:
/// a parenthesised tuple `(a, b)` used as the left side of a row-subquery
/// comparison. Never surfaced in error messages or documentation as a real
/// SQL function.
pub const TUPLE_MARKER: &str = "__TUPLE__";

fn syntax_err(reader: &TokenReader, expected: &str) -> crate::error::TranslationError {
    ErrorKind::SyntaxError {
        expected: expected.to_string(),
        found: reader.current().describe(),
    }
    .into()
}

fn expect_keyword(reader: &mut TokenReader, word: &str) -> TranslationResult<()> {
    if reader.consume_keyword(word) {
        Ok(())
    } else {
        Err(syntax_err(reader, word))
    }
}

fn expect_punct(reader: &mut TokenReader, c: char) -> TranslationResult<()> {
    if reader.consume_punct(c) {
        Ok(())
    } else {
        Err(syntax_err(reader, &c.to_string()))
    }
}

pub fn parse_expression(reader: &mut TokenReader) -> TranslationResult<Expression> {
    parse_or(reader)
}

fn parse_or(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_and(reader)?;
    while reader.consume_keyword("OR") {
        let rhs = parse_and(reader)?;
        lhs = Expression::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_not_level(reader)?;
    while reader.consume_keyword("AND") {
        let rhs = parse_not_level(reader)?;
        lhs = Expression::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_not_level(reader: &mut TokenReader) -> TranslationResult<Expression> {
    if reader.peek_keyword("NOT") && reader.peek_keyword_at(1, "EXISTS") {
        reader.next();
        reader.next();
        let query = parse_parenthesised_select(reader)?;
        return Ok(Expression::Subquery {
            query: Box::new(query),
            kind: SubqueryKind::NotExists,
        });
    }
    if reader.consume_keyword("NOT") {
        let inner = parse_not_level(reader)?;
        return Ok(Expression::Unary(UnaryOp::Not, Box::new(inner)));
    }
    parse_comparison(reader)
}

fn parse_parenthesised_select(reader: &mut TokenReader) -> TranslationResult<crate::ir::SelectStatement> {
    expect_punct(reader, '(')?;
    let stmt = parse_select_statement(reader)?;
    if !reader.consume_punct(')') {
        return Err(ErrorKind::UnclosedConstruct("subquery".to_string()).into());
    }
    Ok(stmt)
}

const COMPARISON_OPS: &[(&str, BinaryOp)] = &[
    ("=", BinaryOp::Eq),
    ("<>", BinaryOp::Neq),
    ("!=", BinaryOp::Neq),
    ("<=", BinaryOp::Lte),
    (">=", BinaryOp::Gte),
    ("<", BinaryOp::Lt),
    (">", BinaryOp::Gt),
];

fn is_tuple_marker(expr: &Expression) -> bool {
    matches!(expr, Expression::FunctionCall(f) if f.name == TUPLE_MARKER)
}

fn parse_comparison(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let expr = parse_bitor(reader)?;

    let negated = reader.consume_keyword("NOT");

    if reader.consume_keyword("LIKE") {
        let pattern = parse_bitor(reader)?;
        return Ok(Expression::Like {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            negated,
        });
    }
    if reader.peek_keyword("REGEXP") || reader.peek_keyword("RLIKE") {
        reader.next();
        let pattern = parse_bitor(reader)?;
        return Ok(Expression::Regexp {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
            negated,
        });
    }
    if reader.consume_keyword("IN") {
        let source = parse_in_source(reader)?;
        return Ok(Expression::In {
            expr: Box::new(expr),
            source,
            negated,
        });
    }
    if reader.consume_keyword("BETWEEN") {
        let low = parse_bitor(reader)?;
        expect_keyword(reader, "AND")?;
        let high = parse_bitor(reader)?;
        let between = Expression::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
        };
        return Ok(if negated {
            Expression::Unary(UnaryOp::Not, Box::new(between))
        } else {
            between
        });
    }
    if negated {
        return Err(syntax_err(reader, "LIKE, IN, BETWEEN, or REGEXP after NOT"));
    }

    if reader.consume_keyword("IS") {
        let is_negated = reader.consume_keyword("NOT");
        expect_keyword(reader, "NULL")?;
        return Ok(Expression::IsNull {
            expr: Box::new(expr),
            negated: is_negated,
        });
    }

    for (op_str, bop) in COMPARISON_OPS {
        if reader.consume_operator(op_str) {
            let rhs = parse_bitor(reader)?;
            if *bop == BinaryOp::Eq && is_tuple_marker(&expr) {
                if let Expression::Subquery { query, kind } = rhs {
                    if kind == SubqueryKind::Scalar {
                        return Ok(Expression::Binary(
                            BinaryOp::Eq,
                            Box::new(expr),
                            Box::new(Expression::Subquery {
                                query,
                                kind: SubqueryKind::Row,
                            }),
                        ));
                    }
                    return Ok(Expression::Binary(
                        BinaryOp::Eq,
                        Box::new(expr),
                        Box::new(Expression::Subquery { query, kind }),
                    ));
                }
                return Ok(Expression::Binary(BinaryOp::Eq, Box::new(expr), Box::new(rhs)));
            }
            return Ok(Expression::Binary(*bop, Box::new(expr), Box::new(rhs)));
        }
    }
    Ok(expr)
}

fn parse_in_source(reader: &mut TokenReader) -> TranslationResult<InSource> {
    expect_punct(reader, '(')?;
    if reader.peek_keyword("SELECT") {
        let stmt = parse_select_statement(reader)?;
        if !reader.consume_punct(')') {
            return Err(ErrorKind::UnclosedConstruct("subquery".to_string()).into());
        }
        return Ok(InSource::Subquery(Box::new(stmt)));
    }
    let mut list = vec![parse_expression(reader)?];
    while reader.consume_punct(',') {
        list.push(parse_expression(reader)?);
    }
    if !reader.consume_punct(')') {
        return Err(ErrorKind::UnclosedConstruct("IN (...)".to_string()).into());
    }
    Ok(InSource::List(list))
}

fn parse_bitor(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_bitand(reader)?;
    loop {
        if reader.consume_operator("||") {
            let rhs = parse_bitand(reader)?;
            lhs = Expression::Binary(BinaryOp::Concat, Box::new(lhs), Box::new(rhs));
        } else if reader.consume_operator("|") {
            let rhs = parse_bitand(reader)?;
            lhs = Expression::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_bitand(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_additive(reader)?;
    while reader.consume_operator("&") {
        let rhs = parse_additive(reader)?;
        lhs = Expression::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_additive(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_multiplicative(reader)?;
    loop {
        if reader.consume_operator("+") {
            let rhs = parse_multiplicative(reader)?;
            lhs = Expression::Binary(BinaryOp::Add, Box::new(lhs), Box::new(rhs));
        } else if reader.consume_operator("-") {
            let rhs = parse_multiplicative(reader)?;
            lhs = Expression::Binary(BinaryOp::Sub, Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_multiplicative(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let mut lhs = parse_unary(reader)?;
    loop {
        if reader.consume_operator("*") {
            let rhs = parse_unary(reader)?;
            lhs = Expression::Binary(BinaryOp::Mul, Box::new(lhs), Box::new(rhs));
        } else if reader.consume_operator("/") {
            let rhs = parse_unary(reader)?;
            lhs = Expression::Binary(BinaryOp::Div, Box::new(lhs), Box::new(rhs));
        } else if reader.consume_operator("%") {
            let rhs = parse_unary(reader)?;
            lhs = Expression::Binary(BinaryOp::Mod, Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_unary(reader: &mut TokenReader) -> TranslationResult<Expression> {
    if reader.consume_operator("-") {
        return Ok(Expression::Unary(UnaryOp::Neg, Box::new(parse_unary(reader)?)));
    }
    if reader.consume_operator("~") {
        return Ok(Expression::Unary(UnaryOp::BitNot, Box::new(parse_unary(reader)?)));
    }
    if reader.peek_keyword("NOT") {
        // handled at parse_not_level; reaching here means NOT appeared at an
        // unexpected (unary) position, e.g. inside a function argument.
        reader.next();
        return Ok(Expression::Unary(UnaryOp::Not, Box::new(parse_unary(reader)?)));
    }
    parse_primary(reader)
}

fn parse_primary(reader: &mut TokenReader) -> TranslationResult<Expression> {
    if reader.consume_punct('(') {
        if reader.peek_keyword("SELECT") {
            let stmt = parse_select_statement(reader)?;
            if !reader.consume_punct(')') {
                return Err(ErrorKind::UnclosedConstruct("subquery".to_string()).into());
            }
            return Ok(Expression::Subquery {
                query: Box::new(stmt),
                kind: SubqueryKind::Scalar,
            });
        }
        let mut items = vec![parse_expression(reader)?];
        while reader.consume_punct(',') {
            items.push(parse_expression(reader)?);
        }
        if !reader.consume_punct(')') {
            return Err(ErrorKind::UnclosedConstruct("(...)".to_string()).into());
        }
        if items.len() == 1 {
            return Ok(items.into_iter().next().unwrap());
        }
        return Ok(Expression::FunctionCall(FunctionCall {
            name: TUPLE_MARKER.to_string(),
            args: items,
            distinct: false,
            window: None,
            order_by: Vec::new(),
            separator: None,
        }));
    }

    if reader.consume_keyword("EXISTS") {
        let query = parse_parenthesised_select(reader)?;
        return Ok(Expression::Subquery {
            query: Box::new(query),
            kind: SubqueryKind::Exists,
        });
    }

    if reader.consume_keyword("CASE") {
        return parse_case(reader);
    }

    if reader.consume_keyword("INTERVAL") {
        return parse_interval_literal(reader);
    }

    if reader.consume_keyword("TRUE") {
        return Ok(Expression::Lit(Literal::Boolean(true)));
    }
    if reader.consume_keyword("FALSE") {
        return Ok(Expression::Lit(Literal::Boolean(false)));
    }
    if reader.consume_keyword("NULL") {
        return Ok(Expression::Lit(Literal::Null));
    }

    if reader.consume_punct('*') {
        return Ok(Expression::Star);
    }

    let tok = reader.current().clone();
    match tok.kind {
        TokenKind::Integer(n) => {
            reader.next();
            Ok(Expression::Lit(Literal::Integer(n)))
        }
        TokenKind::Float(f) => {
            reader.next();
            Ok(Expression::Lit(Literal::Float(f)))
        }
        TokenKind::Str(s) => {
            reader.next();
            Ok(Expression::Lit(Literal::String(s)))
        }
        TokenKind::Name(_) | TokenKind::Backtick(_) => parse_identifier_or_call(reader),
        TokenKind::Keyword(ref k) if super::is_function_like_keyword(k) => {
            parse_identifier_or_call(reader)
        }
        _ => Err(syntax_err(reader, "expression")),
    }
}

fn parse_identifier_or_call(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let first = match &reader.current().kind {
        TokenKind::Name(n) => n.clone(),
        TokenKind::Backtick(n) => n.clone(),
        TokenKind::Keyword(k) => k.clone(),
        _ => return Err(syntax_err(reader, "identifier")),
    };
    reader.next();

    if reader.consume_punct('.') {
        if reader.consume_punct('*') {
            return Ok(Expression::QualifiedStar(first));
        }
        let member = reader
            .current()
            .as_name()
            .map(str::to_string)
            .ok_or_else(|| syntax_err(reader, "identifier"))?;
        reader.next();
        if reader.current().kind == TokenKind::Punct('(') {
            // not valid SQL (`table.func(...)`); treat as qualified column.
            return Ok(Expression::Column(Identifier::qualified(first, member)));
        }
        return Ok(Expression::Column(Identifier::qualified(first, member)));
    }

    if reader.current().kind == TokenKind::Punct('(') {
        return parse_function_call(reader, first);
    }

    Ok(Expression::Column(Identifier::unqualified(first)))
}

fn parse_function_call(reader: &mut TokenReader, raw_name: String) -> TranslationResult<Expression> {
    let name = raw_name.to_ascii_uppercase();
    expect_punct(reader, '(')?;

    if name == "EXTRACT" {
        let unit_tok = reader.next();
        let unit = match &unit_tok.kind {
            TokenKind::Keyword(k) => k.clone(),
            TokenKind::Name(n) => n.to_ascii_uppercase(),
            _ => return Err(syntax_err(reader, "interval unit")),
        };
        expect_keyword(reader, "FROM")?;
        let expr = parse_expression(reader)?;
        expect_punct(reader, ')')?;
        return Ok(Expression::FunctionCall(FunctionCall {
            name,
            args: vec![Expression::Lit(Literal::String(unit)), expr],
            distinct: false,
            window: None,
            order_by: Vec::new(),
            separator: None,
        }));
    }

    if name == "CAST" {
        let expr = parse_expression(reader)?;
        expect_keyword(reader, "AS")?;
        let type_tok = reader.next();
        let mut type_name = match &type_tok.kind {
            TokenKind::Keyword(k) => k.clone(),
            TokenKind::Name(n) => n.to_ascii_uppercase(),
            _ => return Err(syntax_err(reader, "type name")),
        };
        if reader.consume_punct('(') {
            while !reader.consume_punct(')') {
                if reader.at_end() {
                    return Err(ErrorKind::UnclosedConstruct("CAST type".to_string()).into());
                }
                reader.next();
            }
        }
        type_name = type_name.to_string();
        expect_punct(reader, ')')?;
        return Ok(Expression::FunctionCall(FunctionCall {
            name,
            args: vec![expr, Expression::Lit(Literal::String(type_name))],
            distinct: false,
            window: None,
            order_by: Vec::new(),
            separator: None,
        }));
    }

    if name == "IF" {
        let cond = parse_expression(reader)?;
        expect_punct(reader, ',')?;
        let then_branch = parse_expression(reader)?;
        expect_punct(reader, ',')?;
        let else_branch = parse_expression(reader)?;
        expect_punct(reader, ')')?;
        return Ok(Expression::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        });
    }

    if name == "COALESCE" {
        let mut args = vec![parse_expression(reader)?];
        while reader.consume_punct(',') {
            args.push(parse_expression(reader)?);
        }
        expect_punct(reader, ')')?;
        return Ok(Expression::Coalesce(args));
    }

    if name == "NULLIF" {
        let a = parse_expression(reader)?;
        expect_punct(reader, ',')?;
        let b = parse_expression(reader)?;
        expect_punct(reader, ')')?;
        return Ok(Expression::NullIf(Box::new(a), Box::new(b)));
    }

    let distinct = reader.consume_keyword("DISTINCT");
    let mut args = Vec::new();
    if reader.current().kind == TokenKind::Punct('*') {
        reader.next();
        args.push(Expression::Star);
    } else if reader.current().kind != TokenKind::Punct(')') {
        args.push(parse_expression(reader)?);
        while reader.consume_punct(',') {
            args.push(parse_expression(reader)?);
        }
    }

    let mut order_by = Vec::new();
    let mut separator = None;
    if name == "GROUP_CONCAT" {
        if reader.consume_keyword("ORDER") {
            expect_keyword(reader, "BY")?;
            order_by = parse_order_by_list(reader)?;
        }
        if reader.consume_keyword("SEPARATOR") {
            if let TokenKind::Str(s) = &reader.current().kind {
                separator = Some(s.clone());
                reader.next();
            } else {
                return Err(syntax_err(reader, "string literal"));
            }
        }
    }

    expect_punct(reader, ')')?;

    let window = if reader.consume_keyword("OVER") {
        expect_punct(reader, '(')?;
        let mut partition_by = Vec::new();
        if reader.consume_keyword("PARTITION") {
            expect_keyword(reader, "BY")?;
            partition_by = parse_expr_list(reader)?;
        }
        let mut win_order_by = Vec::new();
        if reader.consume_keyword("ORDER") {
            expect_keyword(reader, "BY")?;
            win_order_by = parse_order_by_list(reader)?;
        }
        expect_punct(reader, ')')?;
        Some(WindowSpec {
            partition_by,
            order_by: win_order_by,
        })
    } else {
        None
    };

    Ok(Expression::FunctionCall(FunctionCall {
        name,
        args,
        distinct,
        window,
        order_by,
        separator,
    }))
}

fn parse_case(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let operand = if reader.peek_keyword("WHEN") {
        None
    } else {
        Some(Box::new(parse_expression(reader)?))
    };
    let mut branches = Vec::new();
    while reader.consume_keyword("WHEN") {
        let when = parse_expression(reader)?;
        expect_keyword(reader, "THEN")?;
        let then = parse_expression(reader)?;
        branches.push((when, then));
    }
    if branches.is_empty() {
        return Err(syntax_err(reader, "WHEN"));
    }
    let else_branch = if reader.consume_keyword("ELSE") {
        Some(Box::new(parse_expression(reader)?))
    } else {
        None
    };
    expect_keyword(reader, "END")?;
    Ok(Expression::Case(CaseExpr {
        operand,
        branches,
        else_branch,
    }))
}

fn parse_interval_literal(reader: &mut TokenReader) -> TranslationResult<Expression> {
    let negative = reader.consume_operator("-");
    let amount = match reader.next().kind {
        TokenKind::Integer(n) => n as f64,
        TokenKind::Float(f) => f,
        _ => return Err(syntax_err(reader, "interval amount")),
    };
    let amount = if negative { -amount } else { amount };
    let unit_tok = reader.next();
    let unit_word = match &unit_tok.kind {
        TokenKind::Keyword(k) => k.clone(),
        TokenKind::Name(n) => n.to_ascii_uppercase(),
        _ => return Err(syntax_err(reader, "interval unit")),
    };
    let unit = IntervalUnit::from_sql(&unit_word).ok_or_else(|| syntax_err(reader, "interval unit"))?;
    Ok(Expression::Lit(Literal::Interval(amount, unit)))
}
