use nom::{
    Err, IResult, Parser,
    error::{Error, ErrorKind},
};

use crate::ast::{
    Assign, AssignOp, Ast, Binary, BinaryOp, Call, CatchClause, Conditional, DeclKind, Declarator, For,
    Function, If, Literal, Logical, LogicalOp, Member, MemberProperty, NodeId, NodeKind, Property,
    PropertyKey, Try, Unary, UnaryOp, Update, UpdateOp, VarDecl, While,
};
use crate::error::{CompilerError, Result};
use crate::parser_combinator::{
    Tokens, eat, expect_punct, identifier, keyword, peek_keyword, peek_kind, peek_punct,
    satisfy_map_opt,
};
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind};

// ASTへの書き込みを伴うのでaltによるバックトラックは使わず、先読みで分岐する
type PResult<'a, T> = IResult<Tokens<'a>, T>;

fn fail<T>(input: Tokens) -> PResult<T> {
    Err(Err::Failure(Error::new(input, ErrorKind::Verify)))
}

fn span_of(start: Tokens, rest: Tokens) -> Span {
    let consumed = start.len() - rest.len();
    match (
        start.first(),
        consumed.checked_sub(1).and_then(|i| start.get(i)),
    ) {
        (Some(first), Some(last)) => first.span.merge(last.span),
        (Some(first), None) => first.span,
        (None, _) => Span::default(),
    }
}

fn at_end(input: Tokens) -> bool {
    matches!(peek_kind(input), None | Some(TokenKind::Eof))
}

// `;` か、`}`・EOF・改行の直前であれば省略可能
fn semicolon<'a>(start: Tokens<'a>, input: Tokens<'a>) -> PResult<'a, ()> {
    let (input, eaten) = eat(input, |kind| kind.is_punct(Punct::Semicolon));
    if eaten || at_end(input) || peek_punct(input, Punct::CloseBrace) {
        return Ok((input, ()));
    }
    match input.first() {
        Some(token) if token.span.start.line > span_of(start, input).end.line => Ok((input, ())),
        _ => fail(input),
    }
}

fn binding_identifier<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, name) = identifier().parse(input)?;
    Ok((input, ast.push(NodeKind::Ident(name), span_of(start, input))))
}

fn block_body<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, Vec<NodeId>> {
    let (mut input, _) = expect_punct(input, Punct::OpenBrace)?;
    let mut body = Vec::new();
    loop {
        if peek_punct(input, Punct::CloseBrace) {
            return Ok((&input[1..], body));
        }
        if at_end(input) {
            return fail(input);
        }
        let (rest, stmt) = statement(input, ast)?;
        body.push(stmt);
        input = rest;
    }
}

fn block<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, body) = block_body(input, ast)?;
    Ok((input, ast.push(NodeKind::Block(body), span_of(start, input))))
}

fn function<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, Function> {
    let (input, _) = keyword(Keyword::Function).parse(input)?;
    let (input, name) = match peek_kind(input) {
        Some(TokenKind::Identifier(_)) => {
            let (input, name) = binding_identifier(input, ast)?;
            (input, Some(name))
        }
        _ => (input, None),
    };
    let (mut input, _) = expect_punct(input, Punct::OpenParen)?;
    let mut params = Vec::new();
    if !peek_punct(input, Punct::CloseParen) {
        loop {
            let (rest, param) = binding_identifier(input, ast)?;
            params.push(param);
            let (rest, comma) = eat(rest, |kind| kind.is_punct(Punct::Comma));
            input = rest;
            if !comma {
                break;
            }
        }
    }
    let (input, _) = expect_punct(input, Punct::CloseParen)?;
    let (input, body) = block(input, ast)?;
    Ok((input, Function { name, params, body }))
}

fn decl_kind(kind: &TokenKind) -> Option<DeclKind> {
    match kind {
        TokenKind::Keyword(Keyword::Var) => Some(DeclKind::Var),
        TokenKind::Keyword(Keyword::Let) => Some(DeclKind::Let),
        TokenKind::Keyword(Keyword::Const) => Some(DeclKind::Const),
        _ => None,
    }
}

fn var_decl<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let Some(kind) = peek_kind(input).and_then(decl_kind) else {
        return fail(input);
    };
    let mut input = &input[1..];
    let mut declarators = Vec::new();
    loop {
        let (rest, name) = binding_identifier(input, ast)?;
        let (rest, init) = if peek_punct(rest, Punct::Eq) {
            let (rest, init) = assignment(&rest[1..], ast)?;
            (rest, Some(init))
        } else {
            (rest, None)
        };
        declarators.push(Declarator { name, init });
        let (rest, comma) = eat(rest, |kind| kind.is_punct(Punct::Comma));
        input = rest;
        if !comma {
            break;
        }
    }
    let decl = VarDecl { kind, declarators };
    Ok((
        input,
        ast.push(NodeKind::VarDecl(decl), span_of(start, input)),
    ))
}

fn parenthesized<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let (input, _) = expect_punct(input, Punct::OpenParen)?;
    let (input, expr) = expression(input, ast)?;
    let (input, _) = expect_punct(input, Punct::CloseParen)?;
    Ok((input, expr))
}

fn if_statement<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let (input, _) = keyword(Keyword::If).parse(input)?;
    let (input, test) = parenthesized(input, ast)?;
    let (input, consequent) = statement(input, ast)?;
    let (input, alternate) = if peek_keyword(input, Keyword::Else) {
        let (input, alternate) = statement(&input[1..], ast)?;
        (input, Some(alternate))
    } else {
        (input, None)
    };
    Ok((
        input,
        NodeKind::If(If {
            test,
            consequent,
            alternate,
        }),
    ))
}

fn for_clause<'a>(
    input: Tokens<'a>,
    ast: &mut Ast,
    close: Punct,
) -> PResult<'a, Option<NodeId>> {
    let (input, expr) = if peek_punct(input, close) {
        (input, None)
    } else {
        let (input, expr) = expression(input, ast)?;
        (input, Some(expr))
    };
    let (input, _) = expect_punct(input, close)?;
    Ok((input, expr))
}

fn for_statement<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let (input, _) = keyword(Keyword::For).parse(input)?;
    let (input, _) = expect_punct(input, Punct::OpenParen)?;
    let (input, init) = if peek_kind(input).and_then(decl_kind).is_some() {
        let (input, decl) = var_decl(input, ast)?;
        let (input, _) = expect_punct(input, Punct::Semicolon)?;
        (input, Some(decl))
    } else {
        for_clause(input, ast, Punct::Semicolon)?
    };
    let (input, test) = for_clause(input, ast, Punct::Semicolon)?;
    let (input, update) = for_clause(input, ast, Punct::CloseParen)?;
    let (input, body) = statement(input, ast)?;
    Ok((
        input,
        NodeKind::For(For {
            init,
            test,
            update,
            body,
        }),
    ))
}

fn try_statement<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let (input, _) = keyword(Keyword::Try).parse(input)?;
    let (input, try_block) = block(input, ast)?;
    let (input, handler) = if peek_keyword(input, Keyword::Catch) {
        let input = &input[1..];
        let (input, param) = if peek_punct(input, Punct::OpenParen) {
            let (input, param) = binding_identifier(&input[1..], ast)?;
            let (input, _) = expect_punct(input, Punct::CloseParen)?;
            (input, Some(param))
        } else {
            (input, None)
        };
        let (input, body) = block(input, ast)?;
        (input, Some(CatchClause { param, body }))
    } else {
        (input, None)
    };
    let (input, finalizer) = if peek_keyword(input, Keyword::Finally) {
        let (input, finalizer) = block(&input[1..], ast)?;
        (input, Some(finalizer))
    } else {
        (input, None)
    };
    if handler.is_none() && finalizer.is_none() {
        return fail(input);
    }
    Ok((
        input,
        NodeKind::Try(Try {
            block: try_block,
            handler,
            finalizer,
        }),
    ))
}

fn return_statement<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let start = input;
    let (input, _) = keyword(Keyword::Return).parse(input)?;
    let has_argument = match input.first() {
        Some(token) => {
            !(token.kind.is_punct(Punct::Semicolon)
                || token.kind.is_punct(Punct::CloseBrace)
                || token.kind == TokenKind::Eof
                || token.span.start.line > span_of(start, input).end.line)
        }
        None => false,
    };
    let (input, argument) = if has_argument {
        let (input, argument) = expression(input, ast)?;
        (input, Some(argument))
    } else {
        (input, None)
    };
    let (input, _) = semicolon(start, input)?;
    Ok((input, NodeKind::Return(argument)))
}

fn statement<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, kind) = match peek_kind(input) {
        Some(TokenKind::Punct(Punct::OpenBrace)) => {
            let (input, body) = block_body(input, ast)?;
            (input, NodeKind::Block(body))
        }
        Some(TokenKind::Punct(Punct::Semicolon)) => (&input[1..], NodeKind::Empty),
        Some(TokenKind::Keyword(Keyword::Function)) => {
            let (input, function) = function(input, ast)?;
            if function.name.is_none() {
                return fail(start);
            }
            (input, NodeKind::FunctionDecl(function))
        }
        Some(TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const)) => {
            let (input, decl) = var_decl(input, ast)?;
            let (input, _) = semicolon(start, input)?;
            // var_declが作ったノードを文としてそのまま使う
            return Ok((input, decl));
        }
        Some(TokenKind::Keyword(Keyword::If)) => if_statement(input, ast)?,
        Some(TokenKind::Keyword(Keyword::While)) => {
            let (input, _) = keyword(Keyword::While).parse(input)?;
            let (input, test) = parenthesized(input, ast)?;
            let (input, body) = statement(input, ast)?;
            (input, NodeKind::While(While { test, body }))
        }
        Some(TokenKind::Keyword(Keyword::For)) => for_statement(input, ast)?,
        Some(TokenKind::Keyword(Keyword::Try)) => try_statement(input, ast)?,
        Some(TokenKind::Keyword(Keyword::Return)) => return_statement(input, ast)?,
        _ => {
            let (input, expr) = expression(input, ast)?;
            let (input, _) = semicolon(start, input)?;
            (input, NodeKind::ExprStmt(expr))
        }
    };
    Ok((input, ast.push(kind, span_of(start, input))))
}

fn expression<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (mut input, first) = assignment(input, ast)?;
    let mut exprs = vec![first];
    loop {
        let (rest, comma) = eat(input, |kind| kind.is_punct(Punct::Comma));
        if !comma {
            break;
        }
        let (rest, expr) = assignment(rest, ast)?;
        exprs.push(expr);
        input = rest;
    }
    if exprs.len() == 1 {
        Ok((input, first))
    } else {
        Ok((
            input,
            ast.push(NodeKind::Sequence(exprs), span_of(start, input)),
        ))
    }
}

fn is_assignable(ast: &Ast, id: NodeId) -> bool {
    matches!(ast.kind(id), NodeKind::Ident(_) | NodeKind::Member(_))
}

fn assignment<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, target) = conditional(input, ast)?;
    let op = match peek_kind(input) {
        Some(TokenKind::Punct(punct)) => punct.as_str().parse::<AssignOp>().ok(),
        _ => None,
    };
    let Some(op) = op else {
        return Ok((input, target));
    };
    if !is_assignable(ast, target) {
        return fail(input);
    }
    let (input, value) = assignment(&input[1..], ast)?;
    Ok((
        input,
        ast.push(
            NodeKind::Assign(Assign { op, target, value }),
            span_of(start, input),
        ),
    ))
}

fn conditional<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, test) = binary(input, ast, 0)?;
    if !peek_punct(input, Punct::Question) {
        return Ok((input, test));
    }
    let (input, consequent) = assignment(&input[1..], ast)?;
    let (input, _) = expect_punct(input, Punct::Colon)?;
    let (input, alternate) = assignment(input, ast)?;
    Ok((
        input,
        ast.push(
            NodeKind::Conditional(Conditional {
                test,
                consequent,
                alternate,
            }),
            span_of(start, input),
        ),
    ))
}

#[derive(Debug, Clone, Copy)]
enum BinaryOperator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl BinaryOperator {
    fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Punct(punct) => {
                let s = punct.as_str();
                s.parse()
                    .map(BinaryOperator::Logical)
                    .or_else(|_| s.parse().map(BinaryOperator::Binary))
                    .ok()
            }
            TokenKind::Keyword(Keyword::In) => Some(BinaryOperator::Binary(BinaryOp::In)),
            TokenKind::Keyword(Keyword::Instanceof) => {
                Some(BinaryOperator::Binary(BinaryOp::Instanceof))
            }
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Binary(op) => op.precedence(),
            BinaryOperator::Logical(op) => op.precedence(),
        }
    }

    fn is_right_associative(self) -> bool {
        matches!(self, BinaryOperator::Binary(op) if op.is_right_associative())
    }
}

// 優先順位法
fn binary<'a>(input: Tokens<'a>, ast: &mut Ast, min_precedence: u8) -> PResult<'a, NodeId> {
    let start = input;
    let (mut input, mut left) = unary(input, ast)?;
    while let Some(op) = peek_kind(input).and_then(BinaryOperator::from_token) {
        let precedence = op.precedence();
        if precedence < min_precedence {
            break;
        }
        let next_min = if op.is_right_associative() {
            precedence
        } else {
            precedence + 1
        };
        let (rest, right) = binary(&input[1..], ast, next_min)?;
        input = rest;
        let kind = match op {
            BinaryOperator::Binary(op) => NodeKind::Binary(Binary { op, left, right }),
            BinaryOperator::Logical(op) => NodeKind::Logical(Logical { op, left, right }),
        };
        left = ast.push(kind, span_of(start, input));
    }
    Ok((input, left))
}

fn unary_op(kind: &TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Punct(punct @ (Punct::Bang | Punct::Minus | Punct::Plus | Punct::Tilde)) => {
            punct.as_str().parse().ok()
        }
        TokenKind::Keyword(keyword @ (Keyword::Typeof | Keyword::Void | Keyword::Delete)) => {
            <&str>::from(*keyword).parse().ok()
        }
        _ => None,
    }
}

fn update_op(kind: &TokenKind) -> Option<UpdateOp> {
    match kind {
        TokenKind::Punct(punct @ (Punct::PlusPlus | Punct::MinusMinus)) => {
            punct.as_str().parse().ok()
        }
        _ => None,
    }
}

fn unary<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    if let Some(op) = peek_kind(input).and_then(unary_op) {
        let (input, argument) = unary(&input[1..], ast)?;
        return Ok((
            input,
            ast.push(
                NodeKind::Unary(Unary { op, argument }),
                span_of(start, input),
            ),
        ));
    }
    if let Some(op) = peek_kind(input).and_then(update_op) {
        let (input, argument) = unary(&input[1..], ast)?;
        if !is_assignable(ast, argument) {
            return fail(input);
        }
        return Ok((
            input,
            ast.push(
                NodeKind::Update(Update {
                    op,
                    prefix: true,
                    argument,
                }),
                span_of(start, input),
            ),
        ));
    }
    postfix(input, ast)
}

fn postfix<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, argument) = call_member(input, ast)?;
    let op = match input.first() {
        // 改行を挟んだ ++ は次の文の前置演算子
        Some(token) if token.span.start.line == span_of(start, input).end.line => {
            update_op(&token.kind)
        }
        _ => None,
    };
    let Some(op) = op else {
        return Ok((input, argument));
    };
    if !is_assignable(ast, argument) {
        return fail(input);
    }
    let input = &input[1..];
    Ok((
        input,
        ast.push(
            NodeKind::Update(Update {
                op,
                prefix: false,
                argument,
            }),
            span_of(start, input),
        ),
    ))
}

fn property_name(input: Tokens) -> PResult<String> {
    satisfy_map_opt(|t: &Token| match &t.kind {
        TokenKind::Identifier(name) => Some(name.clone()),
        TokenKind::Keyword(keyword) => Some(<&str>::from(*keyword).to_string()),
        _ => None,
    })
    .parse(input)
}

fn arguments<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, Vec<NodeId>> {
    let (mut input, _) = expect_punct(input, Punct::OpenParen)?;
    let mut args = Vec::new();
    if !peek_punct(input, Punct::CloseParen) {
        loop {
            let (rest, arg) = assignment(input, ast)?;
            args.push(arg);
            let (rest, comma) = eat(rest, |kind| kind.is_punct(Punct::Comma));
            input = rest;
            if !comma {
                break;
            }
        }
    }
    let (input, _) = expect_punct(input, Punct::CloseParen)?;
    Ok((input, args))
}

// メンバアクセスと呼び出しの連鎖
// newの被演算子では呼び出しを含めない
fn member_tail<'a>(
    start: Tokens<'a>,
    mut input: Tokens<'a>,
    ast: &mut Ast,
    mut expr: NodeId,
    allow_call: bool,
) -> PResult<'a, NodeId> {
    loop {
        let kind = match peek_kind(input) {
            Some(TokenKind::Punct(Punct::Dot)) => {
                let (rest, name) = property_name(&input[1..])?;
                input = rest;
                NodeKind::Member(Member {
                    object: expr,
                    property: MemberProperty::Named(name),
                })
            }
            Some(TokenKind::Punct(Punct::OpenBracket)) => {
                let (rest, property) = expression(&input[1..], ast)?;
                let (rest, _) = expect_punct(rest, Punct::CloseBracket)?;
                input = rest;
                NodeKind::Member(Member {
                    object: expr,
                    property: MemberProperty::Computed(property),
                })
            }
            Some(TokenKind::Punct(Punct::OpenParen)) if allow_call => {
                let (rest, args) = arguments(input, ast)?;
                input = rest;
                NodeKind::Call(Call { callee: expr, args })
            }
            _ => return Ok((input, expr)),
        };
        expr = ast.push(kind, span_of(start, input));
    }
}

fn new_expression<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, _) = keyword(Keyword::New).parse(input)?;
    let callee_start = input;
    let (input, callee) = if peek_keyword(input, Keyword::New) {
        new_expression(input, ast)?
    } else {
        primary(input, ast)?
    };
    let (input, callee) = member_tail(callee_start, input, ast, callee, false)?;
    let (input, args) = if peek_punct(input, Punct::OpenParen) {
        arguments(input, ast)?
    } else {
        (input, Vec::new())
    };
    Ok((
        input,
        ast.push(NodeKind::New(Call { callee, args }), span_of(start, input)),
    ))
}

fn call_member<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, expr) = if peek_keyword(input, Keyword::New) {
        new_expression(input, ast)?
    } else {
        primary(input, ast)?
    };
    member_tail(start, input, ast, expr, true)
}

fn array<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let (mut input, _) = expect_punct(input, Punct::OpenBracket)?;
    let mut elements = Vec::new();
    while !peek_punct(input, Punct::CloseBracket) {
        let (rest, element) = assignment(input, ast)?;
        elements.push(element);
        let (rest, comma) = eat(rest, |kind| kind.is_punct(Punct::Comma));
        input = rest;
        if !comma {
            break;
        }
    }
    let (input, _) = expect_punct(input, Punct::CloseBracket)?;
    Ok((input, NodeKind::Array(elements)))
}

fn property_key<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, PropertyKey> {
    match peek_kind(input) {
        Some(TokenKind::String(raw)) => Ok((&input[1..], PropertyKey::String(raw.clone()))),
        Some(TokenKind::Number(raw)) => Ok((&input[1..], PropertyKey::Number(raw.clone()))),
        Some(TokenKind::Punct(Punct::OpenBracket)) => {
            let (input, key) = assignment(&input[1..], ast)?;
            let (input, _) = expect_punct(input, Punct::CloseBracket)?;
            Ok((input, PropertyKey::Computed(key)))
        }
        _ => {
            let (input, name) = property_name(input)?;
            Ok((input, PropertyKey::Named(name)))
        }
    }
}

fn object<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeKind> {
    let (mut input, _) = expect_punct(input, Punct::OpenBrace)?;
    let mut properties = Vec::new();
    while !peek_punct(input, Punct::CloseBrace) {
        let (rest, key) = property_key(input, ast)?;
        let (rest, _) = expect_punct(rest, Punct::Colon)?;
        let (rest, value) = assignment(rest, ast)?;
        properties.push(Property { key, value });
        let (rest, comma) = eat(rest, |kind| kind.is_punct(Punct::Comma));
        input = rest;
        if !comma {
            break;
        }
    }
    let (input, _) = expect_punct(input, Punct::CloseBrace)?;
    Ok((input, NodeKind::Object(properties)))
}

fn primary<'a>(input: Tokens<'a>, ast: &mut Ast) -> PResult<'a, NodeId> {
    let start = input;
    let (input, kind) = match peek_kind(input) {
        Some(TokenKind::Identifier(name)) => (&input[1..], NodeKind::Ident(name.clone())),
        Some(TokenKind::Number(raw)) => (
            &input[1..],
            NodeKind::Literal(Literal::Number(raw.clone())),
        ),
        Some(TokenKind::String(raw)) => (
            &input[1..],
            NodeKind::Literal(Literal::String(raw.clone())),
        ),
        Some(TokenKind::Keyword(Keyword::True)) => {
            (&input[1..], NodeKind::Literal(Literal::Bool(true)))
        }
        Some(TokenKind::Keyword(Keyword::False)) => {
            (&input[1..], NodeKind::Literal(Literal::Bool(false)))
        }
        Some(TokenKind::Keyword(Keyword::Null)) => (&input[1..], NodeKind::Literal(Literal::Null)),
        Some(TokenKind::Keyword(Keyword::This)) => (&input[1..], NodeKind::This),
        Some(TokenKind::Keyword(Keyword::Function)) => {
            let (input, function) = function(input, ast)?;
            (input, NodeKind::FunctionExpr(function))
        }
        // 括弧はノードとして残さない
        Some(TokenKind::Punct(Punct::OpenParen)) => return parenthesized(input, ast),
        Some(TokenKind::Punct(Punct::OpenBracket)) => array(input, ast)?,
        Some(TokenKind::Punct(Punct::OpenBrace)) => object(input, ast)?,
        _ => return fail(input),
    };
    Ok((input, ast.push(kind, span_of(start, input))))
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Identifier(name) => format!("identifier `{}`", name),
        TokenKind::Keyword(keyword) => format!("keyword `{}`", keyword),
        TokenKind::Number(raw) => format!("number `{}`", raw),
        TokenKind::String(raw) => format!("string {}", raw),
        TokenKind::Punct(punct) => format!("`{}`", punct),
        TokenKind::Eof => "end of input".to_string(),
    }
}

fn convert_error(e: Err<Error<Tokens>>) -> CompilerError {
    match e {
        Err::Incomplete(_) => compiler_error!("unexpected end of input"),
        Err::Error(e) | Err::Failure(e) => match e.input.first() {
            Some(token) if token.kind != TokenKind::Eof => compiler_error!(
                "unexpected {} at {}",
                describe(&token.kind),
                token.span.start
            ),
            _ => compiler_error!("unexpected end of input"),
        },
    }
}

pub fn parse(tokens: &[Token]) -> Result<Ast> {
    let mut ast = Ast::new();
    let mut input = tokens;
    let mut body = Vec::new();
    while !at_end(input) {
        let (rest, stmt) = statement(input, &mut ast).map_err(convert_error)?;
        body.push(stmt);
        input = rest;
    }
    let root = ast.root;
    ast.nodes[root].span = span_of(tokens, input);
    if let Some(program) = ast.statements_mut(root) {
        *program = body;
    }
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Result<Ast> {
        parse(&crate::lexer::lex(source)?)
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_str("a + b * c;").unwrap();
        let NodeKind::ExprStmt(expr) = ast.kind(ast.program_body()[0]) else {
            panic!("expected expression statement");
        };
        let NodeKind::Binary(add) = ast.kind(*expr) else {
            panic!("expected binary");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(
            ast.kind(add.right),
            NodeKind::Binary(Binary {
                op: BinaryOp::Mul,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_right_associative_assignment() {
        let ast = parse_str("a = b = 1").unwrap();
        let NodeKind::ExprStmt(expr) = ast.kind(ast.program_body()[0]) else {
            panic!("expected expression statement");
        };
        let NodeKind::Assign(outer) = ast.kind(*expr) else {
            panic!("expected assignment");
        };
        assert_eq!(ast.ident_name(outer.target), Some("a"));
        assert!(matches!(ast.kind(outer.value), NodeKind::Assign(_)));
    }

    #[test]
    fn test_parse_optional_semicolons() {
        let ast = parse_str("function foo() { var x = 1\n x++\n return x }\nfoo()").unwrap();
        assert_eq!(ast.program_body().len(), 2);
        let NodeKind::FunctionDecl(foo) = ast.kind(ast.program_body()[0]) else {
            panic!("expected function declaration");
        };
        assert_eq!(ast.statements(foo.body).map(|body| body.len()), Some(3));
    }

    #[test]
    fn test_parse_statements() {
        let source = r#"
            function f(a, b) {
                for (var i = 0; i < a; i++) { continue_(); }
                try { g(); } catch (e) { h(e); } finally { k(); }
                if (a) b(); else if (b) { a(); }
                while (1) x(1);
                var o = { a: 1, "b": [1, 2], [c]: new Foo(1).bar };
                return typeof a === "string" ? -a : !b;
            }
        "#;
        let ast = parse_str(source).unwrap();
        let NodeKind::FunctionDecl(f) = ast.kind(ast.program_body()[0]) else {
            panic!("expected function declaration");
        };
        assert_eq!(f.params.len(), 2);
        let body = ast.statements(f.body).unwrap();
        assert_eq!(body.len(), 6);
        assert!(matches!(ast.kind(body[0]), NodeKind::For(_)));
        assert!(matches!(ast.kind(body[1]), NodeKind::Try(_)));
        assert!(matches!(ast.kind(body[2]), NodeKind::If(_)));
        assert!(matches!(ast.kind(body[3]), NodeKind::While(_)));
        assert!(matches!(ast.kind(body[4]), NodeKind::VarDecl(_)));
        assert!(matches!(ast.kind(body[5]), NodeKind::Return(Some(_))));
    }

    #[test]
    fn test_parse_return_without_argument_before_newline() {
        let ast = parse_str("function f() { return\n1 }").unwrap();
        let NodeKind::FunctionDecl(f) = ast.kind(ast.program_body()[0]) else {
            panic!("expected function declaration");
        };
        let body = ast.statements(f.body).unwrap();
        assert!(matches!(ast.kind(body[0]), NodeKind::Return(None)));
        assert!(matches!(ast.kind(body[1]), NodeKind::ExprStmt(_)));
    }

    #[test]
    fn test_parse_error() {
        assert_eq!(
            parse_str("var = 1;").unwrap_err(),
            compiler_error!("unexpected `=` at 1:5")
        );
        assert_eq!(
            parse_str("function () {}").unwrap_err(),
            compiler_error!("unexpected keyword `function` at 1:1")
        );
        assert_eq!(
            parse_str("f(1").unwrap_err(),
            compiler_error!("unexpected end of input")
        );
        assert_eq!(
            parse_str("}").unwrap_err(),
            compiler_error!("unexpected `}}` at 1:1")
        );
        assert!(parse_str("1 = 2;").is_err());
        assert!(parse_str("a b").is_err());
    }
}
