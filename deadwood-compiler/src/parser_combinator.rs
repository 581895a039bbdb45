use nom::{
    Err, IResult, Parser,
    error::{ErrorKind, ParseError},
};

use crate::token::{Keyword, Punct, Token, TokenKind};

pub type Tokens<'a> = &'a [Token];

pub fn satisfy_map_opt<'a, T: 'a, R, E: ParseError<&'a [T]>>(
    f: impl Fn(&T) -> Option<R>,
) -> impl Parser<&'a [T], R, E> {
    move |input: &'a [T]| match input.split_first() {
        Some((x, xs)) => match f(x) {
            Some(r) => Ok((xs, r)),
            None => Err(Err::Error(E::from_error_kind(input, ErrorKind::MapOpt))),
        },
        None => Err(Err::Error(E::from_error_kind(input, ErrorKind::Eof))),
    }
}

pub fn satisfy<'a, T: 'a, F, E: ParseError<&'a [T]>>(f: F) -> impl Parser<&'a [T], (), E>
where
    F: Fn(&T) -> bool,
{
    move |input: &'a [T]| satisfy_map_opt(|x| if f(x) { Some(()) } else { None }).parse(input)
}

pub fn punct<'a, E: ParseError<Tokens<'a>>>(p: Punct) -> impl Parser<Tokens<'a>, (), E> {
    satisfy(move |t: &Token| t.kind.is_punct(p))
}

pub fn keyword<'a, E: ParseError<Tokens<'a>>>(k: Keyword) -> impl Parser<Tokens<'a>, (), E> {
    satisfy(move |t: &Token| t.kind.is_keyword(k))
}

pub fn identifier<'a, E: ParseError<Tokens<'a>>>() -> impl Parser<Tokens<'a>, String, E> {
    satisfy_map_opt(|t: &Token| match &t.kind {
        TokenKind::Identifier(name) => Some(name.clone()),
        _ => None,
    })
}

// 入力を消費せずに先頭のトークンを覗く
pub fn peek_kind<'a>(input: Tokens<'a>) -> Option<&'a TokenKind> {
    input.first().map(|t| &t.kind)
}

pub fn peek_punct(input: Tokens, p: Punct) -> bool {
    peek_kind(input).is_some_and(|kind| kind.is_punct(p))
}

pub fn peek_keyword(input: Tokens, k: Keyword) -> bool {
    peek_kind(input).is_some_and(|kind| kind.is_keyword(k))
}

// 先頭のトークンが条件を満たせば消費する
pub fn eat<'a>(input: Tokens<'a>, f: impl Fn(&TokenKind) -> bool) -> (Tokens<'a>, bool) {
    match input.split_first() {
        Some((t, rest)) if f(&t.kind) => (rest, true),
        _ => (input, false),
    }
}

pub fn expect_punct<'a, E: ParseError<Tokens<'a>>>(
    input: Tokens<'a>,
    p: Punct,
) -> IResult<Tokens<'a>, (), E> {
    punct(p).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(kinds: Vec<TokenKind>) -> Vec<Token> {
        kinds
            .into_iter()
            .map(|kind| Token {
                kind,
                span: Default::default(),
            })
            .collect()
    }

    #[test]
    fn test_punct_and_identifier() {
        let tokens = tokens_of(vec![
            TokenKind::Identifier("a".to_string()),
            TokenKind::Punct(Punct::Semicolon),
        ]);
        let (rest, name) = identifier::<nom::error::Error<Tokens>>()
            .parse(&tokens)
            .unwrap();
        assert_eq!(name, "a");
        assert!(peek_punct(rest, Punct::Semicolon));
        assert!(punct::<nom::error::Error<Tokens>>(Punct::Comma)
            .parse(rest)
            .is_err());
        let (rest, eaten) = eat(rest, |kind| kind.is_punct(Punct::Semicolon));
        assert!(eaten);
        assert!(rest.is_empty());
    }
}
