use crate::error::CompilerError;
use crate::span::{Pos, Span};
use crate::token::{Keyword, Punct, Token, TokenKind};
use nom::{
    Err, Finish, IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take, take_until, take_while, take_while1},
    character::complete::{digit0, digit1, satisfy},
    combinator::{consumed, cut, eof as nom_eof, map, opt, recognize},
    error::{ErrorKind, ParseError, VerboseError, VerboseErrorKind},
    multi::many0,
    sequence::{pair, tuple},
};
use nom_locate::LocatedSpan;
use std::fmt::Write;

pub type LocatedStr<'a> = LocatedSpan<&'a str>;

type LexResult<'a, T> = IResult<LocatedStr<'a>, T, VerboseError<LocatedStr<'a>>>;

// トークンが複数行にまたがることはないという前提
fn to_span(located: &LocatedStr) -> Span {
    let start = to_pos(located);
    let end = Pos::new(
        start.line,
        start.column + located.fragment().chars().count(),
    );
    Span::new(start, end)
}

fn to_pos(located: &LocatedStr) -> Pos {
    Pos::new(located.location_line() as usize, located.get_utf8_column())
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn identifier_or_keyword(input: LocatedStr) -> LexResult<TokenKind> {
    let (input, ident) = recognize(pair(
        satisfy(is_identifier_start),
        take_while(is_identifier_continue),
    ))(input)?;
    let ident = *ident.fragment();
    let kind = match ident.parse::<Keyword>() {
        Ok(keyword) => TokenKind::Keyword(keyword),
        Err(_) => TokenKind::Identifier(ident.to_string()),
    };
    Ok((input, kind))
}

fn number(input: LocatedStr) -> LexResult<TokenKind> {
    let (input, digits) = alt((
        recognize(pair(
            alt((tag("0x"), tag("0X"))),
            take_while1(|c: char| c.is_ascii_hexdigit()),
        )),
        recognize(tuple((
            digit1,
            opt(pair(tag("."), digit0)),
            opt(tuple((
                alt((tag("e"), tag("E"))),
                opt(alt((tag("+"), tag("-")))),
                digit1,
            ))),
        ))),
    ))(input)?;
    // 123abc のように識別子が直後に続くものは不正
    if input.fragment().starts_with(is_identifier_continue) {
        return Err(Err::Failure(VerboseError::from_error_kind(
            input,
            ErrorKind::Digit,
        )));
    }
    Ok((input, TokenKind::Number(digits.fragment().to_string())))
}

fn string(input: LocatedStr) -> LexResult<TokenKind> {
    let fragment = *input.fragment();
    let Some(quote) = fragment.chars().next().filter(|&c| c == '"' || c == '\'') else {
        return Err(Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Char,
        )));
    };
    let mut escaped = false;
    let mut len = None;
    for (i, c) in fragment.chars().enumerate().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            len = Some(i + 1);
            break;
        } else if c == '\n' {
            break;
        }
    }
    let Some(len) = len else {
        return Err(Err::Failure(VerboseError::from_error_kind(
            input,
            ErrorKind::Char,
        )));
    };
    let (input, raw) = take(len)(input)?;
    Ok((input, TokenKind::String(raw.fragment().to_string())))
}

fn punct(input: LocatedStr) -> LexResult<TokenKind> {
    let fragment = *input.fragment();
    // 最長一致
    for len in (1..=Punct::MAX_LEN).rev() {
        let Some(candidate) = fragment.get(..len) else {
            continue;
        };
        if let Ok(punct) = candidate.parse::<Punct>() {
            let (input, _) = take(len)(input)?;
            return Ok((input, TokenKind::Punct(punct)));
        }
    }
    Err(Err::Error(VerboseError::from_error_kind(
        input,
        ErrorKind::Tag,
    )))
}

fn token_kind(input: LocatedStr) -> LexResult<TokenKind> {
    // 順番に意味がある
    alt((identifier_or_keyword, number, string, punct)).parse(input)
}

fn space(input: LocatedStr) -> LexResult<()> {
    map(take_while1(|c: char| c.is_whitespace()), |_| ()).parse(input)
}

fn line_comment(input: LocatedStr) -> LexResult<()> {
    let (input, _) = tag("//")(input)?;
    let (input, _) = take_while(|c: char| c != '\n')(input)?;
    Ok((input, ()))
}

fn block_comment(input: LocatedStr) -> LexResult<()> {
    let (input, _) = tag("/*")(input)?;
    let (input, _) = cut(pair(take_until("*/"), tag("*/")))(input)?;
    Ok((input, ()))
}

fn ignore(input: LocatedStr) -> LexResult<()> {
    let (input, _) = many0(alt((space, line_comment, block_comment)))(input)?;
    Ok((input, ()))
}

fn token(input: LocatedStr) -> LexResult<Token> {
    let (input, _) = ignore(input)?;
    let (input, (pos, kind)) = consumed(token_kind)(input)?;
    Ok((
        input,
        Token {
            kind,
            span: to_span(&pos),
        },
    ))
}

fn eof(input: LocatedStr) -> LexResult<Token> {
    let (input, _) = ignore(input)?;
    let (input, (pos, _)) = consumed(nom_eof)(input)?;
    Ok((
        input,
        Token {
            kind: TokenKind::Eof,
            span: to_span(&pos),
        },
    ))
}

fn tokens(input: LocatedStr) -> LexResult<Vec<Token>> {
    let (input, mut tokens) = many0(token)(input)?;
    let (input, eof_token) = eof(input)?;
    tokens.push(eof_token);
    Ok((input, tokens))
}

fn convert_error(e: VerboseError<LocatedStr>) -> CompilerError {
    let mut result = String::new();

    for (substring, kind) in e.errors.iter() {
        let pos = to_pos(substring);

        match kind {
            VerboseErrorKind::Char(c) => {
                if let Some(actual) = substring.chars().next() {
                    writeln!(
                        &mut result,
                        "{pos}: expected '{expected}', found {actual}",
                        pos = pos,
                        expected = c,
                        actual = actual,
                    )
                } else {
                    writeln!(
                        &mut result,
                        "{pos}: expected '{expected}', got end of input",
                        pos = pos,
                        expected = c,
                    )
                }
            }
            VerboseErrorKind::Context(s) => {
                writeln!(&mut result, "{pos}, in {context}:", pos = pos, context = s)
            }
            VerboseErrorKind::Nom(e) => match substring.chars().next() {
                Some(actual) => writeln!(
                    &mut result,
                    "{pos}: unexpected character {actual:?} ({nom_err:?})",
                    pos = pos,
                    nom_err = e,
                ),
                None => writeln!(
                    &mut result,
                    "{pos}: unexpected end of input ({nom_err:?})",
                    pos = pos,
                    nom_err = e,
                ),
            },
        }
        .expect("writing to a String never fails");
    }

    CompilerError(result)
}

pub fn lex(input: &str) -> Result<Vec<Token>, CompilerError> {
    let input = LocatedStr::new(input);
    let (input, tokens) = tokens(input).finish().map_err(convert_error)?;
    debug_assert!(input.fragment().is_empty());
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_lex_statement() {
        assert_eq!(
            kinds("var x = f(1);"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier("x".to_string()),
                TokenKind::Punct(Punct::Eq),
                TokenKind::Identifier("f".to_string()),
                TokenKind::Punct(Punct::OpenParen),
                TokenKind::Number("1".to_string()),
                TokenKind::Punct(Punct::CloseParen),
                TokenKind::Punct(Punct::Semicolon),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_longest_punct() {
        assert_eq!(
            kinds("a !== b >>>= c"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Punct(Punct::NotEqEq),
                TokenKind::Identifier("b".to_string()),
                TokenKind::Punct(Punct::UShrEq),
                TokenKind::Identifier("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_literals_and_comments() {
        assert_eq!(
            kinds("// line\n'it\\'s' /* block */ 0x1F 1.5e3 \"x\""),
            vec![
                TokenKind::String("'it\\'s'".to_string()),
                TokenKind::Number("0x1F".to_string()),
                TokenKind::Number("1.5e3".to_string()),
                TokenKind::String("\"x\"".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_span() {
        let tokens = lex("a\n  foo").unwrap();
        assert_eq!(tokens[1].span.start, Pos::new(2, 3));
        assert_eq!(tokens[1].span.end, Pos::new(2, 6));
    }

    #[test]
    fn test_lex_error() {
        assert!(lex("123abc").is_err());
        assert!(lex("'unterminated").is_err());
        assert!(lex("a # b").is_err());
        assert!(lex("/* open").is_err());
    }
}
