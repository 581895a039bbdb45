use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),
    // ソース上の表記をそのまま保持する
    Number(String),
    String(String),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Var,
    Let,
    Const,
    Function,
    Return,
    If,
    Else,
    While,
    For,
    Try,
    Catch,
    Finally,
    New,
    This,
    Null,
    True,
    False,
    Typeof,
    Void,
    Delete,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum Punct {
    #[strum(serialize = "{")]
    OpenBrace,
    #[strum(serialize = "}")]
    CloseBrace,
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
    #[strum(serialize = "[")]
    OpenBracket,
    #[strum(serialize = "]")]
    CloseBracket,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "?")]
    Question,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "+=")]
    PlusEq,
    #[strum(serialize = "-=")]
    MinusEq,
    #[strum(serialize = "*=")]
    StarEq,
    #[strum(serialize = "/=")]
    SlashEq,
    #[strum(serialize = "%=")]
    PercentEq,
    #[strum(serialize = "**=")]
    StarStarEq,
    #[strum(serialize = "<<=")]
    ShlEq,
    #[strum(serialize = ">>=")]
    ShrEq,
    #[strum(serialize = ">>>=")]
    UShrEq,
    #[strum(serialize = "&=")]
    AmpEq,
    #[strum(serialize = "|=")]
    PipeEq,
    #[strum(serialize = "^=")]
    CaretEq,
    #[strum(serialize = "&&=")]
    AmpAmpEq,
    #[strum(serialize = "||=")]
    PipePipeEq,
    #[strum(serialize = "??=")]
    QuestionQuestionEq,
    #[strum(serialize = "==")]
    EqEq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "===")]
    EqEqEq,
    #[strum(serialize = "!==")]
    NotEqEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "**")]
    StarStar,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "%")]
    Percent,
    #[strum(serialize = "++")]
    PlusPlus,
    #[strum(serialize = "--")]
    MinusMinus,
    #[strum(serialize = "!")]
    Bang,
    #[strum(serialize = "~")]
    Tilde,
    #[strum(serialize = "&&")]
    AmpAmp,
    #[strum(serialize = "||")]
    PipePipe,
    #[strum(serialize = "??")]
    QuestionQuestion,
    #[strum(serialize = "&")]
    Amp,
    #[strum(serialize = "|")]
    Pipe,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = ">>>")]
    UShr,
}

impl Punct {
    pub const MAX_LEN: usize = 4;

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for Punct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TokenKind {
    pub fn is_punct(&self, punct: Punct) -> bool {
        matches!(self, TokenKind::Punct(p) if *p == punct)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, TokenKind::Keyword(k) if *k == keyword)
    }
}
