use logos::{Filter, Logos};

use crate::source::{BytePos, ByteRange};

#[derive(Clone, Debug, PartialEq, Eq, Logos)]
pub enum Token<'source> {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_']*(\.[a-zA-Z_][a-zA-Z0-9_']*)*")]
    Name(&'source str),

    #[token("axiom")]
    KeywordAxiom,
    #[token("def")]
    KeywordDef,
    #[token("fun")]
    KeywordFun,
    #[token("in")]
    KeywordIn,
    #[token("inductive")]
    KeywordInductive,
    #[token("notation")]
    KeywordNotation,
    #[token("rewrite")]
    KeywordRewrite,
    #[token("transparent")]
    KeywordTransparent,
    #[token("Type")]
    KeywordType,
    #[token("where")]
    KeywordWhere,
    #[token("with")]
    KeywordWith,

    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("=>")]
    EqualsGreater,
    #[token(".")]
    FullStop,
    #[token("->")]
    HyphenGreater,
    #[token("|")]
    Pipe,
    #[token(";")]
    Semicolon,
    #[token("_")]
    Underscore,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,

    #[token(r"/*", block_comment)]
    BlockComment(BlockCommentError),

    #[error]
    #[regex(r"\p{Whitespace}", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,
}

const OPEN: &str = "/*";
const CLOSE: &str = "*/";
const LEN: BytePos = OPEN.len() as BytePos;

fn block_comment<'source>(
    lexer: &mut logos::Lexer<'source, Token<'source>>,
) -> Filter<BlockCommentError> {
    let start = lexer.span().start as BytePos;
    let first_open_pos = start;
    let mut last_close_pos = start;
    let mut pos = start;

    let mut depth: u32 = 1;
    while let Some(c) = lexer.remainder().chars().next() {
        if lexer.remainder().starts_with(OPEN) {
            pos += LEN;
            lexer.bump(OPEN.len());
            depth += 1;
        } else if lexer.remainder().starts_with(CLOSE) {
            pos += LEN;
            last_close_pos = pos;
            lexer.bump(CLOSE.len());
            depth -= 1;
            if depth == 0 {
                break;
            }
        } else {
            pos += c.len_utf8() as BytePos;
            lexer.bump(c.len_utf8());
        }
    }

    match depth {
        0 => Filter::Skip,
        _ => Filter::Emit(BlockCommentError {
            depth,
            first_open: ByteRange::new(first_open_pos, first_open_pos + LEN),
            last_close: ByteRange::new(last_close_pos, last_close_pos + LEN),
        }),
    }
}

pub type Spanned<Tok, Loc> = (Loc, Tok, Loc);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UnclosedBlockComment(BlockCommentError),
    UnexpectedCharacter { range: ByteRange },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockCommentError {
    pub depth: u32,
    pub first_open: ByteRange,
    pub last_close: ByteRange,
}

impl Error {
    pub fn range(&self) -> ByteRange {
        match self {
            Error::UnexpectedCharacter { range } => *range,
            Error::UnclosedBlockComment(BlockCommentError { first_open, .. }) => *first_open,
        }
    }
}

pub fn tokens(source: &str) -> impl Iterator<Item = Result<Spanned<Token<'_>, BytePos>, Error>> {
    assert!(
        source.len() <= u32::MAX as usize,
        "`source` must be less than 4GiB in length"
    );

    Token::lexer(source).spanned().map(|(token, range)| {
        let start = range.start as BytePos;
        let end = range.end as BytePos;
        match token {
            Token::BlockComment(err) => Err(Error::UnclosedBlockComment(err)),
            Token::Error => Err(Error::UnexpectedCharacter {
                range: ByteRange::new(start, end),
            }),
            token => Ok((start, token, end)),
        }
    })
}

impl<'source> Token<'source> {
    pub fn description(&self) -> &'static str {
        match self {
            Token::Name(_) => "name",
            Token::KeywordAxiom => "axiom",
            Token::KeywordDef => "def",
            Token::KeywordFun => "fun",
            Token::KeywordIn => "in",
            Token::KeywordInductive => "inductive",
            Token::KeywordNotation => "notation",
            Token::KeywordRewrite => "rewrite",
            Token::KeywordTransparent => "transparent",
            Token::KeywordType => "Type",
            Token::KeywordWhere => "where",
            Token::KeywordWith => "with",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::EqualsGreater => "=>",
            Token::FullStop => ".",
            Token::HyphenGreater => "->",
            Token::Pipe => "|",
            Token::Semicolon => ";",
            Token::Underscore => "_",
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::BlockComment(_) => "block comment",
            Token::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokens(source).map(|token| token.unwrap().1).collect()
    }

    #[test]
    fn dotted_names() {
        assert_eq!(
            kinds("length.equation_1 .n"),
            vec![
                Token::Name("length.equation_1"),
                Token::FullStop,
                Token::Name("n"),
            ],
        );
    }

    #[test]
    fn nested_comments_are_skipped() {
        assert_eq!(
            kinds("def /* a /* b */ c */ f // trailing"),
            vec![Token::KeywordDef, Token::Name("f")],
        );
    }

    #[test]
    fn unclosed_comments_are_reported() {
        let errors: Vec<_> = tokens("/* /* */").filter_map(Result::err).collect();
        assert!(matches!(&errors[..], [Error::UnclosedBlockComment(BlockCommentError { depth: 1, .. })]));
    }
}
