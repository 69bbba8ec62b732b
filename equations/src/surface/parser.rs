//! Recursive-descent parser for the surface language.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use itertools::Itertools;

use crate::source::{BytePos, ByteRange, FileId};
use crate::surface::lexer::{self, Token};
use crate::surface::{Clause, Definition, Inductive, Item, Module, Param, Pattern, Rhs, Term};
use crate::symbol::Symbol;

/// Syntax errors.
#[derive(Clone, Debug)]
pub enum ParseMessage {
    Lexer(lexer::Error),
    UnrecognizedEof {
        range: ByteRange,
        expected: Vec<&'static str>,
    },
    UnrecognizedToken {
        range: ByteRange,
        token: &'static str,
        expected: Vec<&'static str>,
    },
    ExtraToken {
        range: ByteRange,
        token: &'static str,
    },
}

impl ParseMessage {
    pub fn range(&self) -> ByteRange {
        match self {
            ParseMessage::Lexer(error) => error.range(),
            ParseMessage::UnrecognizedEof { range, .. }
            | ParseMessage::UnrecognizedToken { range, .. }
            | ParseMessage::ExtraToken { range, .. } => *range,
        }
    }
}

pub(super) fn to_diagnostic(message: &ParseMessage, file_id: FileId) -> Diagnostic<FileId> {
    match message {
        ParseMessage::Lexer(lexer::Error::UnexpectedCharacter { range }) => Diagnostic::error()
            .with_message("unexpected character")
            .with_labels(vec![Label::primary(file_id, *range)]),
        ParseMessage::Lexer(lexer::Error::UnclosedBlockComment(error)) => Diagnostic::error()
            .with_message("unclosed block comment")
            .with_labels(vec![
                Label::primary(file_id, error.first_open).with_message("first `/*`"),
                Label::primary(file_id, error.last_close).with_message("last `*/`"),
            ])
            .with_notes(vec![format!("Help: {} more `*/` needed", error.depth)]),
        ParseMessage::UnrecognizedEof { range, expected } => Diagnostic::error()
            .with_message("unexpected end of file")
            .with_labels(vec![
                Label::primary(file_id, *range).with_message("unexpected end of file")
            ])
            .with_notes(format_expected(expected).map_or(Vec::new(), |message| vec![message])),
        ParseMessage::UnrecognizedToken {
            range,
            token,
            expected,
        } => Diagnostic::error()
            .with_message(format!("unexpected token {token}"))
            .with_labels(vec![Label::primary(file_id, *range).with_message("unexpected token")])
            .with_notes(format_expected(expected).map_or(Vec::new(), |message| vec![message])),
        ParseMessage::ExtraToken { range, token } => Diagnostic::error()
            .with_message(format!("extra token {token}"))
            .with_labels(vec![Label::primary(file_id, *range).with_message("extra token")]),
    }
}

fn format_expected(expected: &[&'static str]) -> Option<String> {
    expected.split_last().map(|items| match items {
        (last, []) => format!("expected `{last}`"),
        (last, expected) => format!(
            "expected {} or `{last}`",
            expected.iter().map(|token| format!("`{token}`")).format(", "),
        ),
    })
}

pub(super) fn parse_module(_file_id: FileId, source: &str) -> (Module, Vec<ParseMessage>) {
    let mut parser = Parser::new(source);
    let mut items = Vec::new();

    while parser.peek().is_some() {
        match parser.item() {
            Ok(item) => items.push(item),
            Err(message) => {
                parser.messages.push(message);
                parser.recover_to_item();
            }
        }
    }

    (Module { items }, parser.messages)
}

pub(super) fn parse_term(_file_id: FileId, source: &str) -> (Option<Term>, Vec<ParseMessage>) {
    let mut parser = Parser::new(source);
    let term = match parser.term() {
        Ok(term) => match parser.advance() {
            None => Some(term),
            Some((start, token, end)) => {
                parser.messages.push(ParseMessage::ExtraToken {
                    range: ByteRange::new(start, end),
                    token: token.description(),
                });
                None
            }
        },
        Err(message) => {
            parser.messages.push(message);
            None
        }
    };
    (term, parser.messages)
}

type ParseResult<T> = Result<T, ParseMessage>;

struct Parser<'source> {
    tokens: Vec<lexer::Spanned<Token<'source>, BytePos>>,
    pos: usize,
    eof: BytePos,
    messages: Vec<ParseMessage>,
}

impl<'source> Parser<'source> {
    fn new(source: &'source str) -> Parser<'source> {
        let mut tokens = Vec::new();
        let mut messages = Vec::new();
        for token in lexer::tokens(source) {
            match token {
                Ok(token) => tokens.push(token),
                Err(error) => messages.push(ParseMessage::Lexer(error)),
            }
        }

        Parser {
            tokens,
            pos: 0,
            eof: source.len() as BytePos,
            messages,
        }
    }

    fn peek(&self) -> Option<&Token<'source>> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token<'source>> {
        self.tokens.get(self.pos + n).map(|(_, token, _)| token)
    }

    fn advance(&mut self) -> Option<lexer::Spanned<Token<'source>, BytePos>> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn is_at(&self, token: &Token<'_>) -> bool {
        self.peek().map_or(false, |next| same_kind(next, token))
    }

    fn eat(&mut self, token: &Token<'_>) -> Option<ByteRange> {
        match self.is_at(token) {
            true => self.advance().map(|(start, _, end)| ByteRange::new(start, end)),
            false => None,
        }
    }

    fn unexpected(&self, expected: Vec<&'static str>) -> ParseMessage {
        match self.tokens.get(self.pos) {
            Some((start, token, end)) => ParseMessage::UnrecognizedToken {
                range: ByteRange::new(*start, *end),
                token: token.description(),
                expected,
            },
            None => ParseMessage::UnrecognizedEof {
                range: ByteRange::new(self.eof, self.eof),
                expected,
            },
        }
    }

    fn expect(&mut self, token: Token<'static>) -> ParseResult<ByteRange> {
        self.eat(&token)
            .ok_or_else(|| self.unexpected(vec![token.description()]))
    }

    fn name(&mut self) -> ParseResult<(ByteRange, Symbol)> {
        match self.tokens.get(self.pos) {
            Some((start, Token::Name(name), end)) => {
                let name = (ByteRange::new(*start, *end), Symbol::intern(name));
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(vec!["name"])),
        }
    }

    /// Skip tokens until the start of the next item.
    fn recover_to_item(&mut self) {
        // Always make progress
        self.advance();
        while let Some(token) = self.peek() {
            if starts_item(token) {
                break;
            }
            self.advance();
        }
    }

    fn item(&mut self) -> ParseResult<Item> {
        let start = self.tokens[self.pos].0;
        match self.peek() {
            Some(Token::KeywordInductive) => {
                self.advance();
                let name = self.name()?;
                let params = self.params()?;
                self.expect(Token::Colon)?;
                let r#type = self.term()?;
                self.expect(Token::OpenBrace)?;
                let mut ctors = Vec::new();
                while !self.is_at(&Token::CloseBrace) {
                    let ctor_name = self.name()?;
                    self.expect(Token::Colon)?;
                    ctors.push((ctor_name, self.term()?));
                    if self.eat(&Token::Comma).is_none() {
                        break;
                    }
                }
                let end = self.expect(Token::CloseBrace)?;
                Ok(Item::Inductive(Inductive {
                    range: ByteRange::new(start, end.end()),
                    name,
                    params,
                    r#type,
                    ctors,
                }))
            }
            Some(Token::KeywordTransparent | Token::KeywordDef) => {
                let transparent = self.eat(&Token::KeywordTransparent).is_some();
                self.expect(Token::KeywordDef)?;
                let mut definition = self.definition(start)?;
                definition.transparent = transparent;
                Ok(Item::Definition(definition))
            }
            Some(Token::KeywordAxiom) => {
                self.advance();
                let name = self.name()?;
                self.expect(Token::Colon)?;
                let r#type = self.term()?;
                let end = self.expect(Token::Semicolon)?;
                Ok(Item::Axiom {
                    range: ByteRange::new(start, end.end()),
                    name,
                    r#type,
                })
            }
            Some(Token::KeywordRewrite) => {
                self.advance();
                let name = self.name()?;
                self.expect(Token::Colon)?;
                let r#type = self.term()?;
                let end = self.expect(Token::Semicolon)?;
                Ok(Item::Rewrite {
                    range: ByteRange::new(start, end.end()),
                    name,
                    r#type,
                })
            }
            Some(Token::KeywordNotation) => {
                self.advance();
                match self.peek() {
                    Some(Token::Name("list")) => self.advance(),
                    _ => return Err(self.unexpected(vec!["list"])),
                };
                let nil = self.name()?;
                let cons = self.name()?;
                let end = self.expect(Token::Semicolon)?;
                Ok(Item::ListNotation {
                    range: ByteRange::new(start, end.end()),
                    nil,
                    cons,
                })
            }
            _ => Err(self.unexpected(vec![
                "inductive",
                "def",
                "transparent",
                "axiom",
                "rewrite",
                "notation",
            ])),
        }
    }

    /// The part of a definition after `def`, shared with `where` auxiliaries.
    fn definition(&mut self, start: BytePos) -> ParseResult<Definition> {
        let name = self.name()?;
        let params = self.params()?;
        self.expect(Token::Colon)?;
        let r#type = self.term()?;
        self.expect(Token::OpenBrace)?;
        let clauses = self.clauses()?;
        let end = self.expect(Token::CloseBrace)?;
        Ok(Definition {
            range: ByteRange::new(start, end.end()),
            name,
            transparent: false,
            params,
            r#type,
            clauses,
        })
    }

    fn params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        while self.is_at(&Token::OpenParen) {
            params.push(self.param()?);
        }
        Ok(params)
    }

    fn param(&mut self) -> ParseResult<Param> {
        self.expect(Token::OpenParen)?;
        let mut names = vec![self.name()?];
        while let Some(Token::Name(_)) = self.peek() {
            names.push(self.name()?);
        }
        self.expect(Token::Colon)?;
        let r#type = self.term()?;
        self.expect(Token::CloseParen)?;
        Ok(Param { names, r#type })
    }

    fn clauses(&mut self) -> ParseResult<Vec<Clause>> {
        let mut clauses = Vec::new();
        while self.is_at(&Token::Pipe) {
            clauses.push(self.clause()?);
        }
        Ok(clauses)
    }

    fn clause(&mut self) -> ParseResult<Clause> {
        let start = self.expect(Token::Pipe)?;
        // Definitions without parameters have clauses without patterns
        let mut patterns = Vec::new();
        if !(self.is_at(&Token::EqualsGreater) || self.is_at(&Token::KeywordWith)) {
            patterns.push(self.pattern()?);
            while self.eat(&Token::Comma).is_some() {
                patterns.push(self.pattern()?);
            }
        }
        let patterns_range = (patterns.iter())
            .fold(start, |range, pattern| range.merge(pattern.range()));

        let (rhs, mut range) = if self.eat(&Token::EqualsGreater).is_some() {
            let body = self.term()?;
            let range = patterns_range.merge(body.range());
            (Rhs::Term(body), range)
        } else if self.eat(&Token::KeywordWith).is_some() {
            let scrut = self.term()?;
            let equation = match self.eat(&Token::KeywordIn) {
                Some(_) => Some(self.name()?),
                None => None,
            };
            self.expect(Token::OpenBrace)?;
            let clauses = self.clauses()?;
            let end = self.expect(Token::CloseBrace)?;
            let rhs = Rhs::With {
                scrut,
                equation,
                clauses,
            };
            (rhs, patterns_range.merge(end))
        } else {
            (Rhs::Absurd(patterns_range), patterns_range)
        };

        let mut where_block = Vec::new();
        if self.eat(&Token::KeywordWhere).is_some() {
            while let Some(Token::Name(_)) = self.peek() {
                let start = self.tokens[self.pos].0;
                let definition = self.definition(start)?;
                range = range.merge(definition.range);
                where_block.push(definition);
            }
            if where_block.is_empty() {
                return Err(self.unexpected(vec!["name"]));
            }
        }

        Ok(Clause {
            range,
            patterns,
            rhs,
            where_block,
        })
    }

    fn pattern(&mut self) -> ParseResult<Pattern> {
        match self.peek() {
            Some(Token::Name(_)) => {
                let (name_range, name) = self.name()?;
                let mut args = Vec::new();
                while self.peek().map_or(false, starts_atomic_pattern) {
                    args.push(self.atomic_pattern()?);
                }
                match args.last() {
                    None => Ok(Pattern::Name(name_range, name)),
                    Some(last) => {
                        let range = name_range.merge(last.range());
                        Ok(Pattern::Ctor(range, (name_range, name), args))
                    }
                }
            }
            _ => self.atomic_pattern(),
        }
    }

    fn atomic_pattern(&mut self) -> ParseResult<Pattern> {
        match self.peek() {
            Some(Token::Name(_)) => {
                let (range, name) = self.name()?;
                Ok(Pattern::Name(range, name))
            }
            Some(Token::Underscore) => {
                let range = self.expect(Token::Underscore)?;
                Ok(Pattern::Placeholder(range))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let pattern = self.pattern()?;
                self.expect(Token::CloseParen)?;
                Ok(pattern)
            }
            Some(Token::FullStop) => {
                let start = self.expect(Token::FullStop)?;
                let term = match self.peek() {
                    Some(Token::OpenParen) => {
                        self.advance();
                        let term = self.term()?;
                        self.expect(Token::CloseParen)?;
                        term
                    }
                    _ => {
                        let (range, name) = self.name()?;
                        Term::Name(range, name)
                    }
                };
                Ok(Pattern::Inaccessible(start.merge(term.range()), term))
            }
            Some(Token::OpenBracket) => {
                let start = self.expect(Token::OpenBracket)?;
                let mut elems = Vec::new();
                while !self.is_at(&Token::CloseBracket) {
                    elems.push(self.pattern()?);
                    if self.eat(&Token::Comma).is_none() {
                        break;
                    }
                }
                let end = self.expect(Token::CloseBracket)?;
                Ok(Pattern::List(start.merge(end), elems))
            }
            _ => Err(self.unexpected(vec!["name", "_", "(", ".", "["])),
        }
    }

    fn term(&mut self) -> ParseResult<Term> {
        if let Some(start) = self.eat(&Token::KeywordFun) {
            let mut params = vec![self.param()?];
            params.extend(self.params()?);
            self.expect(Token::EqualsGreater)?;
            let body = self.term()?;
            let range = start.merge(body.range());
            return Ok(Term::FunLiteral(range, params, Box::new(body)));
        }

        if let Some((start, params)) = self.try_binders() {
            let body = self.term()?;
            let range = start.merge(body.range());
            return Ok(Term::FunType(range, params, Box::new(body)));
        }

        let head = self.app()?;
        match self.eat(&Token::HyphenGreater) {
            Some(_) => {
                let body = self.term()?;
                let range = head.range().merge(body.range());
                Ok(Term::Arrow(range, Box::new(head), Box::new(body)))
            }
            None => Ok(head),
        }
    }

    /// Parse a sequence of parameter groups followed by `->`, backtracking if
    /// the tokens turn out to be something else.
    fn try_binders(&mut self) -> Option<(ByteRange, Vec<Param>)> {
        if !(self.is_at(&Token::OpenParen) && matches!(self.peek_nth(1), Some(Token::Name(_)))) {
            return None;
        }

        let saved = self.pos;
        let start = ByteRange::new(self.tokens[self.pos].0, self.tokens[self.pos].2);
        match self.params() {
            Ok(params) if self.eat(&Token::HyphenGreater).is_some() => Some((start, params)),
            _ => {
                self.pos = saved;
                None
            }
        }
    }

    fn app(&mut self) -> ParseResult<Term> {
        let mut head = self.atom()?;
        while self.peek().map_or(false, starts_atom) {
            let arg = self.atom()?;
            let range = head.range().merge(arg.range());
            head = Term::FunElim(range, Box::new(head), Box::new(arg));
        }
        Ok(head)
    }

    fn atom(&mut self) -> ParseResult<Term> {
        match self.peek() {
            Some(Token::Name(_)) => {
                let (range, name) = self.name()?;
                Ok(Term::Name(range, name))
            }
            Some(Token::KeywordType) => {
                let range = self.expect(Token::KeywordType)?;
                Ok(Term::Universe(range))
            }
            Some(Token::OpenParen) => {
                let start = self.expect(Token::OpenParen)?;
                let term = self.term()?;
                match self.eat(&Token::Colon) {
                    Some(_) => {
                        let r#type = self.term()?;
                        let end = self.expect(Token::CloseParen)?;
                        let range = start.merge(end);
                        Ok(Term::Ann(range, Box::new(term), Box::new(r#type)))
                    }
                    None => {
                        self.expect(Token::CloseParen)?;
                        Ok(term)
                    }
                }
            }
            _ => Err(self.unexpected(vec!["name", "Type", "("])),
        }
    }
}

fn same_kind(lhs: &Token<'_>, rhs: &Token<'_>) -> bool {
    std::mem::discriminant(lhs) == std::mem::discriminant(rhs)
}

fn starts_item(token: &Token<'_>) -> bool {
    matches!(
        token,
        Token::KeywordInductive
            | Token::KeywordDef
            | Token::KeywordTransparent
            | Token::KeywordAxiom
            | Token::KeywordRewrite
            | Token::KeywordNotation
    )
}

fn starts_atom(token: &Token<'_>) -> bool {
    matches!(token, Token::Name(_) | Token::KeywordType | Token::OpenParen)
}

fn starts_atomic_pattern(token: &Token<'_>) -> bool {
    matches!(
        token,
        Token::Name(_)
            | Token::Underscore
            | Token::OpenParen
            | Token::FullStop
            | Token::OpenBracket
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_id() -> FileId {
        FileId::try_from(1).unwrap()
    }

    fn term(source: &str) -> Term {
        let (term, messages) = parse_term(file_id(), source);
        assert!(messages.is_empty(), "{messages:?}");
        term.unwrap()
    }

    #[test]
    fn dependent_function_types() {
        match term("(A : Type) (x y : A) -> Eq A x y") {
            Term::FunType(_, params, body) => {
                assert_eq!(params.len(), 2);
                assert_eq!(params[1].names.len(), 2);
                assert!(matches!(*body, Term::FunElim(..)));
            }
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn annotations_are_not_binders() {
        assert!(matches!(term("(x : A)"), Term::Ann(..)));
        assert!(matches!(term("(f x) -> B"), Term::Arrow(..)));
    }

    #[test]
    fn arrows_are_right_associative() {
        match term("A -> B -> C") {
            Term::Arrow(_, _, body) => assert!(matches!(*body, Term::Arrow(..))),
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn inaccessible_and_list_patterns() {
        let source = "def f (n : Nat) : Nat { | .n => n | [a, b] => a }";
        let (module, messages) = parse_module(file_id(), source);
        assert!(messages.is_empty(), "{messages:?}");
        let Item::Definition(definition) = &module.items[0] else {
            panic!("expected a definition")
        };
        assert!(matches!(definition.clauses[0].patterns[0], Pattern::Inaccessible(..)));
        assert!(matches!(&definition.clauses[1].patterns[0], Pattern::List(_, elems) if elems.len() == 2));
    }

    #[test]
    fn absurd_clauses() {
        let source = "def f (x : Empty) : Nat { | x }";
        let (module, messages) = parse_module(file_id(), source);
        assert!(messages.is_empty(), "{messages:?}");
        let Item::Definition(definition) = &module.items[0] else {
            panic!("expected a definition")
        };
        assert!(matches!(definition.clauses[0].rhs, Rhs::Absurd(_)));
    }

    #[test]
    fn trailing_tokens() {
        let (term, messages) = parse_term(file_id(), "f x )");
        assert!(term.is_none());
        assert!(matches!(messages[..], [ParseMessage::ExtraToken { .. }]));
    }
}
