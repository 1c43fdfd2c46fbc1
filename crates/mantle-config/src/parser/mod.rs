//! `.mtl` file parser built on `nom`.
//!
//! Transforms raw configuration text into an AST through lexing and
//! recursive-descent parsing. Semantic checks live in [`validator`].

pub mod ast;
pub mod lexer;
pub mod validator;

use mantle_common::diagnostics::{Diagnostic, SourcePos, SourceRange};
use mantle_common::types::{ResourceAddr, is_valid_identifier};
use mantle_common::value::Value;

use self::ast::{Attribute, Block, Body, Expr, ExprKind, File, Reference, TemplatePart};
use self::lexer::{Spanned, TemplatePiece, Token};

/// A syntax error with its location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{range}: {summary}; {detail}")]
pub struct ParseError {
    /// Short description.
    pub summary: String,
    /// Longer explanation.
    pub detail: String,
    /// Where the error occurred.
    pub range: SourceRange,
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Self::error(err.summary, err.detail).with_subject(err.range)
    }
}

/// Converts byte offsets of one source text into line/column positions.
#[derive(Debug)]
pub struct SourceMap<'a> {
    filename: &'a str,
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    /// Indexes the line starts of `text`.
    pub fn new(filename: &'a str, text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            filename,
            text,
            line_starts,
        }
    }

    /// Position of a byte offset.
    pub fn pos(&self, byte: usize) -> SourcePos {
        let byte = byte.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= byte);
        let line_start = self.line_starts[line.saturating_sub(1)];
        let column = self
            .text
            .get(line_start..byte)
            .map_or(byte - line_start, |s| s.chars().count())
            + 1;
        SourcePos { line, column, byte }
    }

    /// Range between two byte offsets.
    pub fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange {
            filename: self.filename.to_string(),
            start: self.pos(start),
            end: self.pos(end),
        }
    }

    /// Builds a parse error covering `start..end`.
    pub fn error(
        &self,
        summary: impl Into<String>,
        detail: impl Into<String>,
        start: usize,
        end: usize,
    ) -> ParseError {
        ParseError {
            summary: summary.into(),
            detail: detail.into(),
            range: self.range(start, end),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    map: &'a SourceMap<'a>,
    /// Offset reported for errors at end of input.
    eof: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(tokens: &'a [Spanned], map: &'a SourceMap<'a>, eof: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            map,
            eof,
        }
    }

    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&'a Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// End offset of the most recently consumed token.
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(self.eof, |s| s.end)
    }

    fn unexpected(&self, got: Option<&Spanned>, expected: &str) -> ParseError {
        match got {
            Some(s) => self.map.error(
                "Invalid syntax",
                format!("Expected {expected}, but found {}.", s.token.describe()),
                s.start,
                s.end,
            ),
            None => self.map.error(
                "Unexpected end of input",
                format!("Expected {expected}."),
                self.eof,
                self.eof,
            ),
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<(String, &'a Spanned)> {
        match self.advance() {
            Some(s @ Spanned {
                token: Token::Identifier(name),
                ..
            }) => Ok((name.clone(), s)),
            other => Err(self.unexpected(other, what)),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<&'a Spanned> {
        match self.advance() {
            Some(s) if &s.token == expected => Ok(s),
            other => Err(self.unexpected(other, &expected.describe())),
        }
    }
}

fn skip_optional_comma(cursor: &mut TokenCursor<'_>) {
    if cursor.peek_token() == Some(&Token::Comma) {
        let _ = cursor.advance();
    }
}

/// Parses a configuration file from its source text.
///
/// # Errors
///
/// Returns an error describing the first syntax problem found.
pub fn parse_source(filename: &str, input: &str) -> Result<File> {
    tracing::debug!(filename, "parsing configuration source");
    let map = SourceMap::new(filename, input);
    let tokens = lexer::tokenize(input, 0, &map)?;
    let mut cursor = TokenCursor::new(&tokens, &map, input.len());
    let body = parse_body(&mut cursor, false)?;
    Ok(File {
        filename: filename.to_string(),
        body,
    })
}

/// Parses a standalone expression, as typed into the console or given as a
/// `--var` value.
///
/// # Errors
///
/// Returns an error if the text is not exactly one expression.
pub fn parse_expression(filename: &str, input: &str) -> Result<Expr> {
    let map = SourceMap::new(filename, input);
    let tokens = lexer::tokenize(input, 0, &map)?;
    let mut cursor = TokenCursor::new(&tokens, &map, input.len());
    let expr = parse_expr(&mut cursor)?;
    if let Some(extra) = cursor.peek() {
        return Err(map.error(
            "Extra characters after expression",
            "An expression was successfully parsed, but extra characters were found after it.",
            extra.start,
            extra.end,
        ));
    }
    Ok(expr)
}

fn parse_body(cursor: &mut TokenCursor<'_>, nested: bool) -> Result<Body> {
    let mut body = Body::default();

    loop {
        match cursor.peek_token() {
            Some(Token::BraceClose) if nested => {
                let _ = cursor.advance();
                return Ok(body);
            }
            None if nested => {
                return Err(cursor.map.error(
                    "Unclosed configuration block",
                    "There is no closing brace for this block before the end of the file.",
                    cursor.eof,
                    cursor.eof,
                ));
            }
            None => return Ok(body),
            Some(_) => {}
        }

        let (name, name_tok) = cursor.expect_identifier("an attribute or block definition")?;
        if cursor.peek_token() == Some(&Token::Equals) {
            let _ = cursor.advance();
            let name_range = cursor.map.range(name_tok.start, name_tok.end);
            if body.attribute(&name).is_some() {
                return Err(cursor.map.error(
                    "Attribute redefined",
                    format!("The argument {name:?} was already set. Each argument may be set only once."),
                    name_tok.start,
                    name_tok.end,
                ));
            }
            let expr = parse_expr(cursor)?;
            body.attributes.push(Attribute {
                name,
                expr,
                name_range,
            });
        } else {
            let block = parse_block(cursor, name, name_tok)?;
            body.blocks.push(block);
        }
    }
}

fn parse_block(cursor: &mut TokenCursor<'_>, kind: String, kind_tok: &Spanned) -> Result<Block> {
    let mut labels = Vec::new();
    loop {
        match cursor.advance() {
            Some(Spanned {
                token: Token::BraceOpen,
                ..
            }) => break,
            Some(s @ Spanned {
                token: Token::Template(_),
                ..
            }) => match s.token.as_plain_string() {
                Some(label) => labels.push(label),
                None => {
                    return Err(cursor.map.error(
                        "Invalid block label",
                        "Block labels must be plain strings without interpolation.",
                        s.start,
                        s.end,
                    ));
                }
            },
            Some(Spanned {
                token: Token::Identifier(label),
                ..
            }) => labels.push(label.clone()),
            other => return Err(cursor.unexpected(other, "a block label or \"{\"")),
        }
    }
    let range = cursor.map.range(kind_tok.start, cursor.prev_end());
    let body = parse_body(cursor, true)?;
    Ok(Block {
        kind,
        labels,
        body,
        range,
    })
}

fn parse_expr(cursor: &mut TokenCursor<'_>) -> Result<Expr> {
    let Some(first) = cursor.advance() else {
        return Err(cursor.unexpected(None, "an expression"));
    };
    let start = first.start;
    let literal = |value: Value| ExprKind::Literal(value);

    let kind = match &first.token {
        Token::Number(n) => literal(Value::Number(*n)),
        Token::True => literal(Value::Bool(true)),
        Token::False => literal(Value::Bool(false)),
        Token::Null => literal(Value::Null),
        Token::Template(pieces) => ExprKind::Template(parse_template(cursor.map, first, pieces)?),
        Token::BracketOpen => {
            let mut items = Vec::new();
            while cursor.peek_token() != Some(&Token::BracketClose) {
                items.push(parse_expr(cursor)?);
                skip_optional_comma(cursor);
            }
            let _ = cursor.expect_token(&Token::BracketClose)?;
            ExprKind::List(items)
        }
        Token::BraceOpen => {
            let mut entries: Vec<(String, Expr)> = Vec::new();
            while cursor.peek_token() != Some(&Token::BraceClose) {
                let key = match cursor.advance() {
                    Some(Spanned {
                        token: Token::Identifier(k),
                        ..
                    }) => k.clone(),
                    Some(s @ Spanned {
                        token: Token::Template(_),
                        ..
                    }) if s.token.as_plain_string().is_some() => {
                        s.token.as_plain_string().unwrap_or_default()
                    }
                    other => return Err(cursor.unexpected(other, "an object key")),
                };
                let _ = cursor.expect_token(&Token::Equals)?;
                let value = parse_expr(cursor)?;
                entries.push((key, value));
                skip_optional_comma(cursor);
            }
            let _ = cursor.expect_token(&Token::BraceClose)?;
            ExprKind::Object(entries)
        }
        Token::Identifier(root) => ExprKind::Reference(parse_reference(cursor, root, first)?),
        _ => return Err(cursor.unexpected(Some(first), "an expression")),
    };

    Ok(Expr {
        kind,
        range: cursor.map.range(start, cursor.prev_end()),
    })
}

fn parse_template(
    map: &SourceMap<'_>,
    token: &Spanned,
    pieces: &[TemplatePiece],
) -> Result<Vec<TemplatePart>> {
    let mut parts = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match piece {
            TemplatePiece::Literal(s) => {
                if !s.is_empty() {
                    parts.push(TemplatePart::Literal(s.clone()));
                }
            }
            TemplatePiece::Interpolation { source, offset } => {
                let base = token.start + offset;
                let tokens = lexer::tokenize(source, base, map)?;
                if tokens.is_empty() {
                    return Err(map.error(
                        "Invalid expression",
                        "An interpolation sequence must contain an expression.",
                        base,
                        base + source.len(),
                    ));
                }
                let mut sub = TokenCursor::new(&tokens, map, base + source.len());
                let expr = parse_expr(&mut sub)?;
                if let Some(extra) = sub.peek() {
                    return Err(map.error(
                        "Extra characters after interpolation expression",
                        "Expected a closing brace to end the interpolation expression.",
                        extra.start,
                        extra.end,
                    ));
                }
                parts.push(TemplatePart::Interpolation(expr));
            }
        }
    }
    Ok(parts)
}

fn parse_reference(cursor: &mut TokenCursor<'_>, root: &str, root_tok: &Spanned) -> Result<Reference> {
    let mut segments = vec![root.to_string()];
    while cursor.peek_token() == Some(&Token::Dot) {
        let _ = cursor.advance();
        let (attr, _) = cursor.expect_identifier("an attribute name")?;
        segments.push(attr);
    }

    let invalid = |detail: &str| {
        cursor.map.error(
            "Invalid reference",
            detail.to_string(),
            root_tok.start,
            cursor.prev_end(),
        )
    };

    match segments.as_slice() {
        [var, name] if var == "var" => Ok(Reference::Variable(name.clone())),
        [var, ..] if var == "var" => Err(invalid(
            "A variable reference must be \"var.\" followed by a variable name.",
        )),
        [data, type_name, name, path @ ..] if data == "data" => Ok(Reference::Resource {
            addr: ResourceAddr::data(type_name.clone(), name.clone()),
            path: path.to_vec(),
        }),
        [data, ..] if data == "data" => Err(invalid(
            "A data source reference must be \"data.\" followed by a type and a name.",
        )),
        [type_name, name, path @ ..] if is_valid_identifier(type_name) => Ok(Reference::Resource {
            addr: ResourceAddr::managed(type_name.clone(), name.clone()),
            path: path.to_vec(),
        }),
        _ => Err(invalid(
            "A reference to a resource type must be followed by at least one attribute access, specifying the resource name.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> File {
        parse_source("main.mtl", input).expect("should parse")
    }

    #[test]
    fn parse_empty_input() {
        let file = parse("");
        assert!(file.body.attributes.is_empty());
        assert!(file.body.blocks.is_empty());
    }

    #[test]
    fn parse_resource_block() {
        let file = parse(
            r#"
resource "local_file" "motd" {
  filename = "motd.txt"
  content  = "hello"
}
"#,
        );
        let block = &file.body.blocks[0];
        assert_eq!(block.kind, "resource");
        assert_eq!(block.labels, vec!["local_file", "motd"]);
        assert_eq!(block.range.start.line, 2);
        let filename = block.body.attribute("filename").expect("filename");
        assert_eq!(filename.expr.as_plain_string(), Some("motd.txt"));
    }

    #[test]
    fn parse_interpolated_reference() {
        let file = parse("x = \"id-${null_resource.a.id}\"\n");
        let expr = &file.body.attributes[0].expr;
        let refs = expr.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0.to_string(), "null_resource.a.id");
        let ExprKind::Template(parts) = &expr.kind else {
            panic!("expected template");
        };
        let TemplatePart::Interpolation(inner) = &parts[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(inner.range.start.column, 11);
    }

    #[test]
    fn parse_collections() {
        let file = parse("tags = [\"a\", \"b\"]\nmeta = { owner = \"ops\", \"tier\" = 2 }\n");
        let ExprKind::List(items) = &file.body.attributes[0].expr.kind else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        let ExprKind::Object(entries) = &file.body.attributes[1].expr.kind else {
            panic!("expected object");
        };
        assert_eq!(entries[1].0, "tier");
    }

    #[test]
    fn parse_data_reference() {
        let expr = parse_expression("<console>", "data.local_file.seed.content").expect("parse");
        assert_eq!(
            expr.kind,
            ExprKind::Reference(Reference::Resource {
                addr: ResourceAddr::data("local_file", "seed"),
                path: vec!["content".into()],
            })
        );
    }

    #[test]
    fn parse_error_missing_brace() {
        let err = parse_source("main.mtl", "resource \"a_b\" \"c\" {\n  x = 1\n").expect_err("fail");
        assert_eq!(err.summary, "Unclosed configuration block");
    }

    #[test]
    fn parse_error_redefined_attribute() {
        let err = parse_source("main.mtl", "a = 1\na = 2\n").expect_err("fail");
        assert_eq!(err.summary, "Attribute redefined");
        assert_eq!(err.range.start.line, 2);
    }

    #[test]
    fn parse_error_bare_root() {
        let err = parse_expression("<console>", "foo").expect_err("fail");
        assert_eq!(err.summary, "Invalid reference");
    }

    #[test]
    fn parse_expression_rejects_trailing_tokens() {
        let err = parse_expression("<console>", "1 2").expect_err("fail");
        assert_eq!(err.summary, "Extra characters after expression");
    }

    #[test]
    fn parse_error_converts_to_diagnostic() {
        let err = parse_source("main.mtl", "= 1").expect_err("fail");
        let diag = Diagnostic::from(err);
        assert!(diag.is_error());
        assert_eq!(diag.subject.expect("subject").filename, "main.mtl");
    }

    #[test]
    fn source_map_counts_characters() {
        let map = SourceMap::new("f", "ab\nçd");
        let pos = map.pos(5);
        assert_eq!((pos.line, pos.column), (2, 2));
    }
}
