//! Tokenization of `.mtl` source text using `nom`.
//!
//! Produces a stream of [`Spanned`] tokens from raw input for the parser to
//! consume. Whitespace and comments (`#`, `//`, `/* */`) are discarded
//! between tokens.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::preceded,
};

use super::{ParseError, SourceMap};

/// A token in the Mantle configuration language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier (block type, attribute name, reference root).
    Identifier(String),
    /// A double-quoted string, split into literal and `${...}` pieces.
    Template(Vec<TemplatePiece>),
    /// A numeric literal.
    Number(f64),
    /// Boolean literal `true`.
    True,
    /// Boolean literal `false`.
    False,
    /// The `null` literal.
    Null,
    /// `{` opening brace.
    BraceOpen,
    /// `}` closing brace.
    BraceClose,
    /// `[` opening bracket.
    BracketOpen,
    /// `]` closing bracket.
    BracketClose,
    /// `=` assignment.
    Equals,
    /// `,` separator.
    Comma,
    /// `.` attribute access.
    Dot,
}

/// Part of a string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePiece {
    /// Literal text with escapes already processed.
    Literal(String),
    /// Raw expression source between `${` and `}`.
    Interpolation {
        /// The expression text.
        source: String,
        /// Byte offset of `source` relative to the opening quote.
        offset: usize,
    },
}

impl Token {
    /// Returns the literal string if this is a template without
    /// interpolations.
    pub fn as_plain_string(&self) -> Option<String> {
        match self {
            Self::Template(pieces) => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        TemplatePiece::Literal(s) => out.push_str(s),
                        TemplatePiece::Interpolation { .. } => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Short human description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(s) => format!("identifier {s:?}"),
            Self::Template(_) => "string".into(),
            Self::Number(n) => format!("number {n}"),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::BraceOpen => "\"{\"".into(),
            Self::BraceClose => "\"}\"".into(),
            Self::BracketOpen => "\"[\"".into(),
            Self::BracketClose => "\"]\"".into(),
            Self::Equals => "\"=\"".into(),
            Self::Comma => "\",\"".into(),
            Self::Dot => "\".\"".into(),
        }
    }
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

/// Skippable items: whitespace or comments.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    let line_comment = value((), preceded(alt((tag("//"), tag("#"))), not_line_ending));
    let block_comment = value((), (tag("/*"), take_until("*/"), tag("*/")));
    let ws = value((), multispace1);
    let (input, _) = many0(alt((ws, line_comment, block_comment))).parse(input)?;
    Ok((input, ()))
}

fn lex_failure(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}

/// Parses a double-quoted string with escapes and `${...}` interpolations.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (body, _) = char('"')(input)?;
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = body.char_indices().peekable();

    loop {
        match chars.next() {
            Some((idx, '"')) => {
                if !literal.is_empty() || pieces.is_empty() {
                    pieces.push(TemplatePiece::Literal(literal));
                }
                return Ok((&body[idx + 1..], Token::Template(pieces)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => literal.push('\n'),
                Some((_, 't')) => literal.push('\t'),
                Some((_, 'r')) => literal.push('\r'),
                Some((_, '\\')) => literal.push('\\'),
                Some((_, '"')) => literal.push('"'),
                Some((_, c)) => {
                    literal.push('\\');
                    literal.push(c);
                }
                None => return Err(lex_failure(input)),
            },
            Some((_, '$')) if chars.peek().map(|&(_, c)| c) == Some('$') => {
                let _ = chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('{') {
                    let _ = chars.next();
                    literal.push_str("${");
                } else {
                    literal.push_str("$$");
                }
            }
            Some((idx, '$')) if chars.peek().map(|&(_, c)| c) == Some('{') => {
                let _ = chars.next();
                let source_start = idx + 2;
                let mut depth = 0usize;
                let mut in_string = false;
                let source_end = loop {
                    match chars.next() {
                        Some((_, '"')) => in_string = !in_string,
                        Some((_, '\\')) if in_string => {
                            let _ = chars.next();
                        }
                        Some((_, '{')) if !in_string => depth += 1,
                        Some((end, '}')) if !in_string => {
                            if depth == 0 {
                                break end;
                            }
                            depth -= 1;
                        }
                        Some(_) => {}
                        None => return Err(lex_failure(input)),
                    }
                };
                if !literal.is_empty() {
                    pieces.push(TemplatePiece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(TemplatePiece::Interpolation {
                    source: body[source_start..source_end].to_string(),
                    offset: source_start + 1,
                });
            }
            Some((_, '\n')) | None => return Err(lex_failure(input)),
            Some((_, c)) => literal.push(c),
        }
    }
}

/// Parses a numeric literal with an optional sign and fraction.
fn number_literal(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize((opt(char('-')), digit1, opt((char('.'), digit1)))).parse(input)?;
    let val: f64 = text.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;
    Ok((rest, Token::Number(val)))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Parses an identifier or keyword.
fn identifier_or_keyword(input: &str) -> IResult<&str, Token> {
    let (input, first) = take_while1(is_ident_start)(input)?;
    let (input, rest) = take_while(is_ident_continue)(input)?;
    let word = format!("{first}{rest}");
    let token = match word.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Identifier(word),
    };
    Ok((input, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::BraceOpen, char('{')),
        value(Token::BraceClose, char('}')),
        value(Token::BracketOpen, char('[')),
        value(Token::BracketClose, char(']')),
        value(Token::Equals, char('=')),
        value(Token::Comma, char(',')),
        value(Token::Dot, char('.')),
    ))
    .parse(input)
}

/// Parses a single token (after trivia has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((string_literal, number_literal, symbol, identifier_or_keyword)).parse(input)
}

/// Tokenizes a source string into spanned tokens.
///
/// Spans are offset by `base` so that tokens of an interpolation can point
/// back into the file they came from.
///
/// # Errors
///
/// Returns an error if the input contains characters that cannot be tokenized
/// or an unterminated string.
pub fn tokenize(input: &str, base: usize, map: &SourceMap<'_>) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining).map_err(|_| {
            let at = base + input.len() - remaining.len();
            map.error(
                "Unterminated comment",
                "A \"/*\" comment must be closed with \"*/\".",
                at,
                at + 2,
            )
        })?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let start = input.len() - remaining.len();
        let (rest, token) = single_token(remaining).map_err(|_| {
            let at = base + start;
            let shown: String = remaining.chars().take(20).collect();
            if remaining.starts_with('"') {
                map.error(
                    "Unterminated template string",
                    "A string literal must end with a closing quote on the same line.",
                    at,
                    at + 1,
                )
            } else {
                map.error(
                    "Invalid character",
                    format!("Unexpected character at {shown:?}."),
                    at,
                    at + 1,
                )
            }
        })?;
        let end = input.len() - rest.len();
        tokens.push(Spanned {
            token,
            start: base + start,
            end: base + end,
        });
        remaining = rest;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let map = SourceMap::new("test.mtl", input);
        tokenize(input, 0, &map)
            .expect("should tokenize")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn plain(s: &str) -> Token {
        Token::Template(vec![TemplatePiece::Literal(s.into())])
    }

    #[test]
    fn tokenize_keywords() {
        assert_eq!(lex("true false null"), vec![Token::True, Token::False, Token::Null]);
    }

    #[test]
    fn tokenize_symbols() {
        assert_eq!(
            lex("{ } [ ] = , ."),
            vec![
                Token::BraceOpen,
                Token::BraceClose,
                Token::BracketOpen,
                Token::BracketClose,
                Token::Equals,
                Token::Comma,
                Token::Dot,
            ]
        );
    }

    #[test]
    fn tokenize_string_with_escapes() {
        assert_eq!(
            lex(r#""line\nnew\ttab\\slash\"quote""#),
            vec![plain("line\nnew\ttab\\slash\"quote")]
        );
    }

    #[test]
    fn tokenize_empty_string() {
        assert_eq!(lex(r#""""#), vec![plain("")]);
    }

    #[test]
    fn tokenize_interpolation() {
        let tokens = lex(r#""web-${var.env}-x""#);
        assert_eq!(
            tokens,
            vec![Token::Template(vec![
                TemplatePiece::Literal("web-".into()),
                TemplatePiece::Interpolation {
                    source: "var.env".into(),
                    offset: 7,
                },
                TemplatePiece::Literal("-x".into()),
            ])]
        );
    }

    #[test]
    fn tokenize_escaped_interpolation() {
        assert_eq!(lex(r#""$${literal}""#), vec![plain("${literal}")]);
    }

    #[test]
    fn tokenize_numbers() {
        assert_eq!(
            lex("8080 -3 2.5"),
            vec![Token::Number(8080.0), Token::Number(-3.0), Token::Number(2.5)]
        );
    }

    #[test]
    fn tokenize_traversal() {
        assert_eq!(
            lex("local_file.motd.id"),
            vec![
                Token::Identifier("local_file".into()),
                Token::Dot,
                Token::Identifier("motd".into()),
                Token::Dot,
                Token::Identifier("id".into()),
            ]
        );
    }

    #[test]
    fn tokenize_skips_comments() {
        let input = "# hash\n// slashes\n/* block\ncomment */ name";
        assert_eq!(lex(input), vec![Token::Identifier("name".into())]);
    }

    #[test]
    fn spans_point_into_source() {
        let input = "a = \"b\"";
        let map = SourceMap::new("t.mtl", input);
        let tokens = tokenize(input, 0, &map).expect("tokenize");
        assert_eq!((tokens[2].start, tokens[2].end), (4, 7));
    }

    #[test]
    fn unterminated_string_is_error() {
        let input = "a = \"oops\nb = 1";
        let map = SourceMap::new("t.mtl", input);
        let err = tokenize(input, 0, &map).expect_err("should fail");
        assert_eq!(err.summary, "Unterminated template string");
        assert_eq!(err.range.start.line, 1);
        assert_eq!(err.range.start.column, 5);
    }
}
