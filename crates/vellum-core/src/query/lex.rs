//! SQL tokenizer
//!
//! Splits query text into tokens with byte offsets so syntax errors
//! can point at the offending spot. Keywords are case-insensitive;
//! string literals take single or double quotes with backslash
//! escapes; `--` comments run to end of line.

use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, digit1, one_of};
use nom::combinator::{opt, recognize};
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

use crate::errors::{Result, VellumError};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    Str(String),
    Int(i64),
    Double(f64),
    /// `@name` query parameter reference.
    Param(String),
    Punct(Punct),
}

impl TokenKind {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Keyword(k) => format!("keyword {}", k.as_str()),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Int(n) => format!("number {n}"),
            TokenKind::Double(n) => format!("number {n}"),
            TokenKind::Param(name) => format!("parameter @{name}"),
            TokenKind::Punct(p) => format!("'{}'", p.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Star,
    Plus,
    Minus,
    Slash,
    Dollar,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Comma => ",",
            Punct::Semi => ";",
            Punct::Colon => ":",
            Punct::Dot => ".",
            Punct::Star => "*",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Slash => "/",
            Punct::Dollar => "$",
            Punct::Eq => "=",
            Punct::Ne => "!=",
            Punct::Lt => "<",
            Punct::Le => "<=",
            Punct::Gt => ">",
            Punct::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Select,
    Count,
    Explain,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    From,
    Where,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    As,
    And,
    Or,
    Not,
    Like,
    In,
    True,
    False,
    Null,
    Rename,
    Collection,
    To,
    Drop,
    Analyze,
    Rebuild,
    Checkpoint,
    Begin,
    Trans,
    Transaction,
    Commit,
    Rollback,
    Pragma,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        let kw = match word.to_ascii_uppercase().as_str() {
            "SELECT" => Keyword::Select,
            "COUNT" => Keyword::Count,
            "EXPLAIN" => Keyword::Explain,
            "INSERT" => Keyword::Insert,
            "INTO" => Keyword::Into,
            "VALUES" => Keyword::Values,
            "UPDATE" => Keyword::Update,
            "SET" => Keyword::Set,
            "DELETE" => Keyword::Delete,
            "FROM" => Keyword::From,
            "WHERE" => Keyword::Where,
            "ORDER" => Keyword::Order,
            "BY" => Keyword::By,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            "LIMIT" => Keyword::Limit,
            "OFFSET" => Keyword::Offset,
            "AS" => Keyword::As,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "NOT" => Keyword::Not,
            "LIKE" => Keyword::Like,
            "IN" => Keyword::In,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            "NULL" => Keyword::Null,
            "RENAME" => Keyword::Rename,
            "COLLECTION" => Keyword::Collection,
            "TO" => Keyword::To,
            "DROP" => Keyword::Drop,
            "ANALYZE" => Keyword::Analyze,
            "REBUILD" => Keyword::Rebuild,
            "CHECKPOINT" => Keyword::Checkpoint,
            "BEGIN" => Keyword::Begin,
            "TRANS" => Keyword::Trans,
            "TRANSACTION" => Keyword::Transaction,
            "COMMIT" => Keyword::Commit,
            "ROLLBACK" => Keyword::Rollback,
            "PRAGMA" => Keyword::Pragma,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Select => "SELECT",
            Keyword::Count => "COUNT",
            Keyword::Explain => "EXPLAIN",
            Keyword::Insert => "INSERT",
            Keyword::Into => "INTO",
            Keyword::Values => "VALUES",
            Keyword::Update => "UPDATE",
            Keyword::Set => "SET",
            Keyword::Delete => "DELETE",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::Order => "ORDER",
            Keyword::By => "BY",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Limit => "LIMIT",
            Keyword::Offset => "OFFSET",
            Keyword::As => "AS",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::Like => "LIKE",
            Keyword::In => "IN",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
            Keyword::Null => "NULL",
            Keyword::Rename => "RENAME",
            Keyword::Collection => "COLLECTION",
            Keyword::To => "TO",
            Keyword::Drop => "DROP",
            Keyword::Analyze => "ANALYZE",
            Keyword::Rebuild => "REBUILD",
            Keyword::Checkpoint => "CHECKPOINT",
            Keyword::Begin => "BEGIN",
            Keyword::Trans => "TRANS",
            Keyword::Transaction => "TRANSACTION",
            Keyword::Commit => "COMMIT",
            Keyword::Rollback => "ROLLBACK",
            Keyword::Pragma => "PRAGMA",
        }
    }
}

/// Tokenize a full query string.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = src;
    loop {
        rest = skip_trivia(rest);
        if rest.is_empty() {
            break;
        }
        let offset = src.len() - rest.len();
        let (next, kind) = lex_token(rest, offset)?;
        tokens.push(Token { kind, offset });
        rest = next;
    }
    Ok(tokens)
}

/// Whitespace and `--` line comments.
fn skip_trivia(mut input: &str) -> &str {
    loop {
        let trimmed = input.trim_start();
        match trimmed.strip_prefix("--") {
            Some(after) => {
                input = match after.find('\n') {
                    Some(i) => &after[i + 1..],
                    None => "",
                };
            }
            None => return trimmed,
        }
    }
}

fn lex_token(input: &str, offset: usize) -> Result<(&str, TokenKind)> {
    let mut chars = input.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(VellumError::syntax("unexpected end of input", offset)),
    };

    if first == '\'' || first == '"' {
        let (rest, value) = lex_string(input, first, offset)?;
        return Ok((rest, TokenKind::Str(value)));
    }

    if first.is_ascii_digit() {
        let (rest, text) = lex_number(input)
            .map_err(|_| VellumError::syntax("malformed number", offset))?;
        let kind = if text.contains(['.', 'e', 'E']) {
            let n: f64 = text
                .parse()
                .map_err(|_| VellumError::syntax(format!("malformed number '{text}'"), offset))?;
            TokenKind::Double(n)
        } else {
            let n: i64 = text.parse().map_err(|_| {
                VellumError::syntax(format!("integer '{text}' is out of range"), offset)
            })?;
            TokenKind::Int(n)
        };
        return Ok((rest, kind));
    }

    if first.is_ascii_alphabetic() || first == '_' {
        let (rest, word) = lex_word(input)
            .map_err(|_| VellumError::syntax("malformed identifier", offset))?;
        let kind = match Keyword::from_word(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(word.to_string()),
        };
        return Ok((rest, kind));
    }

    if first == '@' {
        let (rest, word) = lex_word(&input[1..])
            .map_err(|_| VellumError::syntax("expected a parameter name after '@'", offset))?;
        return Ok((rest, TokenKind::Param(word.to_string())));
    }

    if let Some((rest, punct)) = lex_punct(input) {
        return Ok((rest, TokenKind::Punct(punct)));
    }

    Err(VellumError::syntax(
        format!("unexpected character {first:?}"),
        offset,
    ))
}

fn lex_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn lex_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        digit1,
        opt(preceded(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn lex_string(input: &str, quote: char, offset: usize) -> Result<(&str, String)> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '\'')) => out.push('\''),
                Some((_, '"')) => out.push('"'),
                Some((j, other)) => {
                    return Err(VellumError::syntax(
                        format!("unknown escape '\\{other}'"),
                        offset + j,
                    ))
                }
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(VellumError::syntax("unterminated string literal", offset))
}

fn lex_punct(input: &str) -> Option<(&str, Punct)> {
    const TABLE: [(&str, Punct); 22] = [
        ("<=", Punct::Le),
        (">=", Punct::Ge),
        ("<>", Punct::Ne),
        ("!=", Punct::Ne),
        ("(", Punct::LParen),
        (")", Punct::RParen),
        ("{", Punct::LBrace),
        ("}", Punct::RBrace),
        ("[", Punct::LBracket),
        ("]", Punct::RBracket),
        (",", Punct::Comma),
        (";", Punct::Semi),
        (":", Punct::Colon),
        (".", Punct::Dot),
        ("*", Punct::Star),
        ("+", Punct::Plus),
        ("-", Punct::Minus),
        ("/", Punct::Slash),
        ("$", Punct::Dollar),
        ("=", Punct::Eq),
        ("<", Punct::Lt),
        (">", Punct::Gt),
    ];
    for (pat, punct) in TABLE {
        if let Some(rest) = input.strip_prefix(pat) {
            return Some((rest, punct));
        }
    }
    None
}
