//! Multi-field query construction.
//!
//! A [`Query`] holds up to seven optional per-field search strings. [`build`]
//! parses each present one and combines them into a [`CompiledQuery`] in
//! which every clause is mandatory. An all-empty query compiles to match-all.
//!
//! # Field expressions
//!
//! Text fields (`commentText`, `userName`, `videoTitle`, `channelTitle`):
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `rust async` | either term (adjacent terms are OR-ed) |
//! | `"exact phrase"` | phrase |
//! | `tok*` | prefix |
//! | `a AND b`, `a OR b` | boolean; `AND` binds tighter than `OR` |
//! | `a NOT b` | `a` without `b` |
//! | `( ... )` | grouping |
//!
//! Identity fields (`userId`, `videoId`, `channelId`) take a
//! whitespace-separated list of exact ids, optionally quoted; any listed id
//! matches.

use serde::Serialize;

use crate::error::ParseFailure;

/// A searchable document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    CommentText,
    UserName,
    UserId,
    VideoTitle,
    VideoId,
    ChannelTitle,
    ChannelId,
}

/// How a field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tokenized full-text.
    Text,
    /// Exact-match identifier.
    Exact,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::CommentText,
        Field::UserName,
        Field::UserId,
        Field::VideoTitle,
        Field::VideoId,
        Field::ChannelTitle,
        Field::ChannelId,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::CommentText => "commentText",
            Field::UserName => "userName",
            Field::UserId => "userId",
            Field::VideoTitle => "videoTitle",
            Field::VideoId => "videoId",
            Field::ChannelTitle => "channelTitle",
            Field::ChannelId => "channelId",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::CommentText | Field::UserName | Field::VideoTitle | Field::ChannelTitle => {
                FieldKind::Text
            }
            Field::UserId | Field::VideoId | Field::ChannelId => FieldKind::Exact,
        }
    }

    /// Column name in the store (FTS column for text fields).
    pub fn column(&self) -> &'static str {
        match self {
            Field::CommentText => "comment_text",
            Field::UserName => "user_name",
            Field::UserId => "user_id",
            Field::VideoTitle => "video_title",
            Field::VideoId => "video_id",
            Field::ChannelTitle => "channel_title",
            Field::ChannelId => "channel_id",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-field search strings; `None` or blank means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub comment_text: Option<String>,
    pub user_name: Option<String>,
    pub user_id: Option<String>,
    pub video_title: Option<String>,
    pub video_id: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
}

impl Query {
    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::CommentText => &self.comment_text,
            Field::UserName => &self.user_name,
            Field::UserId => &self.user_id,
            Field::VideoTitle => &self.video_title,
            Field::VideoId => &self.video_id,
            Field::ChannelTitle => &self.channel_title,
            Field::ChannelId => &self.channel_id,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Present fields with their search strings, in [`Field::ALL`] order.
    pub fn present(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|v| (f, v)))
    }
}

/// Parsed text-field expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(String),
    Prefix(String),
    Phrase(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Left operand without right operand.
    Not(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Render as an FTS5 query expression. Every term is emitted as a quoted
    /// string so user punctuation never reaches the FTS5 parser.
    pub fn to_fts(&self) -> String {
        match self {
            Expr::Term(t) | Expr::Phrase(t) => fts_string(t),
            Expr::Prefix(t) => format!("{} *", fts_string(t)),
            Expr::And(items) => join_fts(items, " AND "),
            Expr::Or(items) => join_fts(items, " OR "),
            Expr::Not(a, b) => format!("({} NOT {})", a.to_fts(), b.to_fts()),
        }
    }
}

fn fts_string(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn join_fts(items: &[Expr], op: &str) -> String {
    let parts: Vec<String> = items.iter().map(Expr::to_fts).collect();
    format!("({})", parts.join(op))
}

/// One mandatory clause of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Text { field: Field, expr: Expr },
    Exact { field: Field, values: Vec<String> },
}

impl Clause {
    pub fn field(&self) -> Field {
        match self {
            Clause::Text { field, .. } | Clause::Exact { field, .. } => *field,
        }
    }
}

/// AND of mandatory per-field clauses; no clauses means match-all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledQuery {
    clauses: Vec<Clause>,
}

impl CompiledQuery {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn has_clause(&self, field: Field) -> bool {
        self.clauses.iter().any(|c| c.field() == field)
    }

    /// Combined FTS5 MATCH expression over all text clauses, if any.
    pub fn fts_expression(&self) -> Option<String> {
        let parts: Vec<String> = self
            .clauses
            .iter()
            .filter_map(|c| match c {
                Clause::Text { field, expr } => {
                    Some(format!("({} : {})", field.column(), expr.to_fts()))
                }
                Clause::Exact { .. } => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }

    pub fn exact_clauses(&self) -> impl Iterator<Item = (Field, &[String])> + '_ {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Exact { field, values } => Some((*field, values.as_slice())),
            Clause::Text { .. } => None,
        })
    }
}

/// Compile `query`; the first malformed field fails the whole build.
pub fn build(query: &Query) -> Result<CompiledQuery, ParseFailure> {
    let mut clauses = Vec::new();
    for (field, input) in query.present() {
        let fail = |reason: String| ParseFailure {
            field,
            input: input.to_string(),
            reason,
        };
        let tokens = tokenize(input).map_err(fail)?;
        let clause = match field.kind() {
            FieldKind::Text => Clause::Text {
                field,
                expr: Parser::new(tokens).parse().map_err(fail)?,
            },
            FieldKind::Exact => Clause::Exact {
                field,
                values: exact_values(tokens).map_err(fail)?,
            },
        };
        clauses.push(clause);
    }
    Ok(CompiledQuery { clauses })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Quoted(String),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err("unterminated quoted phrase".to_string());
                }
                tokens.push(Token::Quoted(phrase));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn is_operator(word: &str) -> bool {
    matches!(word, "AND" | "OR" | "NOT")
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_operator(&self, op: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == op)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> Result<Expr, String> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(Token::Close) => Err("unbalanced parentheses: unexpected ')'".to_string()),
            Some(other) => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut items = vec![self.parse_and()?];
        loop {
            match self.peek() {
                None | Some(Token::Close) => break,
                Some(Token::Word(w)) if w == "OR" => {
                    self.next();
                    items.push(self.parse_and()?);
                }
                _ => items.push(self.parse_and()?),
            }
        }
        Ok(flatten(items, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut items = vec![self.parse_not()?];
        while self.peek_operator("AND") {
            self.next();
            items.push(self.parse_not()?);
        }
        Ok(flatten(items, Expr::And))
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_primary()?;
        while self.peek_operator("NOT") {
            self.next();
            let right = self.parse_primary()?;
            left = Expr::Not(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            None => Err("expression ends where a term was expected".to_string()),
            Some(Token::Close) => Err("unbalanced parentheses: unexpected ')'".to_string()),
            Some(Token::Open) => {
                if matches!(self.peek(), Some(Token::Close)) {
                    return Err("empty group '()'".to_string());
                }
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("unbalanced parentheses: missing ')'".to_string()),
                }
            }
            Some(Token::Quoted(phrase)) => {
                if phrase.trim().is_empty() {
                    Err("empty quoted phrase".to_string())
                } else {
                    Ok(Expr::Phrase(phrase))
                }
            }
            Some(Token::Word(word)) if is_operator(&word) => {
                Err(format!("operator {} is missing an operand", word))
            }
            Some(Token::Word(word)) => term(word),
        }
    }
}

fn term(word: String) -> Result<Expr, String> {
    match word.find('*') {
        None => Ok(Expr::Term(word)),
        Some(i) if i + 1 == word.len() && i > 0 => Ok(Expr::Prefix(word[..i].to_string())),
        Some(_) if word == "*" => Err("wildcard '*' needs a prefix".to_string()),
        Some(_) => Err(format!(
            "wildcard in '{}' is only supported as a trailing prefix",
            word
        )),
    }
}

fn flatten(mut items: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

fn exact_values(tokens: Vec<Token>) -> Result<Vec<String>, String> {
    let mut values: Vec<String> = Vec::new();
    for token in tokens {
        let value = match token {
            Token::Word(w) if is_operator(&w) => {
                return Err(format!("operator {} is not supported on identifier fields", w))
            }
            Token::Word(w) if w.contains('*') => {
                return Err("wildcards are not supported on identifier fields".to_string())
            }
            Token::Open | Token::Close => {
                return Err("grouping is not supported on identifier fields".to_string())
            }
            Token::Word(w) => w,
            Token::Quoted(q) if q.trim().is_empty() => {
                return Err("empty quoted identifier".to_string())
            }
            Token::Quoted(q) => q,
        };
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}
