use anyhow::{Context, Result};
use sqlparser::dialect::{dialect_from_str, GenericDialect, MySqlDialect};
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tracing::debug;

use crate::types::{RawColumn, RawTable};

use super::Extractor;

/// Leading words of table-level definitions that never declare a column.
/// `PRIMARY` and `FOREIGN` only count when followed by `KEY`.
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "KEY",
    "INDEX",
    "UNIQUE",
    "CONSTRAINT",
    "FULLTEXT",
    "CHECK",
    "SPATIAL",
];

/// `CREATE TABLE` extractor on top of the sqlparser tokenizer.
///
/// Only the tokenizer is used, not the full parser, so vendor DDL extensions
/// (engine options, inline index hints, odd type names) pass through.
#[derive(Debug, Clone)]
pub struct SqlExtractor {
    dialect: String,
}

impl Default for SqlExtractor {
    fn default() -> Self {
        Self {
            dialect: "generic".to_string(),
        }
    }
}

impl SqlExtractor {
    /// Create an extractor for a sqlparser dialect name (`generic`, `mysql`,
    /// `postgresql`, `mssql`, `sqlite`, ...).
    pub fn new(dialect: &str) -> Result<Self> {
        if dialect_from_str(dialect).is_none() {
            anyhow::bail!("unknown SQL dialect: '{dialect}'");
        }
        Ok(Self {
            dialect: dialect.to_string(),
        })
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Parse every `CREATE TABLE` statement in `source`.
    ///
    /// When the configured dialect cannot tokenize the file, it is retried
    /// with MySQL rules, which accept backslash-escaped quotes (`'it\'s'`)
    /// as written by mysqldump.
    pub fn parse_tables(&self, source: &str, file_path: &str) -> Result<Vec<RawTable>> {
        let dialect = dialect_from_str(&self.dialect).unwrap_or_else(|| Box::new(GenericDialect {}));
        let tokens = match Tokenizer::new(dialect.as_ref(), source).tokenize() {
            Ok(tokens) => tokens,
            Err(e) if !self.dialect.eq_ignore_ascii_case("mysql") => {
                debug!(file = %file_path, dialect = %self.dialect, error = %e, "Tokenizing failed, retrying as MySQL");
                Tokenizer::new(&MySqlDialect {}, source)
                    .tokenize()
                    .with_context(|| format!("Failed to tokenize {file_path}"))?
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to tokenize {file_path}")),
        };

        let tables: Vec<RawTable> = tokens
            .split(|t| matches!(t, Token::SemiColon))
            .filter_map(|stmt| parse_create_table(stmt, file_path))
            .collect();

        debug!(file = %file_path, tables = tables.len(), "parsed SQL file");
        Ok(tables)
    }
}

impl Extractor for SqlExtractor {
    fn extract(&mut self, source: &str, file_path: &str) -> Result<Vec<RawTable>> {
        self.parse_tables(source, file_path)
    }
}

/// One top-level entry of a column block.
#[derive(Debug)]
enum Definition {
    Column(RawColumn),
    /// Table-level `PRIMARY KEY (a, b)`, possibly behind `CONSTRAINT name`.
    PrimaryKey(Vec<String>),
    Constraint,
}

/// Build a `RawTable` from one statement, or `None` if it is not a
/// `CREATE ... TABLE name (...)` statement.
fn parse_create_table(stmt: &[Token], file_path: &str) -> Option<RawTable> {
    let sig = significant(stmt);
    if !is_word(sig.first()?.1, "CREATE") {
        return None;
    }

    // TABLE must come before any parenthesis (rules out CREATE INDEX ... ON t (...)).
    let table_pos = sig
        .iter()
        .take_while(|(_, t)| !matches!(t, Token::LParen))
        .position(|(_, t)| is_word(t, "TABLE"))?;

    let mut cursor = table_pos + 1;
    if ["IF", "NOT", "EXISTS"]
        .iter()
        .enumerate()
        .all(|(i, kw)| sig.get(cursor + i).is_some_and(|(_, t)| is_word(t, kw)))
    {
        cursor += 3;
    }

    let (name, after_name) = parse_object_name(&sig, cursor)?;
    let (open_idx, open) = sig.get(after_name)?;
    if !matches!(open, Token::LParen) {
        return None;
    }
    let close_idx = matching_paren(stmt, *open_idx)?;
    let block = &stmt[open_idx + 1..close_idx];

    let definitions: Vec<Definition> = split_top_level(block)
        .into_iter()
        .filter_map(parse_definition)
        .collect();

    let table_pk: Vec<&str> = definitions
        .iter()
        .filter_map(|d| match d {
            Definition::PrimaryKey(cols) => Some(cols.iter().map(String::as_str)),
            _ => None,
        })
        .flatten()
        .collect();

    let columns: Vec<RawColumn> = definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Column(col) => Some(col),
            _ => None,
        })
        .map(|col| {
            if table_pk.iter().any(|pk| pk.eq_ignore_ascii_case(&col.name)) {
                col.clone().with_primary_key(true).with_nullable(false)
            } else {
                col.clone()
            }
        })
        .collect();

    let raw: String = stmt.iter().map(|t| t.to_string()).collect();
    Some(RawTable::new(name, columns, file_path).with_raw_content(Some(raw.trim().to_string())))
}

/// Parse a possibly qualified, possibly quoted object name starting at `start`.
/// Returns the last name segment and the index just past the name.
fn parse_object_name(sig: &[(usize, &Token)], start: usize) -> Option<(String, usize)> {
    let mut i = start;
    loop {
        let bracketed = matches!(sig.get(i)?.1, Token::LBracket);
        if bracketed {
            i += 1;
        }
        let part = identifier_value(sig.get(i)?.1)?;
        i += 1;
        if bracketed {
            if !matches!(sig.get(i)?.1, Token::RBracket) {
                return None;
            }
            i += 1;
        }
        match sig.get(i) {
            Some((_, Token::Period)) => i += 1,
            _ => return Some((part, i)),
        }
    }
}

fn parse_definition(fragment: &[Token]) -> Option<Definition> {
    let sig = significant(fragment);
    let (_, first) = *sig.first()?;

    if is_constraint_start(&sig) {
        if let Some(cols) = primary_key_columns(&sig) {
            return Some(Definition::PrimaryKey(cols));
        }
        return Some(Definition::Constraint);
    }

    // Column name: bare or quoted word, or `[name]`.
    let (name, name_end) = if matches!(first, Token::LBracket) {
        let name = identifier_value(sig.get(1)?.1)?;
        let (close_idx, close) = sig.get(2)?;
        if !matches!(close, Token::RBracket) {
            return None;
        }
        (name, *close_idx)
    } else {
        (identifier_value(first)?, sig[0].0)
    };

    let name = name.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_string();
    if name.is_empty() {
        return None;
    }

    let original_type = render(&fragment[name_end + 1..]);
    let is_primary_key = has_word_pair(&sig, "PRIMARY", "KEY");
    let not_null = has_word_pair(&sig, "NOT", "NULL");

    Some(Definition::Column(
        RawColumn::new(name, original_type)
            .with_primary_key(is_primary_key)
            .with_nullable(!(is_primary_key || not_null))
            .with_description(column_comment(&sig)),
    ))
}

fn is_constraint_start(sig: &[(usize, &Token)]) -> bool {
    let Some((_, first)) = sig.first() else {
        return false;
    };
    if CONSTRAINT_KEYWORDS.iter().any(|kw| is_word(first, kw)) {
        return true;
    }
    let second_is_key = sig.get(1).is_some_and(|(_, t)| is_word(t, "KEY"));
    (is_word(first, "PRIMARY") || is_word(first, "FOREIGN")) && second_is_key
}

/// Column list of a table-level `PRIMARY KEY (...)`, if the fragment has one.
fn primary_key_columns(sig: &[(usize, &Token)]) -> Option<Vec<String>> {
    let pos = sig
        .windows(2)
        .position(|w| is_word(w[0].1, "PRIMARY") && is_word(w[1].1, "KEY"))?;
    let rest = &sig[pos + 2..];
    if !matches!(rest.first()?.1, Token::LParen) {
        return None;
    }
    let cols = rest[1..]
        .iter()
        .take_while(|(_, t)| !matches!(t, Token::RParen))
        .filter_map(|(_, t)| identifier_value(t))
        .collect();
    Some(cols)
}

/// Text of a MySQL-style `COMMENT 'text'` clause.
fn column_comment(sig: &[(usize, &Token)]) -> Option<String> {
    sig.windows(2).find_map(|w| match (w[0].1, w[1].1) {
        (kw, Token::SingleQuotedString(s) | Token::DoubleQuotedString(s))
            if is_word(kw, "COMMENT") =>
        {
            Some(s.clone())
        }
        _ => None,
    })
}

/// Split a column block on commas at parenthesis depth zero.
///
/// A naive split breaks `DECIMAL(10,2)` into two definitions; commas inside
/// string literals never appear as tokens, so they are safe too.
fn split_top_level(block: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in block.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                parts.push(&block[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&block[start..]);
    parts
}

/// Index of the `)` closing the `(` at `open`.
fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-whitespace, non-comment tokens with their index in `tokens`.
fn significant(tokens: &[Token]) -> Vec<(usize, &Token)> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect()
}

/// Render tokens back to text with comments dropped and whitespace collapsed.
fn render(tokens: &[Token]) -> String {
    let text: String = tokens
        .iter()
        .map(|t| match t {
            Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_)) => " ".to_string(),
            other => other.to_string(),
        })
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn identifier_value(tok: &Token) -> Option<String> {
    match tok {
        Token::Word(w) => Some(w.value.clone()),
        Token::DoubleQuotedString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Unquoted word matching `kw` case-insensitively.
fn is_word(tok: &Token, kw: &str) -> bool {
    matches!(tok, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
}

fn has_word_pair(sig: &[(usize, &Token)], a: &str, b: &str) -> bool {
    sig.windows(2)
        .any(|w| is_word(w[0].1, a) && is_word(w[1].1, b))
}
