//! Splitting and classification of textual SQL batches.
//!
//! A batch is a leading run of `SET` statements for session variables,
//! followed by either only transactional statements or only queries.
use std::fmt;

use chrono::{DateTime, FixedOffset};
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};
use tracing::debug;
use xtql::json::parse_timestamp;

use crate::errors::{Result, SqlParsingError, XtdbError};

const TX_KEYWORDS: [&str; 4] = ["INSERT INTO", "UPDATE", "DELETE FROM", "ERASE FROM"];

/// Whether `statement` is submitted as a transaction rather than run as a
/// query.
///
/// This is a case sensitive substring match, so a query mentioning one of the
/// keywords inside a string literal is treated as transactional.
pub fn is_tx(statement: &str) -> bool {
    TX_KEYWORDS.iter().any(|kw| statement.contains(kw))
}

/// A single statement sliced from the source batch, with its tokens. The
/// terminator is not included and the text is otherwise left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    /// Tokens paired with their byte offset into `text`.
    tokens: Vec<(usize, Token)>,
}

impl Statement {
    fn new(piece: &str, start: usize, tokens: Vec<(usize, Token)>) -> Self {
        let lead = piece.len() - piece.trim_start().len();
        let tokens = tokens
            .into_iter()
            .map(|(offset, tok)| (offset.saturating_sub(start + lead), tok))
            .collect();
        Statement {
            text: piece.trim().to_string(),
            tokens,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn significant(&self) -> impl Iterator<Item = &(usize, Token)> {
        self.tokens
            .iter()
            .filter(|(_, tok)| !matches!(tok, Token::Whitespace(_)))
    }

    /// Starts with the `SET` keyword.
    pub fn is_set(&self) -> bool {
        matches!(
            self.significant().next(),
            Some((_, Token::Word(w))) if w.keyword == Keyword::SET
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column) back to byte
/// offsets in the source.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        LineIndex {
            source,
            line_starts,
        }
    }

    fn offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&start) = self.line_starts.get(line) else {
            return self.source.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.source[start..]
            .char_indices()
            .nth(column)
            .map_or(self.source.len(), |(i, _)| start + i)
    }
}

/// Split `sql` on statement terminators outside of quotes and comments.
///
/// Statement text is sliced from `sql` as written. Pieces holding only
/// whitespace or comments are dropped.
pub fn split_statements(sql: &str) -> Result<Vec<Statement>, SqlParsingError> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize_with_location()
        .map_err(|e| SqlParsingError::Tokenize(e.to_string()))?;
    let index = LineIndex::new(sql);

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut current = Vec::new();
    for TokenWithLocation { token, location } in tokens {
        let offset = index.offset(location);
        match token {
            Token::SemiColon => {
                pieces.push((start, offset, std::mem::take(&mut current)));
                start = (offset + 1).min(sql.len());
            }
            Token::EOF => (),
            token => current.push((offset, token)),
        }
    }
    pieces.push((start, sql.len(), current));

    Ok(pieces
        .into_iter()
        .filter(|(_, _, toks)| toks.iter().any(|(_, t)| !matches!(t, Token::Whitespace(_))))
        .map(|(start, end, toks)| Statement::new(&sql[start..end], start, toks))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVar {
    ImportSystemTime,
    Basis,
}

impl SessionVar {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "import_system_time" => Some(SessionVar::ImportSystemTime),
            "basis" => Some(SessionVar::Basis),
            _ => None,
        }
    }
}

/// A parsed `SET <var> = <value>`. A `None` value clears the variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStatement {
    pub var: SessionVar,
    pub value: Option<DateTime<FixedOffset>>,
}

impl SetStatement {
    fn parse(stmt: &Statement) -> Result<Self> {
        let malformed = || SqlParsingError::MalformedSet(stmt.text.clone());
        let mut significant = stmt.significant().skip(1);

        let var = match significant.next() {
            Some((_, Token::Word(w))) => SessionVar::from_name(&w.value)
                .ok_or_else(|| SqlParsingError::UnknownSessionVariable(w.value.clone()))?,
            _ => return Err(malformed().into()),
        };

        let value_start = match significant.next() {
            Some((offset, Token::Eq)) => offset + 1,
            Some((offset, Token::Word(w))) if w.keyword == Keyword::TO => offset + w.value.len(),
            _ => return Err(malformed().into()),
        };

        let raw = stmt.text.get(value_start..).unwrap_or_default();
        let value = strip_quotes(raw.trim());
        if value.is_empty() {
            return Err(malformed().into());
        }

        let value = if value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("null") {
            None
        } else {
            let t = parse_timestamp(value)
                .map_err(|_| XtdbError::InvalidTimestamp(value.to_string()))?;
            Some(t)
        };

        Ok(SetStatement { var, value })
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchBody {
    /// Only session variables were set.
    Empty,
    /// Submitted together as one transaction.
    Tx(Vec<String>),
    /// Run in order, keeping the last result.
    Queries(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub sets: Vec<SetStatement>,
    pub body: BatchBody,
}

/// Parse and validate a batch without touching any session state.
pub fn parse_batch(sql: &str) -> Result<Batch> {
    let statements = split_statements(sql)?;
    if statements.is_empty() {
        return Err(SqlParsingError::NoStatements.into());
    }

    let leading = statements.iter().take_while(|s| s.is_set()).count();
    let sets = statements[..leading]
        .iter()
        .map(SetStatement::parse)
        .collect::<Result<Vec<_>>>()?;

    let rest = &statements[leading..];
    if rest.iter().any(Statement::is_set) {
        return Err(SqlParsingError::MisplacedSet.into());
    }

    let tx_count = rest.iter().filter(|s| is_tx(s.text())).count();
    let texts = rest.iter().map(|s| s.text().to_string()).collect::<Vec<_>>();
    let body = if rest.is_empty() {
        BatchBody::Empty
    } else if tx_count == rest.len() {
        BatchBody::Tx(texts)
    } else if tx_count == 0 {
        BatchBody::Queries(texts)
    } else {
        return Err(SqlParsingError::MixedBatch.into());
    };

    debug!(sets = sets.len(), statements = rest.len(), tx = tx_count > 0, "parsed batch");
    Ok(Batch { sets, body })
}
