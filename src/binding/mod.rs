//! Named-parameter binding.
//!
//! Command builders produce SQL with `$name` placeholders; the wire protocol
//! wants `$1..$n`. [`bind_named`] rewrites the text and collects the
//! positional values in occurrence order.
//!
//! The placeholder grammar is `$` followed by a letter or underscore, then
//! letters, digits, underscores, or dots. Positional markers (`$1`) never
//! match, so binding already-bound text changes nothing. Placeholders inside
//! string literals, comments, and dollar-quoted blocks are left alone.

use std::collections::BTreeMap;

mod scanner;

use scanner::{
    State, is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    scan_identifier, try_start_dollar_quote,
};

use crate::error::SqlcmdPgError;
use crate::types::RowValues;

/// A SQL command template plus its named parameters.
///
/// ```rust
/// use sqlcmd_pg::Command;
///
/// let command = Command::new("SELECT age FROM person WHERE name = $name")
///     .param("name", "Brown");
/// let bound = command.bind().unwrap();
/// assert_eq!(bound.text, "SELECT age FROM person WHERE name = $1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Command {
    /// The SQL template, containing `$name` placeholders
    pub text: String,
    /// The named parameters referenced by the template
    pub parameters: BTreeMap<String, RowValues>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add or replace a named parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Rewrite the template into positional form.
    ///
    /// # Errors
    /// Fails with `SqlcmdPgError::MissingParameter` if the template references
    /// a name that was never supplied.
    pub fn bind(&self) -> Result<BoundStatement, SqlcmdPgError> {
        bind_named(&self.text, &self.parameters)
    }
}

/// A rewritten statement: positional text plus arguments in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// SQL text with `$1..$n` markers
    pub text: String,
    /// Positional arguments, one per marker occurrence
    pub values: Vec<RowValues>,
}

/// Replace every `$name` occurrence with the next positional marker and
/// collect the referenced values left to right.
///
/// Repeated uses of the same name are not deduplicated: each occurrence gets
/// a fresh index and a fresh copy of the value.
///
/// # Errors
/// Fails before any I/O with `SqlcmdPgError::MissingParameter` (carrying the
/// name, the template, and the full parameter map) when a placeholder has no
/// matching entry.
pub fn bind_named(
    sql: &str,
    parameters: &BTreeMap<String, RowValues>,
) -> Result<BoundStatement, SqlcmdPgError> {
    let bytes = sql.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut values: Vec<RowValues> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        // Set when a multi-byte span was already copied (or rewritten) into `out`.
        let mut consumed = false;
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => state = State::BlockComment(1),
                b'$' => {
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        out.extend_from_slice(&bytes[idx..=close]);
                        idx = close;
                        consumed = true;
                        state = State::DollarQuoted(tag);
                    } else if let Some((name_end, name)) = scan_identifier(bytes, idx + 1) {
                        let value = parameters.get(name).ok_or_else(|| {
                            SqlcmdPgError::MissingParameter {
                                name: name.to_string(),
                                sql: sql.to_string(),
                                parameters: parameters.clone(),
                            }
                        })?;
                        values.push(value.clone());
                        out.push(b'$');
                        out.extend_from_slice(values.len().to_string().as_bytes());
                        idx = name_end - 1;
                        consumed = true;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        out.extend_from_slice(b"''");
                        idx += 1;
                        consumed = true;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        out.extend_from_slice(b"\"\"");
                        idx += 1;
                        consumed = true;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                } else if is_block_comment_end(bytes, idx) {
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    let end = idx + 1 + tag.len();
                    out.extend_from_slice(&bytes[idx..=end]);
                    idx = end;
                    consumed = true;
                    state = State::Normal;
                }
            }
        }

        if !consumed {
            out.push(b);
        }
        idx += 1;
    }

    let text = String::from_utf8(out)
        .map_err(|e| SqlcmdPgError::Other(format!("rewritten SQL is not valid UTF-8: {e}")))?;
    Ok(BoundStatement { text, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, RowValues)]) -> BTreeMap<String, RowValues> {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn binds_placeholders_in_occurrence_order() {
        let map = params(&[
            ("name", RowValues::Text("Brown".into())),
            ("age", RowValues::Int(32)),
        ]);
        let bound =
            bind_named("INSERT INTO person (name, age) VALUES ($name, $age)", &map).unwrap();
        assert_eq!(bound.text, "INSERT INTO person (name, age) VALUES ($1, $2)");
        assert_eq!(
            bound.values,
            vec![RowValues::Text("Brown".into()), RowValues::Int(32)]
        );
    }

    #[test]
    fn repeated_names_get_distinct_indices() {
        let map = params(&[("id", RowValues::Int(7))]);
        let bound = bind_named("SELECT * FROM t WHERE a = $id OR b = $id", &map).unwrap();
        assert_eq!(bound.text, "SELECT * FROM t WHERE a = $1 OR b = $2");
        assert_eq!(bound.values, vec![RowValues::Int(7), RowValues::Int(7)]);
    }

    #[test]
    fn missing_parameter_fails_with_diagnostics() {
        let map = params(&[("name", RowValues::Text("Brown".into()))]);
        let err = bind_named("SELECT * FROM t WHERE age = $age", &map).unwrap_err();
        match err {
            SqlcmdPgError::MissingParameter {
                name,
                sql,
                parameters,
            } => {
                assert_eq!(name, "age");
                assert_eq!(sql, "SELECT * FROM t WHERE age = $age");
                assert!(parameters.contains_key("name"));
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn rebinding_bound_text_is_noop() {
        let map = params(&[("a", RowValues::Int(1)), ("b", RowValues::Int(2))]);
        let once = bind_named("SELECT $a, $b", &map).unwrap();
        let twice = bind_named(&once.text, &map).unwrap();
        assert_eq!(twice.text, once.text);
        assert!(twice.values.is_empty());
    }

    #[test]
    fn dotted_names_resolve() {
        let map = params(&[("person.name", RowValues::Text("Smith".into()))]);
        let bound = bind_named("SELECT * FROM t WHERE name = $person.name", &map).unwrap();
        assert_eq!(bound.text, "SELECT * FROM t WHERE name = $1");
        assert_eq!(bound.values.len(), 1);
    }

    #[test]
    fn skips_placeholders_inside_literals_and_comments() {
        let map = params(&[("a", RowValues::Int(1))]);
        let sql = "select '$a', $a -- $b\n/* $c */ from t where x = $a";
        let bound = bind_named(sql, &map).unwrap();
        assert_eq!(
            bound.text,
            "select '$a', $1 -- $b\n/* $c */ from t where x = $2"
        );
        assert_eq!(bound.values.len(), 2);
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let map = params(&[("a", RowValues::Int(1))]);
        let sql = "$foo$ select $a from t $foo$ where x = $a";
        let bound = bind_named(sql, &map).unwrap();
        assert_eq!(bound.text, "$foo$ select $a from t $foo$ where x = $1");
        assert_eq!(bound.values.len(), 1);
    }

    #[test]
    fn doubled_quotes_stay_intact() {
        let map = params(&[("a", RowValues::Int(1))]);
        let sql = "select 'it''s $a' where x = $a";
        let bound = bind_named(sql, &map).unwrap();
        assert_eq!(bound.text, "select 'it''s $a' where x = $1");
    }

    #[test]
    fn positional_markers_never_match() {
        let bound = bind_named("SELECT $1, $2", &BTreeMap::new()).unwrap();
        assert_eq!(bound.text, "SELECT $1, $2");
        assert!(bound.values.is_empty());
    }

    #[test]
    fn command_builder_round_trip() {
        let command = Command::new("UPDATE person SET age = $age WHERE name = $name")
            .param("age", 33i64)
            .param("name", "Brown");
        let bound = command.bind().unwrap();
        assert_eq!(bound.text, "UPDATE person SET age = $1 WHERE name = $2");
        assert_eq!(
            bound.values,
            vec![RowValues::Int(33), RowValues::Text("Brown".into())]
        );
    }
}
