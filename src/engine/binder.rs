// SPDX-License-Identifier: Apache-2.0

//! Named parameter binding
//!
//! Rewrites `:name` placeholders into the positional syntax of a target
//! driver and produces the matching ordered argument list.
//!
//! Parsing and binding are split: [`NamedQuery::parse`] validates the
//! template once per request, [`NamedQuery::bind`] is infallible and runs once
//! per host with that host's [`PlaceholderStyle`].
//!
//! ## Scanning rules
//!
//! - `:name` is a placeholder when `name` starts with an ASCII letter or `_`
//! - `::` is the PostgreSQL cast operator and is copied verbatim
//! - `:` followed by a digit is a malformed placeholder
//! - any other `:` (e.g. MySQL `:=`) is copied verbatim
//! - quoted literals (`'…'`, `"…"`, `` `…` ``), `--` line comments and
//!   `/* */` block comments are never scanned for placeholders
//! - a quote inside a literal is written doubled (`'it''s'`); backslash is
//!   an ordinary character, as in SQLite and standard PostgreSQL strings
//!
//! A name that has no entry in the parameter map binds SQL NULL.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::engine::types::{ParamValue, Params};

/// Template rejected by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("malformed placeholder ':{name}' at byte {offset}: names must start with a letter or underscore")]
    MalformedName { name: String, offset: usize },

    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

/// Positional placeholder syntax of a target driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for MySQL, MariaDB and SQLite
    Question,
    /// `$1`, `$2`, … for PostgreSQL
    Dollar,
}

impl PlaceholderStyle {
    fn push(self, out: &mut String, position: usize) {
        match self {
            PlaceholderStyle::Question => out.push('?'),
            PlaceholderStyle::Dollar => {
                out.push('$');
                out.push_str(&position.to_string());
            }
        }
    }
}

/// Positional query ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub args: Vec<ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Sql(String),
    Param(String),
}

/// A parsed SQL template with named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    segments: Vec<Segment>,
}

impl NamedQuery {
    /// Scans `template` for named placeholders.
    pub fn parse(template: &str) -> Result<Self, BindingError> {
        let bytes = template.as_bytes();
        let len = bytes.len();
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut i = 0;

        while i < len {
            match bytes[i] {
                quote @ (b'\'' | b'"' | b'`') => {
                    i = skip_quoted(bytes, i, quote)?;
                }
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    i = skip_line_comment(bytes, i);
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = skip_block_comment(bytes, i)?;
                }
                b':' => match bytes.get(i + 1) {
                    Some(b':') => i += 2,
                    Some(&c) if is_ident_start(c) => {
                        let end = scan_ident(bytes, i + 1);
                        if literal_start < i {
                            segments.push(Segment::Sql(template[literal_start..i].to_string()));
                        }
                        segments.push(Segment::Param(template[i + 1..end].to_string()));
                        i = end;
                        literal_start = end;
                    }
                    Some(c) if c.is_ascii_digit() => {
                        let end = scan_ident(bytes, i + 1);
                        return Err(BindingError::MalformedName {
                            name: template[i + 1..end].to_string(),
                            offset: i,
                        });
                    }
                    _ => i += 1,
                },
                _ => i += 1,
            }
        }

        if literal_start < len {
            segments.push(Segment::Sql(template[literal_start..].to_string()));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of occurrence, repeats included
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Sql(_) => None,
        })
    }

    pub fn placeholder_count(&self) -> usize {
        self.names().count()
    }

    /// Distinct names referenced by the template but absent from `params`.
    pub fn missing_names<'a>(&'a self, params: &Params) -> Vec<&'a str> {
        self.names()
            .filter(|name| !params.contains_key(*name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Produces the positional form for one driver.
    pub fn bind(&self, params: &Params, style: PlaceholderStyle) -> BoundQuery {
        let mut sql = String::new();
        let mut args = Vec::with_capacity(self.placeholder_count());

        for segment in &self.segments {
            match segment {
                Segment::Sql(text) => sql.push_str(text),
                Segment::Param(name) => {
                    args.push(params.get(name).cloned().unwrap_or(ParamValue::Null));
                    style.push(&mut sql, args.len());
                }
            }
        }

        BoundQuery { sql, args }
    }
}

/// Parses and binds in one step.
pub fn bind(
    template: &str,
    params: &Params,
    style: PlaceholderStyle,
) -> Result<BoundQuery, BindingError> {
    Ok(NamedQuery::parse(template)?.bind(params, style))
}

/// Splits `sql` at `;` outside literals and comments, using the same
/// scanning rules as [`NamedQuery::parse`]. Pieces holding nothing but
/// whitespace and comments are dropped.
pub fn split_statements(sql: &str) -> Result<Vec<&str>, BindingError> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i, quote)?;
                has_content = true;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line_comment(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i)?;
            }
            b';' => {
                if has_content {
                    statements.push(sql[start..i].trim());
                }
                has_content = false;
                i += 1;
                start = i;
            }
            c => {
                has_content |= !c.is_ascii_whitespace();
                i += 1;
            }
        }
    }

    if has_content {
        statements.push(sql[start..].trim());
    }
    Ok(statements)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_ident_continue(bytes[end]) {
        end += 1;
    }
    end
}

/// Returns the index just past the closing quote. Doubled quotes stay
/// inside the literal.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Result<usize, BindingError> {
    let mut j = start + 1;
    while j < bytes.len() {
        if bytes[j] == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return Ok(j + 1);
        }
        j += 1;
    }
    Err(BindingError::Unterminated {
        what: "quoted literal",
        offset: start,
    })
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&c| c == b'\n')
        .map(|p| start + p)
        .unwrap_or(bytes.len())
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize, BindingError> {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| start + 2 + p + 2)
        .ok_or(BindingError::Unterminated {
            what: "block comment",
            offset: start,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn binds_single_named_parameter() {
        let p = params(&[("id", ParamValue::Int(5))]);
        let bound = bind("SELECT * FROM t WHERE id = :id", &p, PlaceholderStyle::Question).unwrap();

        assert_eq!(bound.sql, "SELECT * FROM t WHERE id = ?");
        assert_eq!(bound.args, vec![ParamValue::Int(5)]);
    }

    #[test]
    fn repeated_name_yields_repeated_argument() {
        let p = params(&[("v", ParamValue::Text("x".into())), ("n", ParamValue::Int(2))]);
        let bound = bind(
            "SELECT :v, :n FROM t WHERE a = :v",
            &p,
            PlaceholderStyle::Dollar,
        )
        .unwrap();

        assert_eq!(bound.sql, "SELECT $1, $2 FROM t WHERE a = $3");
        assert_eq!(
            bound.args,
            vec![
                ParamValue::Text("x".into()),
                ParamValue::Int(2),
                ParamValue::Text("x".into()),
            ]
        );
    }

    #[test]
    fn missing_name_binds_null() {
        let query = NamedQuery::parse("SELECT * FROM t WHERE a = :a AND b = :b OR c = :b").unwrap();
        let p = params(&[("a", ParamValue::Int(1))]);

        assert_eq!(query.missing_names(&p), vec!["b"]);
        let bound = query.bind(&p, PlaceholderStyle::Question);
        assert_eq!(
            bound.args,
            vec![ParamValue::Int(1), ParamValue::Null, ParamValue::Null]
        );
    }

    #[test]
    fn literals_comments_and_casts_are_not_placeholders() {
        let sql = "SELECT ':skip', \"col:x\", `t:y`, ts::date, x -- :gone\n\
                   FROM t /* :also_gone */ WHERE a = :keep AND b = 'it''s :no'";
        let query = NamedQuery::parse(sql).unwrap();

        assert_eq!(query.names().collect::<Vec<_>>(), vec!["keep"]);
        let bound = query.bind(&Params::new(), PlaceholderStyle::Question);
        assert_eq!(
            bound.sql,
            "SELECT ':skip', \"col:x\", `t:y`, ts::date, x -- :gone\n\
             FROM t /* :also_gone */ WHERE a = ? AND b = 'it''s :no'"
        );
    }

    #[test]
    fn bare_colons_are_copied() {
        let bound = bind("SELECT @a := 1, x : y", &Params::new(), PlaceholderStyle::Question).unwrap();
        assert_eq!(bound.sql, "SELECT @a := 1, x : y");
        assert!(bound.args.is_empty());
    }

    #[test]
    fn digit_leading_name_is_malformed() {
        let err = NamedQuery::parse("SELECT * FROM t WHERE id = :1abc").unwrap_err();
        assert_eq!(
            err,
            BindingError::MalformedName {
                name: "1abc".to_string(),
                offset: 27,
            }
        );
    }

    #[test]
    fn unterminated_literal_is_rejected() {
        assert!(matches!(
            NamedQuery::parse("SELECT 'abc"),
            Err(BindingError::Unterminated { what: "quoted literal", offset: 7 })
        ));
        assert!(matches!(
            NamedQuery::parse("SELECT 1 /* open"),
            Err(BindingError::Unterminated { what: "block comment", .. })
        ));
    }

    #[test]
    fn backslash_does_not_escape_quotes() {
        let query = NamedQuery::parse(r"SELECT 'C:\' AS p FROM t WHERE id = :id").unwrap();
        assert_eq!(query.names().collect::<Vec<_>>(), vec!["id"]);

        let query =
            NamedQuery::parse(r"SELECT 'a\', :x, 'dir\sub' FROM t WHERE note = 'x'").unwrap();
        assert_eq!(query.names().collect::<Vec<_>>(), vec!["x"]);
        let bound = query.bind(&Params::new(), PlaceholderStyle::Dollar);
        assert_eq!(bound.sql, r"SELECT 'a\', $1, 'dir\sub' FROM t WHERE note = 'x'");
    }

    #[test]
    fn backslash_escaped_quote_is_unterminated() {
        // MySQL-only escape; a doubled quote is the portable form.
        assert!(matches!(
            NamedQuery::parse(r"SELECT * FROM t WHERE name = 'O\'Brien'"),
            Err(BindingError::Unterminated { what: "quoted literal", .. })
        ));
        assert!(NamedQuery::parse("SELECT * FROM t WHERE name = 'O''Brien'").is_ok());
    }

    #[test]
    fn splits_statements_outside_literals_and_comments() {
        let sql = "SELECT ';' FROM t; -- a; b\n DELETE FROM t /* ; */ ;; -- trailing";
        assert_eq!(
            split_statements(sql).unwrap(),
            vec!["SELECT ';' FROM t", "-- a; b\n DELETE FROM t /* ; */"]
        );
        assert!(split_statements(" ; -- only comments").unwrap().is_empty());
        assert_eq!(split_statements("SELECT 1").unwrap(), vec!["SELECT 1"]);
    }

    #[test]
    fn non_ascii_text_survives_rewrite() {
        let p = params(&[("nom", ParamValue::Text("é".into()))]);
        let bound = bind("SELECT 'café' AS «x», :nom", &p, PlaceholderStyle::Dollar).unwrap();
        assert_eq!(bound.sql, "SELECT 'café' AS «x», $1");
    }

    #[test]
    fn placeholder_at_end_and_underscore_names() {
        let query = NamedQuery::parse("SELECT :_first,:second_2").unwrap();
        assert_eq!(query.placeholder_count(), 2);
        assert_eq!(query.names().collect::<Vec<_>>(), vec!["_first", "second_2"]);
    }
}
