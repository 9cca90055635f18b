// SPDX-License-Identifier: Apache-2.0

//! Read-only statement guard
//!
//! The gateway only serves reads. Statements are parsed with the generic
//! dialect; vendor syntax the parser does not understand falls back to a
//! leading-keyword check on every `;`-separated statement.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::engine::binder::split_statements;
use crate::engine::error::RequestError;

const READ_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES", "TABLE",
];

/// Accepts `sql` only if every statement in it is a read.
pub fn check(sql: &str) -> Result<(), RequestError> {
    match Parser::parse_sql(&GenericDialect {}, sql.trim()) {
        Ok(statements) => {
            if statements.is_empty() {
                return Err(RequestError::malformed("empty statement"));
            }
            for statement in &statements {
                if !is_read_statement(statement) {
                    return Err(RequestError::not_read_only(first_keyword(
                        &statement.to_string(),
                    )));
                }
            }
            Ok(())
        }
        Err(e) => {
            debug!(error = %e, "statement not parsed, falling back to keyword check");
            let statements = split_statements(sql)?;
            if statements.is_empty() {
                return Err(RequestError::malformed("empty statement"));
            }
            for statement in statements {
                let keyword = first_keyword(statement);
                if keyword.is_empty() {
                    return Err(RequestError::not_read_only("unrecognized statement"));
                }
                if !READ_KEYWORDS.contains(&keyword.as_str()) {
                    return Err(RequestError::not_read_only(keyword));
                }
            }
            Ok(())
        }
    }
}

fn is_read_statement(statement: &Statement) -> bool {
    match statement {
        Statement::Query(_) => true,
        Statement::Explain { statement, .. } => is_read_statement(statement),
        Statement::ExplainTable { .. } => true,
        // SHOW variants differ between parser releases; the rendered keyword is stable.
        other => {
            let keyword = first_keyword(&other.to_string());
            keyword == "SHOW" || keyword == "DESCRIBE" || keyword == "DESC"
        }
    }
}

/// Upper-cased first keyword, skipping whitespace, comments and parentheses
fn first_keyword(sql: &str) -> String {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            rest = trimmed;
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}
