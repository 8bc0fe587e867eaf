//! # Statement Parser
//!
//! The REPL speaks a two-statement dialect: `insert <id> <username>
//! <email>` and `select`. Tokens are whitespace-separated; the id is parsed
//! as a signed integer so a negative value can be reported as its own
//! error rather than a syntax error.

use crate::errors::Error;
use crate::storage::Row;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, PartialEq)]
pub enum Statement {
    Insert(Row),
    Select,
}

static INSERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^insert\s+(-?\d+)\s+(\S+)\s+(\S+)\s*$").expect("insert pattern must compile")
});

/// Parses one input line into a [`Statement`].
///
/// # Errors
/// - `Error::Syntax` when an `insert` line does not match the token grammar
/// - `Error::NegativeId` for an id below zero
/// - `Error::StringTooLong` when a string field exceeds its column width
/// - `Error::UnrecognizedKeyword` for any other leading keyword
pub fn prepare(input: &str) -> Result<Statement, Error> {
    if input.starts_with("insert") {
        return prepare_insert(input);
    }
    if input == "select" {
        return Ok(Statement::Select);
    }
    Err(Error::UnrecognizedKeyword(input.to_string()))
}

fn prepare_insert(input: &str) -> Result<Statement, Error> {
    let caps = INSERT_RE.captures(input).ok_or(Error::Syntax)?;
    let id: i64 = caps[1].parse().map_err(|_| Error::Syntax)?;
    if id < 0 {
        return Err(Error::NegativeId);
    }
    let id = u32::try_from(id).map_err(|_| Error::Syntax)?;
    let row = Row::new(id, &caps[2], &caps[3])?;
    Ok(Statement::Insert(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::{COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE};

    #[test]
    fn test_prepare_insert() {
        let statement = prepare("insert 1 user1 person1@example.com").unwrap();
        let expected = Row::new(1, "user1", "person1@example.com").unwrap();
        assert_eq!(statement, Statement::Insert(expected));
    }

    #[test]
    fn test_prepare_select() {
        assert_eq!(prepare("select").unwrap(), Statement::Select);
    }

    #[test]
    fn test_missing_tokens_is_syntax_error() {
        assert!(matches!(prepare("insert 1 user1"), Err(Error::Syntax)));
        assert!(matches!(prepare("insert"), Err(Error::Syntax)));
    }

    #[test]
    fn test_negative_id() {
        assert!(matches!(
            prepare("insert -1 foo bar"),
            Err(Error::NegativeId)
        ));
    }

    #[test]
    fn test_string_too_long() {
        let username = "a".repeat(COLUMN_USERNAME_SIZE + 1);
        let input = format!("insert 1 {} foo@bar", username);
        assert!(matches!(prepare(&input), Err(Error::StringTooLong)));

        let email = "a".repeat(COLUMN_EMAIL_SIZE + 1);
        let input = format!("insert 1 foo {}", email);
        assert!(matches!(prepare(&input), Err(Error::StringTooLong)));
    }

    #[test]
    fn test_longest_fields_accepted() {
        let username = "a".repeat(COLUMN_USERNAME_SIZE);
        let email = "b".repeat(COLUMN_EMAIL_SIZE);
        let input = format!("insert 1 {} {}", username, email);
        assert!(prepare(&input).is_ok());
    }

    #[test]
    fn test_unrecognized_keyword() {
        assert!(matches!(
            prepare("update foo"),
            Err(Error::UnrecognizedKeyword(_))
        ));
    }

    #[test]
    fn test_id_above_u32_range_is_syntax_error() {
        assert!(matches!(
            prepare("insert 4294967296 foo bar"),
            Err(Error::Syntax)
        ));
    }
}
