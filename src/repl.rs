//! # REPL
//!
//! A line-oriented loop: print the prompt, read one line, strip the
//! terminator, and dispatch. Lines starting with `.` are meta commands;
//! everything else goes through the statement parser. User errors are
//! printed and the loop continues; storage and IO failures abort the
//! session without flushing.

pub mod history;

use crate::errors::Error;
use crate::session::Session;
use crate::sql::{self, Statement};
use crate::storage::btree;
use crate::storage::row::ROW_SIZE;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;

const PROMPT: &str = "db > ";

#[derive(Debug, PartialEq)]
enum MetaCommandResult {
    Success,
    Exit,
    Unrecognized,
}

/// Runs the REPL against the database at `path` until `.exit`.
pub fn start(path: &Path) -> Result<(), Error> {
    let mut session = Session::open(path)?;
    info!(session_id = %session.id, "Starting REPL session");

    let history_path = history::default_path();
    if let Some(history_path) = &history_path {
        let _ = history::ensure_history_file(history_path);
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", PROMPT);
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Error reading input",
                )))
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Some(history_path) = &history_path {
            let _ = history::append_history(input, history_path);
        }

        if input.starts_with('.') {
            match do_meta_command(input, &mut session)? {
                MetaCommandResult::Exit => break,
                MetaCommandResult::Success => {}
                MetaCommandResult::Unrecognized => {
                    println!("Unrecognized command '{}'.", input);
                }
            }
            continue;
        }

        match sql::prepare(input) {
            Ok(statement) => match execute_statement(statement, &mut session) {
                Ok(()) => {}
                Err(e) if e.is_user_error() => println!("Error: {}", e),
                Err(e) => return Err(e),
            },
            Err(e) if e.is_user_error() => println!("{}", e),
            Err(e) => return Err(e),
        }
    }

    session.close()?;
    Ok(())
}

fn do_meta_command(input: &str, session: &mut Session) -> Result<MetaCommandResult, Error> {
    match input {
        ".exit" => Ok(MetaCommandResult::Exit),
        ".btree" => {
            println!("Tree:");
            let mut out = io::stdout();
            session.table.print_tree(&mut out)?;
            Ok(MetaCommandResult::Success)
        }
        ".constants" => {
            println!("Constants:");
            println!("ROW_SIZE: {}", ROW_SIZE);
            println!("COMMON_NODE_HEADER_SIZE: {}", btree::COMMON_NODE_HEADER_SIZE);
            println!("LEAF_NODE_HEADER_SIZE: {}", btree::LEAF_NODE_HEADER_SIZE);
            println!("LEAF_NODE_CELL_SIZE: {}", btree::LEAF_NODE_CELL_SIZE);
            println!(
                "LEAF_NODE_SPACE_FOR_CELLS: {}",
                btree::LEAF_NODE_SPACE_FOR_CELLS
            );
            println!("LEAF_NODE_MAX_CELLS: {}", btree::LEAF_NODE_MAX_CELLS);
            Ok(MetaCommandResult::Success)
        }
        _ => Ok(MetaCommandResult::Unrecognized),
    }
}

fn execute_statement(statement: Statement, session: &mut Session) -> Result<(), Error> {
    match statement {
        Statement::Insert(row) => {
            session.table.insert(&row)?;
            println!("Executed.");
        }
        Statement::Select => {
            for row in session.table.select()? {
                println!("{}", row);
            }
            println!("Executed.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_session() -> (NamedTempFile, Session) {
        let temp = NamedTempFile::new().unwrap();
        let session = Session::open(temp.path()).unwrap();
        (temp, session)
    }

    #[test]
    fn test_meta_command_dispatch() {
        let (_temp, mut session) = open_session();
        assert_eq!(
            do_meta_command(".exit", &mut session).unwrap(),
            MetaCommandResult::Exit
        );
        assert_eq!(
            do_meta_command(".constants", &mut session).unwrap(),
            MetaCommandResult::Success
        );
        assert_eq!(
            do_meta_command(".tables", &mut session).unwrap(),
            MetaCommandResult::Unrecognized
        );
    }

    #[test]
    fn test_execute_insert_then_select() {
        let (_temp, mut session) = open_session();
        let statement = sql::prepare("insert 1 user1 person1@example.com").unwrap();
        execute_statement(statement, &mut session).unwrap();
        let rows = session.table.select().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
    }

    #[test]
    fn test_duplicate_insert_is_user_error() {
        let (_temp, mut session) = open_session();
        let first = sql::prepare("insert 1 a b").unwrap();
        execute_statement(first, &mut session).unwrap();
        let second = sql::prepare("insert 1 a b").unwrap();
        let err = execute_statement(second, &mut session).unwrap_err();
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "Duplicate key.");
    }
}
