use std::error;
use std::fmt;

/// Builds a payload-carrying [`Error`] variant from a format string.
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        crate::errors::Error::$variant(format!($($arg)*))
    };
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Structural storage failure: out-of-bounds page or cell access,
    /// corrupt file, invalid child pointer. Never caught; the session aborts.
    Storage(String),
    Syntax,
    UnrecognizedKeyword(String),
    NegativeId,
    StringTooLong,
    DuplicateKey,
    TableFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Storage(msg) => write!(f, "Storage error. {}", msg),
            Error::Syntax => write!(f, "Syntax error. Could not parse statement."),
            Error::UnrecognizedKeyword(input) => {
                write!(f, "Unrecognized keyword at start of '{}'.", input)
            }
            Error::NegativeId => write!(f, "ID must be positive."),
            Error::StringTooLong => write!(f, "String is too long."),
            Error::DuplicateKey => write!(f, "Duplicate key."),
            Error::TableFull => write!(f, "Table is full"),
        }
    }
}

impl error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl Error {
    /// User errors are reported as a line of output and the REPL continues.
    /// Everything else aborts the session.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Storage(_))
    }
}
