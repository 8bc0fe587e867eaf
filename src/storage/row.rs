//! # Row Codec
//!
//! A row is a fixed-shape record `(id, username, email)` serialized into a
//! fixed 293-byte frame: the id as a little-endian `u32`, then each string
//! field NUL-padded to its column width plus a terminator byte, C-string
//! style.

use crate::errors::Error;
use std::fmt;

/// Maximum username length in bytes (excluding the NUL terminator).
pub const COLUMN_USERNAME_SIZE: usize = 32;

/// Maximum email length in bytes (excluding the NUL terminator).
pub const COLUMN_EMAIL_SIZE: usize = 255;

const ID_SIZE: usize = std::mem::size_of::<u32>();
const USERNAME_SIZE: usize = COLUMN_USERNAME_SIZE + 1;
const EMAIL_SIZE: usize = COLUMN_EMAIL_SIZE + 1;

const ID_OFFSET: usize = 0;
const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Serialized size of a row: 4 + 33 + 256 = 293 bytes.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single table row, keyed by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Builds a row, rejecting over-long string fields.
    pub fn new(id: u32, username: &str, email: &str) -> Result<Self, Error> {
        if username.len() > COLUMN_USERNAME_SIZE || email.len() > COLUMN_EMAIL_SIZE {
            return Err(Error::StringTooLong);
        }
        Ok(Row {
            id,
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    /// Serializes the row into its fixed on-page frame. String fields are
    /// written at their column offsets; the zeroed remainder supplies the
    /// NUL padding.
    pub fn serialize(&self) -> [u8; ROW_SIZE] {
        let mut buf = [0u8; ROW_SIZE];
        buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        let username = self.username.as_bytes();
        buf[USERNAME_OFFSET..USERNAME_OFFSET + username.len()].copy_from_slice(username);
        let email = self.email.as_bytes();
        buf[EMAIL_OFFSET..EMAIL_OFFSET + email.len()].copy_from_slice(email);
        buf
    }

    /// Reads a row back from a 293-byte frame.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the frame has the wrong size or a
    /// string field is not valid UTF-8.
    pub fn deserialize(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != ROW_SIZE {
            return Err(err!(
                Storage,
                "Row frame size mismatch (expected={}, got={})",
                ROW_SIZE,
                buf.len()
            ));
        }
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + ID_SIZE]);
        Ok(Row {
            id: u32::from_le_bytes(id_bytes),
            username: read_cstr(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE])?,
            email: read_cstr(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE])?,
        })
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

/// Decodes a NUL-padded field up to its terminator.
fn read_cstr(field: &[u8]) -> Result<String, Error> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| err!(Storage, "Row field is not valid UTF-8: {}", e))
}
