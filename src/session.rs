use crate::errors::Error;
use crate::storage::Table;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// A REPL session bound to one database file. The id only appears in the
/// log, to tell interleaved sessions apart.
pub struct Session {
    pub id: Uuid,
    pub table: Table,
}

impl Session {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let table = Table::open(path)?;
        let session = Session {
            id: Uuid::new_v4(),
            table,
        };
        info!(session_id = %session.id, path = %path.display(), "Opened database");
        Ok(session)
    }

    /// Flushes and releases the underlying table.
    pub fn close(&mut self) -> Result<(), Error> {
        self.table.close()?;
        info!(session_id = %self.id, "Closed session");
        Ok(())
    }
}
