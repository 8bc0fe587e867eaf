//! Best-effort persistence of REPL input lines. History failures never
//! disturb the session; callers ignore the results.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

const HISTORY_FILE: &str = ".litedb_history";

/// History file in the user's home directory, or `None` when no home
/// directory can be determined.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HISTORY_FILE))
}

/// Appends one input line to the history file.
pub fn append_history(line: &str, path: &PathBuf) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line.trim())?;
    writer.flush()?;
    Ok(())
}

/// Creates the history file when it does not exist yet.
pub fn ensure_history_file(path: &PathBuf) -> io::Result<()> {
    if !path.exists() {
        File::create(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_append_history() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        append_history("insert 1 a b", &path).unwrap();
        append_history("select", &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "insert 1 a b\nselect\n");
    }

    #[test]
    fn test_ensure_history_file_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        ensure_history_file(&path).unwrap();
        assert!(path.exists());
    }
}
