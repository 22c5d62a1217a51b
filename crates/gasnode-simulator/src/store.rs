//! File-backed line store.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use gasnode_core::{LineStore, StorageError};

/// Line store in a plain text file, one reading per line.
///
/// Appends write a whole line with a single call. Rewrites go to a sibling
/// temp file that is synced and renamed over the original, so a crash leaves
/// either the old or the new content.
pub struct FileLineStore {
    path: PathBuf,
}

impl FileLineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// True if the file is non-empty and its last byte is not a newline,
    /// i.e. the previous append was cut short.
    fn ends_torn(file: &mut File) -> io::Result<bool> {
        if file.metadata()?.len() == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0_u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }
}

fn storage_error(e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::StorageFull => StorageError::Full,
        io::ErrorKind::InvalidData => StorageError::Corrupt,
        _ => StorageError::io(&e.to_string()),
    }
}

impl LineStore for FileLineStore {
    fn append_line(&mut self, line: &str) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(storage_error)?;

        // Terminate a torn line so the new entry starts on its own line.
        let mut record = String::with_capacity(line.len() + 2);
        if Self::ends_torn(&mut file).map_err(storage_error)? {
            record.push('\n');
        }
        record.push_str(line);
        record.push('\n');

        file.write_all(record.as_bytes()).map_err(storage_error)?;
        file.sync_data().map_err(storage_error)
    }

    fn read_lines(&mut self) -> Result<Vec<String>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(e)),
        };

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    fn rewrite(&mut self, lines: &[String]) -> Result<(), StorageError> {
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp).map_err(storage_error)?;
            for line in lines {
                writeln!(file, "{}", line).map_err(storage_error)?;
            }
            file.sync_all().map_err(storage_error)?;
        }
        fs::rename(&temp, &self.path).map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A store in a fresh temp directory, removed on drop.
    struct TempStore {
        dir: PathBuf,
        store: FileLineStore,
    }

    impl TempStore {
        fn new() -> Self {
            static NEXT: AtomicU32 = AtomicU32::new(0);
            let dir = std::env::temp_dir().join(format!(
                "gasnode-store-{}-{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ));
            fs::create_dir_all(&dir).unwrap();
            let store = FileLineStore::new(dir.join("sensor_buffer.txt"));
            Self { dir, store }
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let mut temp = TempStore::new();
        assert!(temp.store.read_lines().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_read_back() {
        let mut temp = TempStore::new();
        temp.store.append_line("1000,2,60.61").unwrap();
        temp.store.append_line("1300,1.5,45.45").unwrap();

        assert_eq!(
            temp.store.read_lines().unwrap(),
            ["1000,2,60.61", "1300,1.5,45.45"]
        );
        assert_eq!(
            fs::read_to_string(temp.store.path()).unwrap(),
            "1000,2,60.61\n1300,1.5,45.45\n"
        );
    }

    #[test]
    fn test_append_after_torn_line_starts_new_line() {
        let mut temp = TempStore::new();
        fs::write(temp.store.path(), "1000,2,60.61\n1300,1.").unwrap();

        temp.store.append_line("1600,1,30.3").unwrap();

        assert_eq!(
            temp.store.read_lines().unwrap(),
            ["1000,2,60.61", "1300,1.", "1600,1,30.3"]
        );
    }

    #[test]
    fn test_rewrite_replaces_and_clear_empties() {
        let mut temp = TempStore::new();
        for line in ["1,1,1", "2,2,2", "3,3,3"] {
            temp.store.append_line(line).unwrap();
        }

        temp.store
            .rewrite(&["2,2,2".to_string(), "3,3,3".to_string()])
            .unwrap();
        assert_eq!(temp.store.read_lines().unwrap(), ["2,2,2", "3,3,3"]);
        assert!(!temp.store.temp_path().exists());

        temp.store.clear().unwrap();
        assert!(temp.store.read_lines().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let mut temp = TempStore::new();
        fs::write(temp.store.path(), [0xff, 0xfe, b'\n']).unwrap();

        assert_eq!(temp.store.read_lines(), Err(StorageError::Corrupt));
    }
}
