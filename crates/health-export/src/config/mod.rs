use crate::error::{HealthError, Result};
use std::path::{Path, PathBuf};

/// Default data directory name
const DATA_DIR_NAME: &str = "health-export";

/// Get the data directory path for the database
/// Returns ~/.local/share/health-export on Unix, ~/Library/Application Support/health-export on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|p| p.join(DATA_DIR_NAME))
        .ok_or_else(|| HealthError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_dir_exists() {
        let dir = data_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.ends_with("health-export"));
    }

    #[test]
    fn test_ensure_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b");
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
        // Second call is a no-op
        ensure_dir(&path).unwrap();
    }
}
