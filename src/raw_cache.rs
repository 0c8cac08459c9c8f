use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

pub const PLAYERS_FILE: &str = "all_players.json";
pub const LEAGUE_USERS_FILE: &str = "league_users.json";
pub const LEAGUE_ROSTERS_FILE: &str = "league_rosters.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Skipped,
    Written { bytes: usize },
}

/// Runs `produce` and stores its bytes at `path`, unless `path` already exists.
///
/// An existing file is trusted as-is. New content is written to a temp file
/// in the same directory and renamed into place.
pub fn ensure<F>(path: &Path, produce: F) -> Result<CacheOutcome>
where
    F: FnOnce() -> Result<Vec<u8>>,
{
    if path.exists() {
        return Ok(CacheOutcome::Skipped);
    }

    let content = produce()?;
    write_atomic(path, &content)?;
    Ok(CacheOutcome::Written {
        bytes: content.len(),
    })
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create cache dir {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(content)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("swap cache file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("raw").join("a.json");
        let outcome = ensure(&path, || Ok(b"[]".to_vec())).unwrap();
        assert_eq!(outcome, CacheOutcome::Written { bytes: 2 });
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }

    #[test]
    fn producer_error_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let result = ensure(&path, || Err(anyhow::anyhow!("boom")));
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
