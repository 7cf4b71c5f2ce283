//! File-based logic definition storage.

use std::io::Write;
use std::path::PathBuf;

use super::sanitize_name;
use crate::domain::IdentifierLogic;
use crate::error::StorageResult;

/// Logic definitions stored as `logics/{slug}.json`.
pub struct FileLogicStore {
    /// Directory for logic files.
    logics_dir: PathBuf,
}

impl FileLogicStore {
    /// Create a new file logic store.
    #[must_use]
    pub const fn new(logics_dir: PathBuf) -> Self {
        Self { logics_dir }
    }

    /// Get the file path for a logic.
    fn logic_path(&self, slug: &str) -> PathBuf {
        self.logics_dir
            .join(format!("{}.json", sanitize_name(slug)))
    }

    /// Write a logic definition, replacing any previous one.
    ///
    /// The new content is written to a temporary file and renamed into place, so
    /// readers see either the old or the new definition.
    pub fn save(&self, logic: &IdentifierLogic) -> StorageResult<()> {
        std::fs::create_dir_all(&self.logics_dir)?;

        let path = self.logic_path(&logic.slug);
        let tmp_path = path.with_extension("json.tmp");

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        serde_json::to_writer_pretty(&file, logic)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    /// Load a logic definition, including soft-deleted ones.
    ///
    /// File names are sanitized, so `a.b` and `a_b` share a file; only the exact slug
    /// recorded inside it matches.
    pub fn load(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        let path = self.logic_path(slug);

        if !path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(&path)?;
        let logic: IdentifierLogic = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Some(logic).filter(|logic| logic.slug == slug))
    }

    /// Load a logic definition unless it is soft-deleted.
    pub fn get(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        Ok(self.load(slug)?.filter(|logic| logic.deleted_at.is_none()))
    }

    /// List all non-deleted logic definitions, sorted by slug.
    pub fn list(&self) -> StorageResult<Vec<IdentifierLogic>> {
        if !self.logics_dir.exists() {
            return Ok(Vec::new());
        }

        let mut logics = Vec::new();

        for entry in std::fs::read_dir(&self.logics_dir)? {
            let path = entry?.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let file = std::fs::File::open(&path)?;

            match serde_json::from_reader::<_, IdentifierLogic>(std::io::BufReader::new(file)) {
                Ok(logic) if logic.deleted_at.is_none() => logics.push(logic),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Failed to parse logic file");
                }
            }
        }

        logics.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(logics)
    }
}
