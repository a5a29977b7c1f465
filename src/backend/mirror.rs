use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::LOCAL_DRAFT_PREFIX;
use crate::models::{DraftId, LocalDraft};

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Mirror I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mirror serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk copies of drafts, one JSON file per draft.
///
/// Files are named `mear-form-draft-<id>.json` when a draft id is known,
/// `mear-form-draft-hn-<hospitalNo>.json` when only the hospital number is,
/// and `mear-form-draft.json` otherwise.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    dir: PathBuf,
}

impl LocalMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a draft, preferring the draft id over the hospital number.
    pub fn file_name(draft_id: Option<&DraftId>, hospital_no: Option<&str>) -> String {
        let hospital_no = hospital_no.map(str::trim).filter(|s| !s.is_empty());
        match (draft_id, hospital_no) {
            (Some(id), _) => format!("{LOCAL_DRAFT_PREFIX}-{}.json", sanitize(id.as_str())),
            (None, Some(no)) => format!("{LOCAL_DRAFT_PREFIX}-hn-{}.json", sanitize(no)),
            (None, None) => format!("{LOCAL_DRAFT_PREFIX}.json"),
        }
    }

    pub fn path_for(&self, draft_id: Option<&DraftId>, hospital_no: Option<&str>) -> PathBuf {
        self.dir.join(Self::file_name(draft_id, hospital_no))
    }

    /// Write the entry under its own key. Replaces any previous copy.
    pub fn write(&self, entry: &LocalDraft) -> Result<PathBuf, MirrorError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.draft_id.as_ref(), entry.hospital_no.as_deref());
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entry)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), "Draft mirrored locally");
        Ok(path)
    }

    pub fn read(
        &self,
        draft_id: Option<&DraftId>,
        hospital_no: Option<&str>,
    ) -> Result<Option<LocalDraft>, MirrorError> {
        let path = self.path_for(draft_id, hospital_no);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Most recent entry by its recorded timestamp. Unreadable files are skipped.
    pub fn latest(&self) -> Result<Option<LocalDraft>, MirrorError> {
        self.newest_where(|_| true)
    }

    /// Most recent entry recorded for `hospital_no`, under any key.
    pub fn latest_for_hospital(&self, hospital_no: &str) -> Result<Option<LocalDraft>, MirrorError> {
        let wanted = hospital_no.trim();
        if wanted.is_empty() {
            return Ok(None);
        }
        self.newest_where(|draft| draft.hospital_no.as_deref().map(str::trim) == Some(wanted))
    }

    fn newest_where(&self, keep: impl Fn(&LocalDraft) -> bool) -> Result<Option<LocalDraft>, MirrorError> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let mut newest: Option<LocalDraft> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_mirror_file(&path) {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(MirrorError::from)
                .and_then(|bytes| serde_json::from_slice::<LocalDraft>(&bytes).map_err(MirrorError::from));
            match parsed {
                Ok(draft) if keep(&draft) => {
                    if newest.as_ref().map_or(true, |n| draft.timestamp > n.timestamp) {
                        newest = Some(draft);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable draft mirror");
                }
            }
        }
        Ok(newest)
    }

    /// Remove a mirrored draft. Returns whether a file was deleted.
    pub fn remove(
        &self,
        draft_id: Option<&DraftId>,
        hospital_no: Option<&str>,
    ) -> Result<bool, MirrorError> {
        let path = self.path_for(draft_id, hospital_no);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_mirror_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOCAL_DRAFT_PREFIX))
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
