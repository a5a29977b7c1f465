//! Registry backend: remote draft and case persistence plus the on-disk
//! draft mirror used when the registry cannot be reached.

pub mod http;
pub mod memory;
pub mod mirror;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::Phase;
use crate::models::{Draft, DraftId, FormSnapshot};

pub use http::HttpBackend;
pub use memory::InMemoryBackend;
pub use mirror::{LocalMirror, MirrorError};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Cannot reach registry at {0}")]
    Connection(String),

    #[error("Registry request timed out after {0}s")]
    Timeout(u64),

    #[error("Registry rejected credentials")]
    Unauthorized,

    #[error("Registry returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Cannot parse registry response: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// How a draft is addressed on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftKey {
    Id(DraftId),
    HospitalNo(String),
}

impl DraftKey {
    /// Query parameter pair for `GET`/`DELETE /api/draft`.
    pub fn query(&self) -> (&'static str, &str) {
        match self {
            Self::Id(id) => ("draftId", id.as_str()),
            Self::HospitalNo(no) => ("hospitalNo", no.as_str()),
        }
    }
}

impl std::fmt::Display for DraftKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, value) = self.query();
        write!(f, "{name}={value}")
    }
}

/// Body of `POST /api/draft`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDraft<'a> {
    pub form: &'a FormSnapshot,
    pub current_phase: Phase,
}

/// Body of `PUT /api/draft`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    pub form: FormSnapshot,
    pub current_phase: Phase,
    pub hospital_no: Option<String>,
    pub draft_id: Option<DraftId>,
}

/// Reply to draft create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRef {
    pub id: DraftId,
    #[serde(default)]
    pub hospital_no: Option<String>,
}

/// Reply to `POST /api/mear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRef {
    pub id: DraftId,
}

/// A completed case as returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: DraftId,
    #[serde(default)]
    pub form: FormSnapshot,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Persistence operations the form store needs from the registry.
///
/// Implementations must tolerate out-of-order writes to the same draft;
/// the last write wins.
pub trait RegistryBackend: Send + Sync + 'static {
    fn create_draft(
        &self,
        form: &FormSnapshot,
        phase: Phase,
    ) -> impl Future<Output = Result<DraftRef, BackendError>> + Send;

    fn update_draft(
        &self,
        update: &DraftUpdate,
    ) -> impl Future<Output = Result<DraftRef, BackendError>> + Send;

    /// `Ok(None)` when the registry has no such draft.
    fn fetch_draft(
        &self,
        key: &DraftKey,
    ) -> impl Future<Output = Result<Option<Draft>, BackendError>> + Send;

    fn delete_draft(&self, key: &DraftKey) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn list_drafts(&self) -> impl Future<Output = Result<Vec<Draft>, BackendError>> + Send;

    fn submit_case(
        &self,
        form: &FormSnapshot,
    ) -> impl Future<Output = Result<CaseRef, BackendError>> + Send;

    /// `Ok(None)` when the registry has no such case.
    fn fetch_case(
        &self,
        id: &DraftId,
    ) -> impl Future<Output = Result<Option<CaseRecord>, BackendError>> + Send;

    fn list_cases(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CaseRecord>, BackendError>> + Send;
}
