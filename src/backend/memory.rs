use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::models::enums::Phase;
use crate::models::{Draft, DraftId, FormSnapshot};

use super::{BackendError, CaseRecord, CaseRef, DraftKey, DraftRef, DraftUpdate, RegistryBackend};

const MEMORY_URL: &str = "memory://registry";

#[derive(Default)]
struct Registry {
    next_id: u64,
    drafts: BTreeMap<DraftId, Draft>,
    cases: Vec<CaseRecord>,
}

impl Registry {
    fn allocate(&mut self) -> DraftId {
        self.next_id += 1;
        DraftId::new(self.next_id.to_string())
    }

    fn find_key(&self, key: &DraftKey) -> Option<DraftId> {
        match key {
            DraftKey::Id(id) => self.drafts.contains_key(id).then(|| id.clone()),
            DraftKey::HospitalNo(no) => self
                .drafts
                .values()
                .find(|d| d.hospital_no.as_deref() == Some(no.as_str()))
                .map(|d| d.id.clone()),
        }
    }
}

/// Process-local registry. Used by tests and offline sessions.
///
/// `set_offline(true)` makes every call fail with a connection error;
/// `set_failing_deletes(true)` fails draft deletion only.
#[derive(Default)]
pub struct InMemoryBackend {
    state: RwLock<Registry>,
    offline: AtomicBool,
    failing_deletes: AtomicBool,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only draft deletion fail, leaving other calls working.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    /// Draft create and update calls that reached the registry.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn draft_count(&self) -> usize {
        self.read().map(|s| s.drafts.len()).unwrap_or(0)
    }

    pub fn case_count(&self) -> usize {
        self.read().map(|s| s.cases.len()).unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Connection(MEMORY_URL.to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Client("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Client("registry lock poisoned".into()))
    }
}

impl RegistryBackend for InMemoryBackend {
    async fn create_draft(&self, form: &FormSnapshot, phase: Phase) -> Result<DraftRef, BackendError> {
        self.ensure_online()?;
        let mut state = self.write()?;
        let id = state.allocate();
        let hospital_no = form.hospital_no().map(str::to_string);
        state.drafts.insert(
            id.clone(),
            Draft {
                id: id.clone(),
                form: form.clone(),
                current_phase: phase,
                hospital_no: hospital_no.clone(),
                updated_at: Some(Utc::now()),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(DraftRef { id, hospital_no })
    }

    async fn update_draft(&self, update: &DraftUpdate) -> Result<DraftRef, BackendError> {
        self.ensure_online()?;
        let mut state = self.write()?;

        let existing = match (&update.draft_id, &update.hospital_no) {
            (Some(id), _) if state.drafts.contains_key(id) => Some(id.clone()),
            (_, Some(no)) => state.find_key(&DraftKey::HospitalNo(no.clone())),
            _ => None,
        };
        let id = match existing.or_else(|| update.draft_id.clone()) {
            Some(id) => id,
            None => state.allocate(),
        };

        state.drafts.insert(
            id.clone(),
            Draft {
                id: id.clone(),
                form: update.form.clone(),
                current_phase: update.current_phase,
                hospital_no: update.hospital_no.clone(),
                updated_at: Some(Utc::now()),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(DraftRef {
            id,
            hospital_no: update.hospital_no.clone(),
        })
    }

    async fn fetch_draft(&self, key: &DraftKey) -> Result<Option<Draft>, BackendError> {
        self.ensure_online()?;
        let state = self.read()?;
        Ok(state
            .find_key(key)
            .and_then(|id| state.drafts.get(&id).cloned()))
    }

    async fn delete_draft(&self, key: &DraftKey) -> Result<(), BackendError> {
        self.ensure_online()?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Http {
                status: 500,
                body: format!("cannot delete draft {key}"),
            });
        }
        let mut state = self.write()?;
        if let Some(id) = state.find_key(key) {
            state.drafts.remove(&id);
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_drafts(&self) -> Result<Vec<Draft>, BackendError> {
        self.ensure_online()?;
        Ok(self.read()?.drafts.values().cloned().collect())
    }

    async fn submit_case(&self, form: &FormSnapshot) -> Result<CaseRef, BackendError> {
        self.ensure_online()?;
        let mut state = self.write()?;
        let id = state.allocate();
        state.cases.push(CaseRecord {
            id: id.clone(),
            form: form.clone(),
            created_at: Some(Utc::now()),
        });
        Ok(CaseRef { id })
    }

    async fn fetch_case(&self, id: &DraftId) -> Result<Option<CaseRecord>, BackendError> {
        self.ensure_online()?;
        Ok(self.read()?.cases.iter().find(|c| &c.id == id).cloned())
    }

    async fn list_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, BackendError> {
        self.ensure_online()?;
        Ok(self.read()?.cases.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Demographics;

    fn form_with_hn(hn: &str) -> FormSnapshot {
        FormSnapshot {
            demographics: Some(Demographics {
                hospital_no: Some(hn.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_update_same_draft() {
        let backend = InMemoryBackend::new();
        let created = backend
            .create_draft(&form_with_hn("HN-1"), Phase::Demographics)
            .await
            .unwrap();
        assert_eq!(created.hospital_no.as_deref(), Some("HN-1"));

        let updated = backend
            .update_draft(&DraftUpdate {
                form: form_with_hn("HN-1"),
                current_phase: Phase::Vitals,
                hospital_no: Some("HN-1".into()),
                draft_id: Some(created.id.clone()),
            })
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(backend.draft_count(), 1);
        assert_eq!(backend.write_count(), 2);

        let fetched = backend
            .fetch_draft(&DraftKey::HospitalNo("HN-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.current_phase, Phase::Vitals);
    }

    #[tokio::test]
    async fn update_without_id_matches_hospital_number() {
        let backend = InMemoryBackend::new();
        let created = backend
            .create_draft(&form_with_hn("HN-2"), Phase::Demographics)
            .await
            .unwrap();
        let updated = backend
            .update_draft(&DraftUpdate {
                form: form_with_hn("HN-2"),
                current_phase: Phase::Leon,
                hospital_no: Some("HN-2".into()),
                draft_id: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.list_drafts().await,
            Err(BackendError::Connection(_))
        ));
        assert!(backend
            .submit_case(&FormSnapshot::default())
            .await
            .is_err());
        backend.set_offline(false);
        assert!(backend.list_drafts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cases_listed_newest_first() {
        let backend = InMemoryBackend::new();
        let first = backend.submit_case(&form_with_hn("A")).await.unwrap();
        let second = backend.submit_case(&form_with_hn("B")).await.unwrap();

        let listed = backend.list_cases(10).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(backend.list_cases(1).await.unwrap().len(), 1);

        let fetched = backend.fetch_case(&first.id).await.unwrap().unwrap();
        assert_eq!(fetched.form.hospital_no(), Some("A"));
    }

    #[tokio::test]
    async fn delete_by_hospital_number() {
        let backend = InMemoryBackend::new();
        backend
            .create_draft(&form_with_hn("HN-3"), Phase::Demographics)
            .await
            .unwrap();
        backend
            .delete_draft(&DraftKey::HospitalNo("HN-3".into()))
            .await
            .unwrap();
        assert_eq!(backend.draft_count(), 0);
        assert_eq!(backend.delete_count(), 1);
    }
}
