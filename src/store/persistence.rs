//! Draft persistence and final submission. Every path here degrades
//! instead of failing: registry errors fall back to the local mirror and
//! are logged.

use chrono::Utc;

use crate::backend::{DraftKey, DraftUpdate, RegistryBackend};
use crate::config;
use crate::models::enums::Phase;
use crate::models::{DraftId, FormSnapshot, LocalDraft};
use crate::validation::validate_submission;

use super::{
    spawn, FormStore, LoadOutcome, NavigationState, SaveOutcome, StoreError, StoreEvent,
    StoreStatus, SubmitOutcome,
};

/// Copy of what a save sends, taken under the lock.
struct SaveParts {
    form: FormSnapshot,
    phase: Phase,
    draft_id: Option<DraftId>,
    hospital_no: Option<String>,
    revision: u64,
    session: u64,
}

impl<B: RegistryBackend> FormStore<B> {
    fn save_parts(&self) -> Result<SaveParts, StoreError> {
        let state = self.read()?;
        Ok(SaveParts {
            form: state.data.clone(),
            phase: state.navigator.current(),
            draft_id: state.draft_id.clone(),
            hospital_no: state.hospital_no.clone(),
            revision: state.revision,
            session: state.session,
        })
    }

    fn set_status(&self, status: StoreStatus) {
        match self.write() {
            Ok(mut state) => state.status = status,
            Err(e) => tracing::error!(error = %e, "Cannot update store status"),
        }
    }

    fn reflect_navigation(&self, draft_id: Option<DraftId>, hospital_no: Option<String>) {
        if let Err(e) = self.set_navigation(NavigationState {
            draft_id,
            hospital_no,
        }) {
            tracing::warn!(error = %e, "Navigation state not updated");
        }
    }

    // ── Create / save ───────────────────────────────────────

    /// Create a registry draft from the current snapshot. The new id is
    /// stored and reflected into navigation state. `None` on failure.
    pub async fn create_draft(&self) -> Option<DraftId> {
        let parts = match self.save_parts() {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read form for draft creation");
                return None;
            }
        };

        let created = match self.inner.backend.create_draft(&parts.form, parts.phase).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, "Draft creation failed");
                return None;
            }
        };

        let hospital_no = {
            let Ok(mut state) = self.write() else {
                tracing::error!("Store lock poisoned after draft creation");
                return None;
            };
            if state.session != parts.session {
                tracing::debug!(draft_id = %created.id, "Form replaced while creating draft");
                return None;
            }
            state.draft_id = Some(created.id.clone());
            if state.hospital_no.is_none() {
                state.hospital_no = created.hospital_no.clone();
            }
            state.hospital_no.clone()
        };

        self.reflect_navigation(Some(created.id.clone()), hospital_no);
        tracing::info!(draft_id = %created.id, "Draft created");
        self.emit(StoreEvent::DraftCreated(created.id.clone()));
        Some(created.id)
    }

    /// Push the snapshot to the registry and write the local mirror.
    /// Creates the draft first when none exists.
    pub async fn save_draft(&self) -> SaveOutcome {
        let parts = match self.save_parts() {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read form for save");
                return SaveOutcome {
                    draft_id: None,
                    remote: false,
                    mirrored: false,
                };
            }
        };
        self.set_status(StoreStatus::Saving);

        let (draft_id, remote) = match parts.draft_id.clone() {
            None => match self.create_draft().await {
                Some(id) => (Some(id), true),
                None => (None, false),
            },
            Some(id) => {
                let update = DraftUpdate {
                    form: parts.form.clone(),
                    current_phase: parts.phase,
                    hospital_no: parts.hospital_no.clone(),
                    draft_id: Some(id.clone()),
                };
                match self.inner.backend.update_draft(&update).await {
                    Ok(saved) => (Some(saved.id), true),
                    Err(e) => {
                        tracing::warn!(draft_id = %id, error = %e, "Draft update failed, keeping local copy");
                        (Some(id), false)
                    }
                }
            }
        };

        let same_session = self
            .read()
            .map(|state| state.session == parts.session)
            .unwrap_or(false);
        let mirrored = same_session && self.write_mirror(&parts, draft_id.clone());

        if let Ok(mut state) = self.write() {
            if state.session == parts.session {
                if remote {
                    if let Some(id) = &draft_id {
                        state.draft_id = Some(id.clone());
                    }
                    if state.revision == parts.revision {
                        state.dirty = false;
                    }
                }
                state.status = StoreStatus::Ready;
            }
        }

        let outcome = SaveOutcome {
            draft_id,
            remote,
            mirrored,
        };
        tracing::debug!(remote, mirrored, "Draft save finished");
        self.emit(StoreEvent::DraftSaved(outcome.clone()));
        outcome
    }

    fn write_mirror(&self, parts: &SaveParts, draft_id: Option<DraftId>) -> bool {
        let entry = LocalDraft {
            data: parts.form.clone(),
            current_phase: parts.phase,
            timestamp: Utc::now(),
            draft_id,
            hospital_no: parts.hospital_no.clone(),
        };
        if let Err(e) = self.inner.mirror.write(&entry) {
            tracing::warn!(error = %e, "Local draft mirror not written");
            return false;
        }

        // The id-keyed copy supersedes one saved before the draft existed.
        if let (Some(_), Some(no)) = (&entry.draft_id, entry.hospital_no.as_deref()) {
            if let Err(e) = self.inner.mirror.remove(None, Some(no)) {
                tracing::warn!(hospital_no = %no, error = %e, "Superseded draft mirror not removed");
            }
        }
        true
    }

    /// Save after `SAVE_DEBOUNCE` of quiet. Each call restarts the wait.
    pub fn schedule_save(&self) {
        let Ok(mut tasks) = self.tasks() else {
            tracing::error!("Task registry poisoned, save not scheduled");
            return;
        };
        tasks.abort_pending_save();
        tasks.save_generation += 1;
        let generation = tasks.save_generation;

        let weak = self.downgrade();
        let handle = spawn(async move {
            tokio::time::sleep(config::SAVE_DEBOUNCE).await;
            let Some(store) = Self::upgrade(&weak) else {
                return;
            };
            store.release_save_slot(generation);
            store.save_draft().await;
        });
        if let Some(handle) = handle {
            tasks.save = Some((generation, handle));
        }
    }

    /// Past the debounce a save must not be aborted by a newer edit.
    fn release_save_slot(&self, generation: u64) {
        if let Ok(mut tasks) = self.tasks() {
            if tasks.save.as_ref().is_some_and(|(g, _)| *g == generation) {
                tasks.save = None;
            }
        }
    }

    /// Save every `FALLBACK_SAVE_INTERVAL` while there are unsaved changes.
    pub fn start_autosave(&self) -> Result<(), StoreError> {
        let weak = self.downgrade();
        let handle = spawn(async move {
            let mut ticker = tokio::time::interval(config::FALLBACK_SAVE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = Self::upgrade(&weak) else {
                    break;
                };
                if store.is_dirty().unwrap_or(false) {
                    tracing::debug!("Fallback save");
                    store.save_draft().await;
                }
            }
        });

        let mut tasks = self.tasks()?;
        if let Some(previous) = tasks.autosave.take() {
            previous.abort();
        }
        tasks.autosave = handle;
        Ok(())
    }

    pub fn stop_autosave(&self) -> Result<(), StoreError> {
        if let Some(handle) = self.tasks()?.autosave.take() {
            handle.abort();
        }
        Ok(())
    }

    // ── Load ────────────────────────────────────────────────

    /// Resume a draft. Keys resolve from the arguments, then the store,
    /// then navigation state, then the newest local mirror entry. The
    /// registry is tried first and the mirror is the fallback.
    pub async fn load_draft(&self, draft_id: Option<DraftId>, hospital_no: Option<String>) -> LoadOutcome {
        let (mut draft_id, mut hospital_no) = self.resolve_load_key(draft_id, hospital_no);
        self.set_status(StoreStatus::Loading);

        let mut latest = None;
        if draft_id.is_none() && hospital_no.is_none() {
            match self.inner.mirror.latest() {
                Ok(Some(entry)) => {
                    draft_id = entry.draft_id.clone();
                    hospital_no = entry.hospital_no.clone();
                    latest = Some(entry);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Local draft mirror unreadable"),
            }
        }

        let key = match (&draft_id, &hospital_no) {
            (Some(id), _) => Some(DraftKey::Id(id.clone())),
            (None, Some(no)) => Some(DraftKey::HospitalNo(no.clone())),
            (None, None) => None,
        };

        if let Some(key) = &key {
            match self.inner.backend.fetch_draft(key).await {
                Ok(Some(draft)) => {
                    let id = draft.id.clone();
                    let hospital_no = draft.hospital_no.clone().or(hospital_no);
                    self.apply_loaded(draft.form, draft.current_phase, Some(id.clone()), hospital_no);
                    tracing::info!(draft_id = %id, "Draft loaded from registry");
                    return self.finish_load(LoadOutcome::Registry { draft_id: id });
                }
                Ok(None) => tracing::debug!(key = %key, "No registry draft"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Registry load failed, trying local mirror"),
            }
        }

        let local = self
            .read_mirror(draft_id.as_ref(), hospital_no.as_deref())
            .or(latest);
        if let Some(entry) = local {
            let id = entry.draft_id.clone().or(draft_id);
            let hospital_no = entry.hospital_no.clone().or(hospital_no);
            self.apply_loaded(entry.data, entry.current_phase, id.clone(), hospital_no);
            tracing::info!(draft_id = ?id, "Draft restored from local mirror");
            return self.finish_load(LoadOutcome::Mirror { draft_id: id });
        }

        tracing::debug!("No draft to load");
        if let Ok(mut state) = self.write() {
            state.clear_stale_alerts(Utc::now());
            state.status = StoreStatus::Ready;
        }
        self.finish_load(LoadOutcome::NotFound)
    }

    fn resolve_load_key(
        &self,
        draft_id: Option<DraftId>,
        hospital_no: Option<String>,
    ) -> (Option<DraftId>, Option<String>) {
        if draft_id.is_some() || hospital_no.is_some() {
            return (draft_id, hospital_no);
        }
        if let Ok(state) = self.read() {
            if state.draft_id.is_some() || state.hospital_no.is_some() {
                return (state.draft_id.clone(), state.hospital_no.clone());
            }
        }
        match self.navigation() {
            Ok(nav) => (nav.draft_id, nav.hospital_no),
            Err(_) => (None, None),
        }
    }

    fn read_mirror(&self, draft_id: Option<&DraftId>, hospital_no: Option<&str>) -> Option<LocalDraft> {
        if draft_id.is_none() && hospital_no.is_none() {
            return None;
        }
        let by_id = match draft_id {
            Some(id) => self.inner.mirror.read(Some(id), hospital_no),
            None => Ok(None),
        };
        let found = match (by_id, hospital_no) {
            (Ok(Some(entry)), _) => Ok(Some(entry)),
            (Ok(None), Some(no)) => self.inner.mirror.latest_for_hospital(no),
            (other, _) => other,
        };
        found.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Local draft mirror unreadable");
            None
        })
    }

    fn apply_loaded(
        &self,
        form: FormSnapshot,
        phase: Phase,
        draft_id: Option<DraftId>,
        hospital_no: Option<String>,
    ) {
        if let Ok(mut tasks) = self.tasks() {
            tasks.abort_pending_save();
            for (_, handle) in tasks.dismissals.drain() {
                handle.abort();
            }
        }

        let resolved = match self.write() {
            Ok(mut state) => {
                state.load(form, phase, draft_id, hospital_no);
                state.status = StoreStatus::Ready;
                (state.draft_id.clone(), state.hospital_no.clone())
            }
            Err(e) => {
                tracing::error!(error = %e, "Loaded draft not applied");
                return;
            }
        };
        self.reflect_navigation(resolved.0, resolved.1);
    }

    fn finish_load(&self, outcome: LoadOutcome) -> LoadOutcome {
        self.emit(StoreEvent::DraftLoaded(outcome.clone()));
        outcome
    }

    // ── Clear / submit ──────────────────────────────────────

    /// Remove the local mirror and reset every piece of form state.
    pub fn clear_form(&self) -> Result<(), StoreError> {
        let (draft_id, hospital_no) = {
            let state = self.read()?;
            (state.draft_id.clone(), state.hospital_no.clone())
        };
        self.remove_mirrors(draft_id.as_ref(), hospital_no.as_deref());

        self.tasks()?.abort_form_tasks();
        self.write()?.reset();
        self.set_navigation(NavigationState::default())?;

        tracing::info!(draft_id = ?draft_id, "Form cleared");
        self.emit(StoreEvent::Cleared);
        Ok(())
    }

    fn remove_mirrors(&self, draft_id: Option<&DraftId>, hospital_no: Option<&str>) {
        let keys = match (draft_id, hospital_no) {
            (Some(id), Some(no)) => vec![(Some(id), None), (None, Some(no))],
            (id, no) => vec![(id, no)],
        };
        for (id, no) in keys {
            if let Err(e) = self.inner.mirror.remove(id, no) {
                tracing::warn!(error = %e, "Local draft mirror not removed");
            }
        }
    }

    /// Validate, store the completed case and retire the working draft.
    /// The store is reset whenever the case itself was stored.
    pub async fn submit_case(&self) -> SubmitOutcome {
        let parts = match self.save_parts() {
            Ok(parts) => parts,
            Err(e) => {
                return self.finish_submit(SubmitOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        };

        if let Err(errors) = validate_submission(&parts.form) {
            tracing::info!(count = errors.len(), "Submission rejected by validation");
            return self.finish_submit(SubmitOutcome::Invalid { errors });
        }

        if let Ok(mut tasks) = self.tasks() {
            tasks.abort_pending_save();
        }

        let case_id = match self.inner.backend.submit_case(&parts.form).await {
            Ok(case) => case.id,
            Err(e) => {
                tracing::warn!(error = %e, "Case submission failed");
                self.schedule_save();
                return self.finish_submit(SubmitOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };
        tracing::info!(case_id = %case_id, "Case submitted");

        let outcome = match self
            .retire_draft(parts.draft_id.as_ref(), parts.hospital_no.as_deref())
            .await
        {
            Ok(()) => SubmitOutcome::Succeeded { case_id },
            Err(reason) => SubmitOutcome::SavedDraftNotCleared { case_id, reason },
        };

        if let Err(e) = self.clear_form() {
            tracing::error!(error = %e, "Store not reset after submission");
        }
        self.finish_submit(outcome)
    }

    /// Delete the registry draft by id, falling back to hospital number.
    async fn retire_draft(&self, draft_id: Option<&DraftId>, hospital_no: Option<&str>) -> Result<(), String> {
        let mut keys = Vec::new();
        if let Some(id) = draft_id {
            keys.push(DraftKey::Id(id.clone()));
        }
        if let Some(no) = hospital_no {
            keys.push(DraftKey::HospitalNo(no.to_string()));
        }
        if keys.is_empty() {
            return Ok(());
        }

        let mut last_error = String::new();
        for key in &keys {
            match self.inner.backend.delete_draft(key).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Draft not deleted after submission");
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }

    fn finish_submit(&self, outcome: SubmitOutcome) -> SubmitOutcome {
        self.emit(StoreEvent::Submitted(outcome.clone()));
        outcome
    }
}
