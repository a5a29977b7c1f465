//! Form state store.
//!
//! `FormStore` owns the in-progress snapshot and everything derived from
//! it. Mutations recompute calculated values, alerts and protocols before
//! returning. Timers, alert expiry and draft saves run as tokio tasks the
//! store tracks and aborts; none of them hold the state lock across an
//! `.await`.

mod persistence;
mod state;
mod timer;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{LocalMirror, RegistryBackend};
use crate::clinical::{build_guidance, summarize_severity, CalculatedValues, ClinicalGuidance};
use crate::config::{self, AppConfig};
use crate::models::enums::{MonitoringInterval, Phase};
use crate::models::{ClinicalAlert, DraftId, FormSnapshot, ProtocolActivation, SeveritySummary};
use crate::report::ReportPayload;
use crate::validation::ValidationErrors;

use state::FormState;
pub use state::{StoreStatus, TimerState};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Invalid value at {path}: {reason}")]
    InvalidField { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════
// Outcomes and events
// ═══════════════════════════════════════════════════════════

/// Result of one `save_draft` pass. Saves never fail outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub draft_id: Option<DraftId>,
    /// The registry accepted the create or update.
    pub remote: bool,
    /// The local mirror was written.
    pub mirrored: bool,
}

/// Where `load_draft` found its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum LoadOutcome {
    Registry { draft_id: DraftId },
    Mirror { draft_id: Option<DraftId> },
    NotFound,
}

/// Final case submission result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SubmitOutcome {
    Succeeded { case_id: DraftId },
    /// Case stored, but the working draft could not be removed.
    SavedDraftNotCleared { case_id: DraftId, reason: String },
    Failed { reason: String },
    Invalid { errors: ValidationErrors },
}

impl SubmitOutcome {
    pub fn case_id(&self) -> Option<&DraftId> {
        match self {
            Self::Succeeded { case_id } | Self::SavedDraftNotCleared { case_id, .. } => Some(case_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    DataChanged { revision: u64 },
    AlertsSurfaced(Vec<String>),
    AlertsChanged,
    PhaseChanged(Phase),
    PhaseCompleted(Phase),
    TimerStarted,
    TimerStopped,
    ReminderDue(MonitoringInterval),
    IntervalCompleted(MonitoringInterval),
    DraftCreated(DraftId),
    DraftSaved(SaveOutcome),
    DraftLoaded(LoadOutcome),
    Cleared,
    Submitted(SubmitOutcome),
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Draft identifiers a reload can resume from, like a `?draftId=` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub draft_id: Option<DraftId>,
    pub hospital_no: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Background tasks
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
struct Tasks {
    reminders: HashMap<MonitoringInterval, JoinHandle<()>>,
    dismissals: HashMap<String, JoinHandle<()>>,
    save: Option<(u64, JoinHandle<()>)>,
    save_generation: u64,
    autosave: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_reminders(&mut self) {
        for (_, handle) in self.reminders.drain() {
            handle.abort();
        }
    }

    fn abort_pending_save(&mut self) {
        if let Some((_, handle)) = self.save.take() {
            handle.abort();
        }
    }

    /// Everything except the autosave loop.
    fn abort_form_tasks(&mut self) {
        self.abort_reminders();
        for (_, handle) in self.dismissals.drain() {
            handle.abort();
        }
        self.abort_pending_save();
    }
}

impl Drop for Tasks {
    fn drop(&mut self) {
        self.abort_form_tasks();
        if let Some(handle) = self.autosave.take() {
            handle.abort();
        }
    }
}

/// Spawn on the ambient runtime. Returns `None` outside one.
fn spawn<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            tracing::debug!("No tokio runtime, background task skipped");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════
// FormStore
// ═══════════════════════════════════════════════════════════

struct Inner<B> {
    state: RwLock<FormState>,
    backend: Arc<B>,
    mirror: LocalMirror,
    navigation: RwLock<NavigationState>,
    listeners: RwLock<HashMap<SubscriptionId, Listener>>,
    tasks: Mutex<Tasks>,
}

/// Cheaply cloneable handle to one form session.
pub struct FormStore<B: RegistryBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: RegistryBackend> Clone for FormStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: RegistryBackend> FormStore<B> {
    pub fn new(backend: Arc<B>, mirror: LocalMirror) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(FormState::default()),
                backend,
                mirror,
                navigation: RwLock::new(NavigationState::default()),
                listeners: RwLock::new(HashMap::new()),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    /// Store mirroring drafts under the configured drafts directory.
    pub fn from_config(backend: Arc<B>, config: &AppConfig) -> Self {
        Self::new(backend, LocalMirror::new(&config.drafts_dir))
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.inner.mirror
    }

    // ── Lock helpers ────────────────────────────────────────

    fn read(&self) -> Result<RwLockReadGuard<'_, FormState>, StoreError> {
        self.inner.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, FormState>, StoreError> {
        self.inner.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn tasks(&self) -> Result<MutexGuard<'_, Tasks>, StoreError> {
        self.inner.tasks.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn downgrade(&self) -> Weak<Inner<B>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<B>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ── Subscriptions ───────────────────────────────────────

    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriptionId, StoreError>
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.inner
            .listeners
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(id, Arc::new(listener));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .listeners
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(&id)
            .is_some())
    }

    /// Listeners run after the state lock is released.
    fn emit(&self, event: StoreEvent) {
        let listeners: Vec<Listener> = match self.inner.listeners.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => {
                tracing::error!("Listener registry poisoned, event dropped");
                return;
            }
        };
        for listener in listeners {
            listener(&event);
        }
    }

    // ── Reads ───────────────────────────────────────────────

    pub fn snapshot(&self) -> Result<FormSnapshot, StoreError> {
        Ok(self.read()?.data.clone())
    }

    pub fn calculated_values(&self) -> Result<CalculatedValues, StoreError> {
        Ok(self.read()?.calculated.clone())
    }

    pub fn alerts(&self) -> Result<Vec<ClinicalAlert>, StoreError> {
        Ok(self.read()?.alerts.clone())
    }

    pub fn protocols(&self) -> Result<Vec<ProtocolActivation>, StoreError> {
        Ok(self.read()?.protocols.clone())
    }

    pub fn severity(&self) -> Result<SeveritySummary, StoreError> {
        Ok(summarize_severity(&self.read()?.alerts))
    }

    pub fn current_phase(&self) -> Result<Phase, StoreError> {
        Ok(self.read()?.navigator.current())
    }

    pub fn completed_phases(&self) -> Result<Vec<Phase>, StoreError> {
        Ok(self.read()?.navigator.completed().collect())
    }

    pub fn progress_percent(&self) -> Result<u8, StoreError> {
        Ok(self.read()?.navigator.progress_percent())
    }

    pub fn timer(&self) -> Result<TimerState, StoreError> {
        Ok(self.read()?.timer.clone())
    }

    pub fn draft_id(&self) -> Result<Option<DraftId>, StoreError> {
        Ok(self.read()?.draft_id.clone())
    }

    pub fn hospital_no(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.hospital_no.clone())
    }

    /// Unsaved changes since the last successful save or load.
    pub fn is_dirty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.dirty)
    }

    pub fn status(&self) -> Result<StoreStatus, StoreError> {
        Ok(self.read()?.status)
    }

    pub fn guidance(&self) -> Result<ClinicalGuidance, StoreError> {
        Ok(build_guidance(&self.read()?.data))
    }

    pub fn report_payload(&self) -> Result<ReportPayload, StoreError> {
        let state = self.read()?;
        Ok(ReportPayload::new(
            &state.data,
            state.calculated.clone(),
            state.alerts.clone(),
            Utc::now(),
        ))
    }

    // ── Navigation state ────────────────────────────────────

    pub fn navigation(&self) -> Result<NavigationState, StoreError> {
        Ok(self
            .inner
            .navigation
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    /// Record the draft a reload should resume.
    pub fn set_navigation(&self, navigation: NavigationState) -> Result<(), StoreError> {
        *self
            .inner
            .navigation
            .write()
            .map_err(|_| StoreError::LockPoisoned)? = navigation;
        Ok(())
    }

    // ── Mutation ────────────────────────────────────────────

    /// Deep-merge a partial form. Returns alerts surfaced by this change.
    pub fn set_data(&self, patch: Value) -> Result<Vec<ClinicalAlert>, StoreError> {
        let (surfaced, revision) = {
            let mut state = self.write()?;
            let surfaced = state.merge(patch, Utc::now())?;
            (surfaced, state.revision)
        };
        self.after_mutation(surfaced.clone(), revision);
        Ok(surfaced)
    }

    /// Assign one field by dotted path, e.g. `preInductionVitals.heartRate`.
    pub fn update_field(&self, path: &str, value: Value) -> Result<Vec<ClinicalAlert>, StoreError> {
        let (surfaced, revision) = {
            let mut state = self.write()?;
            let surfaced = state.assign(path, value, Utc::now())?;
            (surfaced, state.revision)
        };
        tracing::trace!(path, revision, "Field updated");
        self.after_mutation(surfaced.clone(), revision);
        Ok(surfaced)
    }

    fn after_mutation(&self, surfaced: Vec<ClinicalAlert>, revision: u64) {
        for alert in &surfaced {
            if alert.is_critical() || alert.is_monitoring() {
                // Escalated from an expiring level.
                self.cancel_dismiss(&alert.id);
            } else {
                self.schedule_dismiss(&alert.id);
            }
        }
        self.emit(StoreEvent::DataChanged { revision });
        if !surfaced.is_empty() {
            tracing::debug!(count = surfaced.len(), "New clinical alerts");
            self.emit(StoreEvent::AlertsSurfaced(
                surfaced.into_iter().map(|a| a.id).collect(),
            ));
        }
        self.schedule_save();
    }

    /// Move to `phase`. Entering monitoring starts the timer if idle.
    pub fn set_current_phase(&self, phase: Phase) -> Result<(), StoreError> {
        let (purged, start_timer) = {
            let mut state = self.write()?;
            let purged = state.change_phase(phase);
            (purged, phase == Phase::Monitoring && !state.timer.active)
        };
        tracing::debug!(phase = %phase, purged, "Phase changed");

        self.emit(StoreEvent::PhaseChanged(phase));
        if purged > 0 {
            self.emit(StoreEvent::AlertsChanged);
        }
        if start_timer {
            self.start_timer()?;
        }
        Ok(())
    }

    pub fn mark_phase_complete(&self, phase: Phase) -> Result<bool, StoreError> {
        let newly = self.write()?.navigator.mark_complete(phase);
        if newly {
            self.emit(StoreEvent::PhaseCompleted(phase));
        }
        Ok(newly)
    }

    // ── Alerts ──────────────────────────────────────────────

    /// Insert or refresh an alert by id. Non-critical alerts expire after
    /// `ALERT_AUTO_DISMISS`; monitoring reminders stay until completed.
    pub fn add_alert(&self, alert: ClinicalAlert) -> Result<(), StoreError> {
        let id = alert.id.clone();
        let expires = !alert.is_critical() && !alert.is_monitoring();
        self.write()?.upsert_alert(alert, Utc::now());
        if expires {
            self.schedule_dismiss(&id);
        }
        self.emit(StoreEvent::AlertsChanged);
        Ok(())
    }

    pub fn dismiss_alert(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.write()?.dismiss_alert(id);
        self.cancel_dismiss(id);
        if removed {
            self.emit(StoreEvent::AlertsChanged);
        }
        Ok(removed)
    }

    pub fn clear_all_alerts(&self) -> Result<(), StoreError> {
        self.write()?.alerts.clear();
        if let Ok(mut tasks) = self.tasks() {
            for (_, handle) in tasks.dismissals.drain() {
                handle.abort();
            }
        }
        self.emit(StoreEvent::AlertsChanged);
        Ok(())
    }

    /// Drop non-critical alerts older than `STALE_ALERT_WINDOW`.
    pub fn clear_stale_alerts(&self) -> Result<usize, StoreError> {
        let removed = self.write()?.clear_stale_alerts(Utc::now());
        if removed > 0 {
            self.emit(StoreEvent::AlertsChanged);
        }
        Ok(removed)
    }

    fn cancel_dismiss(&self, id: &str) {
        if let Ok(mut tasks) = self.tasks() {
            if let Some(handle) = tasks.dismissals.remove(id) {
                handle.abort();
            }
        }
    }

    fn schedule_dismiss(&self, id: &str) {
        let weak = self.downgrade();
        let alert_id = id.to_string();
        let handle = spawn(async move {
            tokio::time::sleep(config::ALERT_AUTO_DISMISS).await;
            if let Some(store) = Self::upgrade(&weak) {
                if let Ok(mut tasks) = store.tasks() {
                    tasks.dismissals.remove(&alert_id);
                }
                if let Err(e) = store.dismiss_alert(&alert_id) {
                    tracing::warn!(alert = %alert_id, error = %e, "Auto-dismiss failed");
                }
            }
        });

        if let (Some(handle), Ok(mut tasks)) = (handle, self.tasks()) {
            if let Some(previous) = tasks.dismissals.insert(id.to_string(), handle) {
                previous.abort();
            }
        }
    }
}
