use chrono::Utc;
use tokio::time::Instant;

use crate::backend::RegistryBackend;
use crate::models::enums::MonitoringInterval;

use super::{spawn, FormStore, StoreError, StoreEvent};

impl<B: RegistryBackend> FormStore<B> {
    /// Start the post-intubation timer and arm one reminder per interval.
    /// Restarting re-arms every reminder from the new start instant.
    pub fn start_timer(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        self.write()?.timer.start(started);

        {
            let mut tasks = self.tasks()?;
            tasks.abort_reminders();
            for interval in MonitoringInterval::ALL {
                let weak = self.downgrade();
                let deadline = started + interval.offset();
                let handle = spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(store) = Self::upgrade(&weak) {
                        store.fire_reminder(interval);
                    }
                });
                if let Some(handle) = handle {
                    tasks.reminders.insert(interval, handle);
                }
            }
        }

        tracing::info!("Monitoring timer started");
        self.emit(StoreEvent::TimerStarted);
        Ok(())
    }

    /// Stop the timer and abort reminders that have not fired.
    pub fn stop_timer(&self) -> Result<(), StoreError> {
        self.write()?.timer.stop();
        self.tasks()?.abort_reminders();
        tracing::info!("Monitoring timer stopped");
        self.emit(StoreEvent::TimerStopped);
        Ok(())
    }

    /// Refresh elapsed seconds. Returns `None` while the timer is stopped.
    /// Callers tick this themselves, typically once per second.
    pub fn update_elapsed_time(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.write()?.timer.tick(Instant::now()))
    }

    pub fn complete_monitoring_interval(&self, interval: MonitoringInterval) -> Result<bool, StoreError> {
        let newly = self.write()?.complete_interval(interval);
        if let Some(handle) = self.tasks()?.reminders.remove(&interval) {
            handle.abort();
        }
        tracing::debug!(interval = %interval, newly, "Monitoring interval completed");
        self.emit(StoreEvent::IntervalCompleted(interval));
        self.emit(StoreEvent::AlertsChanged);
        Ok(newly)
    }

    fn fire_reminder(&self, interval: MonitoringInterval) {
        if let Ok(mut tasks) = self.tasks() {
            tasks.reminders.remove(&interval);
        }

        let now = Utc::now();
        let raised = match self.write() {
            Ok(mut state) => match state.reminder_due(interval, now) {
                Some(alert) => {
                    state.upsert_alert(alert, now);
                    true
                }
                None => false,
            },
            Err(e) => {
                tracing::error!(interval = %interval, error = %e, "Reminder skipped");
                false
            }
        };

        if raised {
            tracing::info!(interval = %interval, "Monitoring interval due");
            self.emit(StoreEvent::ReminderDue(interval));
            self.emit(StoreEvent::AlertsChanged);
        }
    }
}
