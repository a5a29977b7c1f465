use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::enums::Phase;

/// A form phase as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDescriptor {
    pub phase: Phase,
    pub title: &'static str,
    pub description: &'static str,
}

/// Form phases in entry order.
pub const PHASES: [PhaseDescriptor; 9] = [
    PhaseDescriptor {
        phase: Phase::Demographics,
        title: "Demographics",
        description: "Patient demographics & basic data",
    },
    PhaseDescriptor {
        phase: Phase::Vitals,
        title: "Pre-induction Hemodynamics & Labs",
        description: "Pre-induction vitals, labs & modified shock index",
    },
    PhaseDescriptor {
        phase: Phase::Indication,
        title: "Indication for Intubation",
        description: "Trauma / Non-trauma indication for intubation",
    },
    PhaseDescriptor {
        phase: Phase::Leon,
        title: "Airway & LEON Score",
        description: "Airway assessment & difficult airway prediction",
    },
    PhaseDescriptor {
        phase: Phase::PreIntubation,
        title: "Pre-intubation Status & Medication",
        description: "Medications, fluids, pressors & sedation",
    },
    PhaseDescriptor {
        phase: Phase::Comorbidities,
        title: "Comorbidities & Post-intubation GCS",
        description: "Comorbidities and post-intubation neurological status",
    },
    PhaseDescriptor {
        phase: Phase::PostIntubation,
        title: "ETT/CD & Ventilator Settings",
        description: "Post-intubation ventilator settings & adverse events",
    },
    PhaseDescriptor {
        phase: Phase::Attempts,
        title: "Intubation Attempts",
        description: "Intubation attempts and technique details",
    },
    PhaseDescriptor {
        phase: Phase::Monitoring,
        title: "Hemodynamics Over Time",
        description: "Pre-induction and serial post-induction vitals at fixed intervals",
    },
];

impl Phase {
    /// Position in entry order.
    pub fn index(&self) -> usize {
        PHASES
            .iter()
            .position(|d| d.phase == *self)
            .unwrap_or_default()
    }

    pub fn descriptor(&self) -> &'static PhaseDescriptor {
        &PHASES[self.index()]
    }

    pub fn title(&self) -> &'static str {
        self.descriptor().title
    }

    pub fn following(&self) -> Option<Phase> {
        PHASES.get(self.index() + 1).map(|d| d.phase)
    }

    pub fn preceding(&self) -> Option<Phase> {
        self.index().checked_sub(1).map(|i| PHASES[i].phase)
    }

    pub fn is_final(&self) -> bool {
        self.index() == PHASES.len() - 1
    }
}

/// Current-phase pointer plus the set of phases marked complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseNavigator {
    current: Phase,
    completed: BTreeSet<Phase>,
}

impl PhaseNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(phase: Phase) -> Self {
        Self {
            current: phase,
            completed: BTreeSet::new(),
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// Move forward one phase. `None` when already on the last phase.
    pub fn next(&mut self) -> Option<Phase> {
        let next = self.current.following()?;
        self.current = next;
        Some(next)
    }

    /// Move back one phase. `None` when already on the first phase.
    pub fn previous(&mut self) -> Option<Phase> {
        let prev = self.current.preceding()?;
        self.current = prev;
        Some(prev)
    }

    /// Jump to any phase. Returns whether the pointer moved.
    pub fn goto(&mut self, phase: Phase) -> bool {
        let moved = self.current != phase;
        self.current = phase;
        moved
    }

    /// Idempotent.
    pub fn mark_complete(&mut self, phase: Phase) -> bool {
        self.completed.insert(phase)
    }

    pub fn is_complete(&self, phase: Phase) -> bool {
        self.completed.contains(&phase)
    }

    pub fn completed(&self) -> impl Iterator<Item = Phase> + '_ {
        self.completed.iter().copied()
    }

    /// Share of phases marked complete, 0 to 100.
    pub fn progress_percent(&self) -> u8 {
        ((self.completed.len() * 100) / PHASES.len()) as u8
    }

    /// On the last phase, where finishing triggers submission.
    pub fn is_final(&self) -> bool {
        self.current.is_final()
    }

    /// All phases marked complete.
    pub fn all_complete(&self) -> bool {
        self.completed.len() == PHASES.len()
    }
}
