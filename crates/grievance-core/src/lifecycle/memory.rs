use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::defensibility::DefensibilityPack;
use super::domain::{Case, CaseId};
use super::repository::{
    CaseRepository, PackRepository, RepositoryError, SignalRepository, SignalSet,
    TimelineRepository, TransitionCommit,
};
use super::signals::Signal;
use super::timeline::TimelineEvent;

#[derive(Debug, Default)]
struct StoreState {
    cases: BTreeMap<CaseId, Case>,
    events: BTreeMap<CaseId, Vec<TimelineEvent>>,
    signals: BTreeMap<CaseId, SignalSet>,
    signal_history: BTreeMap<CaseId, Vec<SignalSet>>,
    packs: BTreeMap<CaseId, Vec<DefensibilityPack>>,
}

/// In-process store. A single lock serialises every write, which gives each case the
/// single-writer guarantee the service relies on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    retain_signal_history: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal_history(retain: bool) -> Self {
        Self {
            state: Mutex::default(),
            retain_signal_history: retain,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

impl CaseRepository for MemoryStore {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        let mut state = self.lock()?;
        if state.cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        state.cases.insert(case.id.clone(), case.clone());
        Ok(case)
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        Ok(self.lock()?.cases.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Case>, RepositoryError> {
        Ok(self.lock()?.cases.values().cloned().collect())
    }

    fn record_activity(&self, id: &CaseId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let case = state.cases.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if at > case.updated_at {
            case.updated_at = at;
        }
        Ok(())
    }

    fn commit_transition(&self, commit: TransitionCommit) -> Result<Case, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .cases
            .get_mut(&commit.case.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != commit.expected_status {
            return Err(RepositoryError::StaleStatus {
                expected: commit.expected_status,
                found: stored.status,
            });
        }

        *stored = commit.case.clone();
        state
            .events
            .entry(commit.case.id.clone())
            .or_default()
            .push(commit.event);
        Ok(commit.case)
    }
}

impl TimelineRepository for MemoryStore {
    fn append(&self, event: TimelineEvent) -> Result<TimelineEvent, RepositoryError> {
        let mut state = self.lock()?;
        if !state.cases.contains_key(&event.case_id) {
            return Err(RepositoryError::NotFound);
        }
        state
            .events
            .entry(event.case_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    fn events_for_case(&self, id: &CaseId) -> Result<Vec<TimelineEvent>, RepositoryError> {
        let state = self.lock()?;
        let mut events = state.events.get(id).cloned().unwrap_or_default();
        // backdated events may arrive after later ones
        events.sort_by_key(|event| event.occurred_at);
        Ok(events)
    }
}

impl SignalRepository for MemoryStore {
    fn replace_for_case(&self, set: SignalSet) -> Result<Option<SignalSet>, RepositoryError> {
        let mut state = self.lock()?;
        let previous = state.signals.insert(set.case_id.clone(), set);
        if self.retain_signal_history {
            if let Some(previous) = &previous {
                state
                    .signal_history
                    .entry(previous.case_id.clone())
                    .or_default()
                    .push(previous.clone());
            }
        }
        Ok(previous)
    }

    fn current_for_case(&self, id: &CaseId) -> Result<Vec<Signal>, RepositoryError> {
        Ok(self
            .lock()?
            .signals
            .get(id)
            .map(|set| set.signals.clone())
            .unwrap_or_default())
    }

    fn all_current(&self) -> Result<Vec<Signal>, RepositoryError> {
        let state = self.lock()?;
        let mut signals: Vec<Signal> = state
            .signals
            .values()
            .flat_map(|set| set.signals.iter().cloned())
            .collect();
        signals.sort_by_key(|signal| signal.severity.rank());
        Ok(signals)
    }

    fn history_for_case(&self, id: &CaseId) -> Result<Vec<SignalSet>, RepositoryError> {
        Ok(self
            .lock()?
            .signal_history
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

impl PackRepository for MemoryStore {
    fn store(&self, pack: DefensibilityPack) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let packs = state.packs.entry(pack.case_id.clone()).or_default();
        if packs
            .iter()
            .any(|existing| existing.export_version == pack.export_version)
        {
            return Err(RepositoryError::Conflict);
        }
        packs.push(pack);
        Ok(())
    }

    fn packs_for_case(&self, id: &CaseId) -> Result<Vec<DefensibilityPack>, RepositoryError> {
        Ok(self.lock()?.packs.get(id).cloned().unwrap_or_default())
    }

    fn latest_version(&self, id: &CaseId) -> Result<u32, RepositoryError> {
        Ok(self
            .lock()?
            .packs
            .get(id)
            .and_then(|packs| packs.iter().map(|pack| pack.export_version).max())
            .unwrap_or(0))
    }
}
