use crate::error::{CycleError, Result};
use guild_log::{OrganizationRegistry, ReputationUpdateLog};
use guild_skills::SkillHierarchy;
use guild_types::StateRoot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Versioned snapshot of the active/inactive log pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub active_log_id: u64,
    pub inactive_log_id: Option<u64>,
    /// Set while the inactive log awaits another mining attempt after a
    /// state divergence.
    pub remine_required: bool,
}

struct CoordinatorState {
    initialised: bool,
    cycle_id: u64,
    next_log_id: u64,
    active: Option<Arc<ReputationUpdateLog>>,
    inactive: Option<Arc<ReputationUpdateLog>>,
    remine_required: bool,
    accepted_roots: Vec<(u64, StateRoot)>,
}

/// Exclusive owner of log-pair lifecycle transitions. At any time there is
/// exactly one active log and at most one inactive log; a new cycle cannot
/// start while the previous inactive log is unresolved.
pub struct CycleCoordinator {
    registry: Arc<OrganizationRegistry>,
    skills: Arc<SkillHierarchy>,
    state: RwLock<CoordinatorState>,
}

impl CycleCoordinator {
    pub fn new(registry: Arc<OrganizationRegistry>, skills: Arc<SkillHierarchy>) -> Self {
        Self {
            registry,
            skills,
            state: RwLock::new(CoordinatorState {
                initialised: false,
                cycle_id: 0,
                next_log_id: 0,
                active: None,
                inactive: None,
                remine_required: false,
                accepted_roots: Vec::new(),
            }),
        }
    }

    /// One-shot: open cycle 0 with an empty active log.
    pub async fn initialise_mining(&self) -> Result<CycleRecord> {
        let mut state = self.state.write().await;
        if state.initialised {
            return Err(CycleError::AlreadyInitialised);
        }

        let log = Arc::new(ReputationUpdateLog::new(
            state.next_log_id,
            0,
            Arc::clone(&self.registry),
            Arc::clone(&self.skills),
        ));
        state.next_log_id += 1;
        state.active = Some(log);
        state.initialised = true;

        info!(cycle_id = state.cycle_id, "⚙️ Reputation mining initialised");
        Ok(Self::record(&state))
    }

    /// Atomically close the active log, make it the unique inactive log,
    /// and open a fresh active log whose prefix-sum offset carries over.
    pub async fn start_next_cycle(&self) -> Result<CycleRecord> {
        let mut state = self.state.write().await;
        if !state.initialised {
            return Err(CycleError::NotInitialised);
        }
        if state.inactive.is_some() {
            return Err(CycleError::CycleUnresolved {
                cycle_id: state.cycle_id,
            });
        }

        let closing = state.active.take().expect("initialised coordinator has an active log");
        closing.close().await;
        let offset = closing.total_updates().await;

        let fresh = Arc::new(ReputationUpdateLog::new(
            state.next_log_id,
            offset,
            Arc::clone(&self.registry),
            Arc::clone(&self.skills),
        ));
        state.next_log_id += 1;
        state.inactive = Some(closing);
        state.active = Some(fresh);
        state.cycle_id += 1;

        info!(
            cycle_id = state.cycle_id,
            inactive_log_id = state.inactive.as_ref().map(|l| l.log_id()),
            carry_over = offset,
            "🔄 Mining cycle rotated"
        );
        Ok(Self::record(&state))
    }

    /// Handle to the active (appending) or inactive (being mined) log.
    pub async fn get_cycle(&self, active: bool) -> Result<Arc<ReputationUpdateLog>> {
        let state = self.state.read().await;
        if !state.initialised {
            return Err(CycleError::NotInitialised);
        }
        if active {
            Ok(Arc::clone(state.active.as_ref().expect("initialised coordinator has an active log")))
        } else {
            state
                .inactive
                .as_ref()
                .map(Arc::clone)
                .ok_or(CycleError::NoInactiveCycle)
        }
    }

    /// Accept a commitment for the inactive log and retire it; its writes
    /// are now baked into the canonical tree.
    pub async fn conclude_cycle(&self, root: StateRoot) -> Result<()> {
        let mut state = self.state.write().await;
        let retired = state.inactive.take().ok_or(CycleError::NoInactiveCycle)?;
        let cycle_id = state.cycle_id;
        state.remine_required = false;
        state.accepted_roots.push((cycle_id, root));

        info!(
            cycle_id,
            retired_log_id = retired.log_id(),
            root = root.to_hex(),
            "✅ Cycle concluded, commitment accepted"
        );
        Ok(())
    }

    /// Escalation target for a state divergence: both submissions were
    /// faulty, the inactive log stays and must be mined again. The next
    /// cycle remains blocked until a commitment is accepted.
    pub async fn require_remine(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.inactive.is_none() {
            return Err(CycleError::NoInactiveCycle);
        }
        state.remine_required = true;

        warn!(
            cycle_id = state.cycle_id,
            "⚠️ State divergence: cycle requires re-mining"
        );
        Ok(())
    }

    pub async fn current_record(&self) -> Result<CycleRecord> {
        let state = self.state.read().await;
        if !state.initialised {
            return Err(CycleError::NotInitialised);
        }
        Ok(Self::record(&state))
    }

    pub async fn last_accepted_root(&self) -> Option<StateRoot> {
        self.state
            .read()
            .await
            .accepted_roots
            .last()
            .map(|(_, root)| *root)
    }

    pub async fn accepted_roots(&self) -> Vec<(u64, StateRoot)> {
        self.state.read().await.accepted_roots.clone()
    }

    fn record(state: &CoordinatorState) -> CycleRecord {
        CycleRecord {
            cycle_id: state.cycle_id,
            active_log_id: state
                .active
                .as_ref()
                .map(|l| l.log_id())
                .expect("initialised coordinator has an active log"),
            inactive_log_id: state.inactive.as_ref().map(|l| l.log_id()),
            remine_required: state.remine_required,
        }
    }
}
