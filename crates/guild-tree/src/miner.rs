use crate::error::Result;
use crate::policy::UpdatePolicy;
use crate::replay::StateReplay;
use guild_log::ReputationUpdateLog;
use guild_skills::SkillHierarchy;
use guild_types::{Address, StateRoot};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// A miner folds a closed log into the reputation tree and publishes the
/// resulting commitment. Behavior is a strategy object selected at
/// construction: honest miners use `HonestPolicy`, adversarial test
/// miners swap in a fault-injecting policy.
pub struct Miner {
    id: Address,
    log: Arc<ReputationUpdateLog>,
    skills: Arc<SkillHierarchy>,
    policy: Arc<dyn UpdatePolicy>,
    replay: Mutex<Option<StateReplay>>,
}

impl Miner {
    pub fn new(
        id: Address,
        log: Arc<ReputationUpdateLog>,
        skills: Arc<SkillHierarchy>,
        policy: Arc<dyn UpdatePolicy>,
    ) -> Self {
        Self {
            id,
            log,
            skills,
            policy,
            replay: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Address {
        self.id
    }

    /// Replay the whole closed log and produce `(root, leaf_count)`.
    pub async fn build_state(&self) -> Result<(StateRoot, usize)> {
        let mut guard = self.replay.lock().await;
        self.ensure_replay(&mut guard).await?;
        let replay = guard.as_mut().expect("replay just ensured");

        let total = replay.total_writes();
        replay.run_to(total)?;
        let root = replay.root();
        let leaves = replay.tree().len();

        info!(
            miner = self.id.to_hex(),
            log_id = self.log.log_id(),
            total_writes = total,
            leaves,
            root = root.to_hex(),
            "⛏️ Reputation state built"
        );
        Ok((root, leaves))
    }

    /// Commitment over the partial state after `write_index` writes, as
    /// submitted during bisection rounds. Rewinding restarts the cursor
    /// from scratch; the replay is deterministic either way.
    pub async fn commitment_at(&self, write_index: u64) -> Result<StateRoot> {
        let mut guard = self.replay.lock().await;
        self.ensure_replay(&mut guard).await?;
        if guard.as_ref().expect("replay just ensured").position() > write_index {
            *guard = Some(StateReplay::new(&self.log, &self.skills, self.policy.as_ref()).await?);
        }
        let replay = guard.as_mut().expect("replay just ensured");
        replay.run_to(write_index)?;
        Ok(replay.root())
    }

    /// Which `(entry_index, write_in_entry)` this miner claims produced
    /// the write at `write_index`.
    pub async fn origin_of(&self, write_index: u64) -> Result<Option<(u64, u64)>> {
        let mut guard = self.replay.lock().await;
        self.ensure_replay(&mut guard).await?;
        Ok(guard
            .as_ref()
            .expect("replay just ensured")
            .origin_of(write_index))
    }

    pub async fn total_writes(&self) -> Result<u64> {
        let mut guard = self.replay.lock().await;
        self.ensure_replay(&mut guard).await?;
        Ok(guard
            .as_ref()
            .expect("replay just ensured")
            .total_writes())
    }

    async fn ensure_replay(&self, guard: &mut Option<StateReplay>) -> Result<()> {
        if guard.is_none() {
            *guard = Some(StateReplay::new(&self.log, &self.skills, self.policy.as_ref()).await?);
        }
        Ok(())
    }
}
