use crate::error::{DisputeError, Result};
use crate::types::{DisputeConfig, DisputePhase, DisputedWriteReveal, Outcome, Submission};
use guild_log::ReputationUpdateLog;
use guild_skills::SkillHierarchy;
use guild_tree::{HonestPolicy, StateReplay};
use guild_types::{Address, StateRoot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

struct ResolverState {
    phase: DisputePhase,
    submissions: Vec<Submission>,
    round_deadline: u64,
    /// Intermediate commitments for the round in progress.
    round_claims: HashMap<Address, StateRoot>,
    /// Each party's claimed commitment at the window's `hi` index.
    claims_at_hi: HashMap<Address, StateRoot>,
    /// Commitment both parties last agreed on (at the window's `lo`).
    agreed_at_lo: StateRoot,
    reveals: HashMap<Address, DisputedWriteReveal>,
}

/// Drives two divergent submissions for one closed log down to a single
/// disputed write in at most `ceil(log2(total_writes))` rounds, then
/// adjudicates that write by deterministic replay.
pub struct DisputeResolver {
    log: Arc<ReputationUpdateLog>,
    skills: Arc<SkillHierarchy>,
    config: DisputeConfig,
    state: RwLock<ResolverState>,
    // Metrics counters, injected when a registry is wired up.
    pub disputes_opened: Option<Arc<prometheus::IntCounter>>,
    pub bisection_rounds: Option<Arc<prometheus::IntCounter>>,
    pub forfeits: Option<Arc<prometheus::IntCounter>>,
}

impl DisputeResolver {
    pub fn new(
        log: Arc<ReputationUpdateLog>,
        skills: Arc<SkillHierarchy>,
        config: DisputeConfig,
    ) -> Self {
        Self {
            log,
            skills,
            config,
            state: RwLock::new(ResolverState {
                phase: DisputePhase::AwaitingSubmissions,
                submissions: Vec::new(),
                round_deadline: 0,
                round_claims: HashMap::new(),
                claims_at_hi: HashMap::new(),
                agreed_at_lo: StateRoot::ZERO,
                reveals: HashMap::new(),
            }),
            disputes_opened: None,
            bisection_rounds: None,
            forfeits: None,
        }
    }

    pub fn set_metrics(
        &mut self,
        disputes_opened: Arc<prometheus::IntCounter>,
        bisection_rounds: Arc<prometheus::IntCounter>,
        forfeits: Arc<prometheus::IntCounter>,
    ) {
        self.disputes_opened = Some(disputes_opened);
        self.bisection_rounds = Some(bisection_rounds);
        self.forfeits = Some(forfeits);
    }

    pub async fn phase(&self) -> DisputePhase {
        self.state.read().await.phase.clone()
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.state.read().await.submissions.clone()
    }

    /// Current bisection window midpoint: the write index both parties
    /// must commit to this round.
    pub async fn current_midpoint(&self) -> Result<u64> {
        match self.state.read().await.phase {
            DisputePhase::Bisecting { lo, hi, .. } => Ok(lo + (hi - lo) / 2),
            _ => Err(DisputeError::WrongPhase {
                expected: "Bisecting",
            }),
        }
    }

    /// Submit a root for the cycle. The second divergent root opens the
    /// bisection; a matching root resolves immediately with agreement.
    pub async fn submit_root(
        &self,
        miner: Address,
        root: StateRoot,
        current_epoch: u64,
    ) -> Result<DisputePhase> {
        if !self.log.is_closed().await {
            return Err(DisputeError::LogStillActive(self.log.log_id()));
        }
        let total_writes = self.log.total_updates().await - self.log.offset();

        let mut state = self.state.write().await;
        if state.phase != DisputePhase::AwaitingSubmissions {
            return Err(DisputeError::WrongPhase {
                expected: "AwaitingSubmissions",
            });
        }
        if state.submissions.iter().any(|s| s.miner == miner) {
            return Err(DisputeError::DuplicateSubmission(miner));
        }

        state.submissions.push(Submission { miner, root });
        info!(
            miner = miner.to_hex(),
            root = root.to_hex(),
            log_id = self.log.log_id(),
            "📥 Root submitted"
        );

        if state.submissions.len() < 2 {
            return Ok(state.phase.clone());
        }

        let (a, b) = (state.submissions[0].clone(), state.submissions[1].clone());
        if a.root == b.root {
            state.phase = DisputePhase::Resolved(Outcome::Agreement(a.root));
            info!(root = a.root.to_hex(), "🤝 Submissions agree");
            return Ok(state.phase.clone());
        }

        if let Some(ref counter) = self.disputes_opened {
            counter.inc();
        }

        state.claims_at_hi.insert(a.miner, a.root);
        state.claims_at_hi.insert(b.miner, b.root);
        state.agreed_at_lo = StateRoot::ZERO;
        state.round_deadline = current_epoch + self.config.round_deadline_epochs;

        if total_writes == 0 {
            // Nothing to bisect over an empty log: the divergence is
            // adjudicated against the empty-tree commitment directly.
            drop(state);
            return self.resolve_empty_log(a, b).await;
        }

        state.phase = if total_writes == 1 {
            DisputePhase::Adjudicating { disputed: 0 }
        } else {
            DisputePhase::Bisecting {
                lo: 0,
                hi: total_writes,
                round: 0,
            }
        };

        info!(
            total_writes,
            miner_a = a.miner.to_hex(),
            miner_b = b.miner.to_hex(),
            "⚔️ Divergent roots: dispute opened"
        );
        Ok(state.phase.clone())
    }

    /// Submit the commitment after the current midpoint's writes.
    pub async fn submit_intermediate(
        &self,
        miner: Address,
        round: u32,
        commitment: StateRoot,
        current_epoch: u64,
    ) -> Result<DisputePhase> {
        let mut state = self.state.write().await;
        let (lo, hi, expected_round) = match state.phase {
            DisputePhase::Bisecting { lo, hi, round } => (lo, hi, round),
            _ => {
                return Err(DisputeError::WrongPhase {
                    expected: "Bisecting",
                })
            }
        };
        if round != expected_round {
            return Err(DisputeError::WrongRound {
                expected: expected_round,
                got: round,
            });
        }
        if !state.submissions.iter().any(|s| s.miner == miner) {
            return Err(DisputeError::UnknownMiner(miner));
        }
        if state.round_claims.contains_key(&miner) {
            return Err(DisputeError::DuplicateSubmission(miner));
        }
        if current_epoch > state.round_deadline {
            // The round already lapsed; the late party forfeits.
            return Ok(self.forfeit_missing(&mut state, |s| &s.round_claims));
        }

        state.round_claims.insert(miner, commitment);
        if state.round_claims.len() < 2 {
            return Ok(state.phase.clone());
        }

        let mid = lo + (hi - lo) / 2;
        let claims: Vec<StateRoot> = state
            .submissions
            .iter()
            .map(|s| state.round_claims[&s.miner])
            .collect();

        let (new_lo, new_hi) = if claims[0] == claims[1] {
            // Agreement at the midpoint: the divergence lies above it.
            state.agreed_at_lo = claims[0];
            (mid, hi)
        } else {
            // Disagreement at the midpoint: narrow below it.
            let round_claims = state.round_claims.clone();
            state.claims_at_hi = round_claims;
            (lo, mid)
        };

        state.round_claims.clear();
        state.round_deadline = current_epoch + self.config.round_deadline_epochs;
        if let Some(ref counter) = self.bisection_rounds {
            counter.inc();
        }

        state.phase = if new_hi - new_lo == 1 {
            DisputePhase::Adjudicating { disputed: new_lo }
        } else {
            DisputePhase::Bisecting {
                lo: new_lo,
                hi: new_hi,
                round: expected_round + 1,
            }
        };

        info!(
            round = expected_round,
            lo = new_lo,
            hi = new_hi,
            "🪓 Bisection round complete"
        );
        Ok(state.phase.clone())
    }

    /// Reveal the disputed write. When both parties have revealed, the
    /// resolver recomputes that single write from the immutable log and
    /// adjudicates.
    pub async fn reveal_disputed_write(
        &self,
        miner: Address,
        reveal: DisputedWriteReveal,
        current_epoch: u64,
    ) -> Result<DisputePhase> {
        let mut state = self.state.write().await;
        let disputed = match state.phase {
            DisputePhase::Adjudicating { disputed } => disputed,
            _ => {
                return Err(DisputeError::WrongPhase {
                    expected: "Adjudicating",
                })
            }
        };
        if !state.submissions.iter().any(|s| s.miner == miner) {
            return Err(DisputeError::UnknownMiner(miner));
        }
        if state.reveals.contains_key(&miner) {
            return Err(DisputeError::DuplicateSubmission(miner));
        }
        if current_epoch > state.round_deadline {
            return Ok(self.forfeit_missing(&mut state, |s| &s.reveals));
        }

        state.reveals.insert(miner, reveal);
        if state.reveals.len() < 2 {
            return Ok(state.phase.clone());
        }

        let outcome = self.adjudicate(&state, disputed).await?;
        state.phase = DisputePhase::Resolved(outcome);
        Ok(state.phase.clone())
    }

    /// Forfeit parties that missed the current deadline. A party that
    /// fails to respond within the required round is adjudicated faulty
    /// by default.
    pub async fn check_timeout(&self, current_epoch: u64) -> Result<DisputePhase> {
        let mut state = self.state.write().await;
        if current_epoch <= state.round_deadline {
            return Ok(state.phase.clone());
        }
        match state.phase {
            DisputePhase::Bisecting { .. } => {
                Ok(self.forfeit_missing(&mut state, |s| &s.round_claims))
            }
            DisputePhase::Adjudicating { .. } => {
                Ok(self.forfeit_missing(&mut state, |s| &s.reveals))
            }
            _ => Ok(state.phase.clone()),
        }
    }

    fn forfeit_missing<T>(
        &self,
        state: &mut ResolverState,
        responded: impl Fn(&ResolverState) -> &HashMap<Address, T>,
    ) -> DisputePhase {
        let missing: Vec<Address> = state
            .submissions
            .iter()
            .map(|s| s.miner)
            .filter(|m| !responded(state).contains_key(m))
            .collect();

        if let Some(ref counter) = self.forfeits {
            counter.inc_by(missing.len() as u64);
        }

        let outcome = match missing.as_slice() {
            [] => return state.phase.clone(),
            [faulty] => {
                let winner = state
                    .submissions
                    .iter()
                    .map(|s| s.miner)
                    .find(|m| m != faulty)
                    .expect("two parties in an open dispute");
                info!(
                    faulty = faulty.to_hex(),
                    winner = winner.to_hex(),
                    "⏰ Round deadline missed: forfeit"
                );
                Outcome::Winner(winner)
            }
            _ => {
                info!("⏰ Both parties missed the deadline");
                Outcome::BothFaulty
            }
        };
        state.phase = DisputePhase::Resolved(outcome);
        state.phase.clone()
    }

    /// Recompute the single disputed write from the immutable log entry
    /// and judge both parties' claims against it.
    async fn adjudicate(&self, state: &ResolverState, disputed: u64) -> Result<Outcome> {
        let mut replay = StateReplay::new(&self.log, &self.skills, &HonestPolicy).await?;
        replay.run_to(disputed)?;
        let honest_at_lo = replay.root();
        let expected_origin = replay.origin_of(disputed);
        replay.run_to(disputed + 1)?;
        let honest_after = replay.root();

        // If the commitment the parties agreed on below the disputed
        // write is itself wrong, both diverged earlier and colluded or
        // fabricated identically.
        if state.agreed_at_lo != honest_at_lo && disputed > 0 {
            info!(
                disputed,
                "🚨 Agreed prefix commitment fails recomputation"
            );
            return Ok(Outcome::BothFaulty);
        }

        let mut faulty = Vec::new();
        for submission in &state.submissions {
            let miner = submission.miner;
            let reveal = state.reveals[&miner];
            let claimed_after = state.claims_at_hi[&miner];

            let origin_ok = expected_origin
                .map(|(e, w)| reveal.entry_index == e && reveal.write_in_entry == w)
                .unwrap_or(false);
            let commitment_ok = claimed_after == honest_after;

            if !origin_ok || !commitment_ok {
                info!(
                    miner = miner.to_hex(),
                    disputed,
                    origin_ok,
                    commitment_ok,
                    "🚨 Claim inconsistent with recomputation"
                );
                faulty.push(miner);
            }
        }

        let outcome = match faulty.len() {
            0 => {
                // Unreachable in a live dispute: the claims at `hi`
                // differ, so at most one can match the recomputation.
                Outcome::BothFaulty
            }
            1 => {
                let winner = state
                    .submissions
                    .iter()
                    .map(|s| s.miner)
                    .find(|m| *m != faulty[0])
                    .expect("two parties in an open dispute");
                Outcome::Winner(winner)
            }
            _ => Outcome::BothFaulty,
        };

        info!(disputed, outcome = ?outcome, "⚖️ Dispute adjudicated");
        Ok(outcome)
    }

    async fn resolve_empty_log(&self, a: Submission, b: Submission) -> Result<DisputePhase> {
        let mut state = self.state.write().await;
        let honest = StateRoot::ZERO;
        let outcome = match (a.root == honest, b.root == honest) {
            (true, false) => Outcome::Winner(a.miner),
            (false, true) => Outcome::Winner(b.miner),
            _ => Outcome::BothFaulty,
        };
        info!(outcome = ?outcome, "⚖️ Empty-log dispute adjudicated");
        state.phase = DisputePhase::Resolved(outcome);
        Ok(state.phase.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_log::OrganizationRegistry;
    use guild_skills::ROOT_SKILL;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 32])
    }

    async fn closed_log(entries: usize) -> (Arc<ReputationUpdateLog>, Arc<SkillHierarchy>) {
        let registry = Arc::new(OrganizationRegistry::new());
        let skills = Arc::new(SkillHierarchy::new());
        let org = addr(1);
        registry.register(org).await;

        let log = Arc::new(ReputationUpdateLog::new(0, 0, registry, Arc::clone(&skills)));
        for i in 0..entries {
            log.append(org, addr(10 + i as u8), ROOT_SKILL, 100)
                .await
                .unwrap();
        }
        log.close().await;
        (log, skills)
    }

    fn resolver(log: &Arc<ReputationUpdateLog>, skills: &Arc<SkillHierarchy>) -> DisputeResolver {
        DisputeResolver::new(Arc::clone(log), Arc::clone(skills), DisputeConfig::default())
    }

    #[tokio::test]
    async fn test_duplicate_root_submission_rejected() {
        let (log, skills) = closed_log(2).await;
        let r = resolver(&log, &skills);

        r.submit_root(addr(0xaa), StateRoot::new(b"a"), 0).await.unwrap();
        let err = r
            .submit_root(addr(0xaa), StateRoot::new(b"b"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DisputeError::DuplicateSubmission(_)));
    }

    #[tokio::test]
    async fn test_intermediate_outside_bisection_fails() {
        let (log, skills) = closed_log(2).await;
        let r = resolver(&log, &skills);

        let err = r
            .submit_intermediate(addr(0xaa), 0, StateRoot::ZERO, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DisputeError::WrongPhase { expected: "Bisecting" }));
        assert!(r.current_midpoint().await.is_err());
    }

    #[tokio::test]
    async fn test_stale_round_and_stranger_rejected() {
        let (log, skills) = closed_log(2).await;
        let r = resolver(&log, &skills);
        r.submit_root(addr(0xaa), StateRoot::new(b"a"), 0).await.unwrap();
        r.submit_root(addr(0xbb), StateRoot::new(b"b"), 0).await.unwrap();

        let err = r
            .submit_intermediate(addr(0xaa), 3, StateRoot::ZERO, 0)
            .await
            .unwrap_err();
        assert_eq!(err, DisputeError::WrongRound { expected: 0, got: 3 });

        let err = r
            .submit_intermediate(addr(0xcc), 0, StateRoot::ZERO, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DisputeError::UnknownMiner(_)));
    }

    #[tokio::test]
    async fn test_empty_log_adjudicated_directly() {
        let (log, skills) = closed_log(0).await;
        let r = resolver(&log, &skills);

        r.submit_root(addr(0xaa), StateRoot::ZERO, 0).await.unwrap();
        let phase = r
            .submit_root(addr(0xbb), StateRoot::new(b"fabricated"), 0)
            .await
            .unwrap();
        assert_eq!(phase, DisputePhase::Resolved(Outcome::Winner(addr(0xaa))));
    }

    #[tokio::test]
    async fn test_minimal_log_opens_single_round_window() {
        // One root-skill gain expands to exactly two writes, the smallest
        // disputable log.
        let (log, skills) = closed_log(1).await;
        let r = resolver(&log, &skills);
        assert_eq!(log.total_updates().await, 2);

        r.submit_root(addr(0xaa), StateRoot::new(b"a"), 0).await.unwrap();
        let phase = r.submit_root(addr(0xbb), StateRoot::new(b"b"), 0).await.unwrap();
        assert_eq!(phase, DisputePhase::Bisecting { lo: 0, hi: 2, round: 0 });
        assert_eq!(r.current_midpoint().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_timeout_before_deadline_is_a_no_op() {
        let (log, skills) = closed_log(2).await;
        let r = resolver(&log, &skills);
        r.submit_root(addr(0xaa), StateRoot::new(b"a"), 0).await.unwrap();
        r.submit_root(addr(0xbb), StateRoot::new(b"b"), 0).await.unwrap();

        let before = r.phase().await;
        let after = r
            .check_timeout(DisputeConfig::default().round_deadline_epochs)
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_total_silence_is_both_faulty() {
        let (log, skills) = closed_log(2).await;
        let r = resolver(&log, &skills);
        r.submit_root(addr(0xaa), StateRoot::new(b"a"), 0).await.unwrap();
        r.submit_root(addr(0xbb), StateRoot::new(b"b"), 0).await.unwrap();

        let phase = r.check_timeout(1_000).await.unwrap();
        assert_eq!(phase, DisputePhase::Resolved(Outcome::BothFaulty));
    }
}
