use crate::entry::UpdateLogEntry;
use crate::error::{LogError, Result};
use crate::math::combine_payouts;
use crate::registry::OrganizationRegistry;
use chrono::Utc;
use guild_skills::SkillHierarchy;
use guild_types::{Address, SkillId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct LogInner {
    entries: Vec<UpdateLogEntry>,
    closed: bool,
}

/// Append-only log of pending reputation deltas for one mining cycle.
///
/// Appends are serialized through a single write lock so the prefix sum
/// `n_previous_updates` is unambiguous under concurrent callers. Entries
/// are never mutated or removed once appended.
#[derive(Debug)]
pub struct ReputationUpdateLog {
    log_id: u64,
    /// Prefix-sum carry-over from the previous cycle's log.
    offset: u64,
    registry: Arc<OrganizationRegistry>,
    skills: Arc<SkillHierarchy>,
    inner: RwLock<LogInner>,
}

impl ReputationUpdateLog {
    pub fn new(
        log_id: u64,
        offset: u64,
        registry: Arc<OrganizationRegistry>,
        skills: Arc<SkillHierarchy>,
    ) -> Self {
        Self {
            log_id,
            offset,
            registry,
            skills,
            inner: RwLock::new(LogInner {
                entries: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn log_id(&self) -> u64 {
        self.log_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Append one reputation delta on behalf of `organization`.
    ///
    /// The caller is the organization context; reputation is
    /// organization-scoped. Returns the new entry's index.
    pub async fn append(
        &self,
        organization: Address,
        user: Address,
        skill_id: SkillId,
        amount: i128,
    ) -> Result<u64> {
        if !self.registry.is_registered(&organization).await {
            return Err(LogError::Unauthorized(organization));
        }

        let ancestor_count = self.skills.ancestor_count(skill_id).await?;

        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(LogError::LogClosed(self.log_id));
        }

        let index = self.push_entry(&mut inner, organization, user, skill_id, amount, ancestor_count);

        debug!(
            log_id = self.log_id,
            index,
            organization = organization.to_hex(),
            user = user.to_hex(),
            skill_id,
            amount = %amount,
            "Reputation update logged"
        );

        Ok(index)
    }

    /// Append the full batch of `(user, amount)` deltas for one finalized
    /// task, all-or-nothing. Every amount and their combined total are
    /// validated before the first entry lands, so an overflowing payout
    /// aborts the whole operation without touching the log.
    pub async fn append_task_updates(
        &self,
        organization: Address,
        skill_id: SkillId,
        updates: &[(Address, i128)],
    ) -> Result<Vec<u64>> {
        if !self.registry.is_registered(&organization).await {
            return Err(LogError::Unauthorized(organization));
        }

        let amounts: Vec<i128> = updates.iter().map(|(_, a)| *a).collect();
        combine_payouts(&amounts)?;

        let ancestor_count = self.skills.ancestor_count(skill_id).await?;

        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(LogError::LogClosed(self.log_id));
        }

        let mut indices = Vec::with_capacity(updates.len());
        for &(user, amount) in updates {
            indices.push(self.push_entry(
                &mut inner,
                organization,
                user,
                skill_id,
                amount,
                ancestor_count,
            ));
        }

        debug!(
            log_id = self.log_id,
            appended = indices.len(),
            organization = organization.to_hex(),
            skill_id,
            "Task reputation updates logged"
        );

        Ok(indices)
    }

    fn push_entry(
        &self,
        inner: &mut LogInner,
        organization: Address,
        user: Address,
        skill_id: SkillId,
        amount: i128,
        ancestor_count: usize,
    ) -> u64 {
        let n_updates = UpdateLogEntry::n_updates_for(amount, ancestor_count);
        let n_previous_updates = inner
            .entries
            .last()
            .map(|e| e.n_previous_updates + e.n_updates)
            .unwrap_or(self.offset);

        inner.entries.push(UpdateLogEntry {
            user,
            amount,
            skill_id,
            organization,
            n_updates,
            n_previous_updates,
            appended_at: Utc::now(),
        });

        inner.entries.len() as u64 - 1
    }

    pub async fn get(&self, index: u64) -> Result<UpdateLogEntry> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(index as usize)
            .cloned()
            .ok_or(LogError::OutOfRange {
                index,
                len: inner.entries.len() as u64,
            })
    }

    pub async fn len(&self) -> u64 {
        self.inner.read().await.entries.len() as u64
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Total count of elementary tree writes this log expands into,
    /// including the carry-over offset. The flattened write sequence the
    /// tree builder and dispute resolver operate over spans
    /// `[offset, total_updates)`.
    pub async fn total_updates(&self) -> u64 {
        let inner = self.inner.read().await;
        inner
            .entries
            .last()
            .map(|e| e.n_previous_updates + e.n_updates)
            .unwrap_or(self.offset)
    }

    /// Freeze the log. Idempotent; every later append fails.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if !inner.closed {
            inner.closed = true;
            info!(
                log_id = self.log_id,
                entries = inner.entries.len(),
                "🔒 Reputation update log closed"
            );
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Snapshot of all entries, in index order. Intended for miners
    /// replaying a closed log.
    pub async fn entries(&self) -> Vec<UpdateLogEntry> {
        self.inner.read().await.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_skills::ROOT_SKILL;

    fn setup() -> (Arc<OrganizationRegistry>, Arc<SkillHierarchy>) {
        (
            Arc::new(OrganizationRegistry::new()),
            Arc::new(SkillHierarchy::new()),
        )
    }

    fn org() -> Address {
        Address::from_bytes([1u8; 32])
    }

    fn user(n: u8) -> Address {
        Address::from_bytes([n; 32])
    }

    #[tokio::test]
    async fn test_unauthorized_append_leaves_log_unchanged() {
        let (registry, skills) = setup();
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        let before = log.len().await;
        let err = log
            .append(org(), user(9), ROOT_SKILL, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Unauthorized(_)));
        assert_eq!(log.len().await, before);
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let leaf = skills.add_skill(Some(ROOT_SKILL)).await.unwrap();
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        let idx = log.append(org(), user(9), leaf, 250).await.unwrap();
        assert_eq!(idx, 0);

        let entry = log.get(0).await.unwrap();
        let (u, amount, skill, o, n_updates, n_previous) = entry.as_tuple();
        assert_eq!(u, user(9));
        assert_eq!(amount, 250);
        assert_eq!(skill, leaf);
        assert_eq!(o, org());
        assert_eq!(n_updates, 4); // leaf has 1 ancestor
        assert_eq!(n_previous, 0);
    }

    #[tokio::test]
    async fn test_prefix_sum_invariant() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let leaf = skills.add_skill(Some(ROOT_SKILL)).await.unwrap();
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        // Three gains then a loss at a skill with one ancestor:
        // n_updates [4, 4, 4, 8], n_previous_updates [0, 4, 8, 12].
        for _ in 0..3 {
            log.append(org(), user(9), leaf, 10).await.unwrap();
        }
        log.append(org(), user(9), leaf, -10).await.unwrap();

        let expected_n = [4u64, 4, 4, 8];
        let expected_prev = [0u64, 4, 8, 12];
        for i in 0..4 {
            let e = log.get(i).await.unwrap();
            assert_eq!(e.n_updates, expected_n[i as usize]);
            assert_eq!(e.n_previous_updates, expected_prev[i as usize]);
        }

        for i in 1..4 {
            let prev = log.get(i - 1).await.unwrap();
            let cur = log.get(i).await.unwrap();
            assert_eq!(
                cur.n_previous_updates,
                prev.n_previous_updates + prev.n_updates
            );
        }

        assert_eq!(log.total_updates().await, 20);
    }

    #[tokio::test]
    async fn test_offset_carries_into_prefix_sum() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let log = ReputationUpdateLog::new(1, 20, registry, skills);

        assert_eq!(log.total_updates().await, 20);
        log.append(org(), user(9), ROOT_SKILL, 5).await.unwrap();
        assert_eq!(log.get(0).await.unwrap().n_previous_updates, 20);
        assert_eq!(log.total_updates().await, 22);
    }

    #[tokio::test]
    async fn test_out_of_range_read() {
        let (registry, skills) = setup();
        let log = ReputationUpdateLog::new(0, 0, registry, skills);
        let err = log.get(3).await.unwrap_err();
        assert_eq!(err, LogError::OutOfRange { index: 3, len: 0 });
    }

    #[tokio::test]
    async fn test_closed_log_rejects_appends() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        log.append(org(), user(9), ROOT_SKILL, 1).await.unwrap();
        log.close().await;
        log.close().await; // idempotent

        let err = log.append(org(), user(9), ROOT_SKILL, 1).await.unwrap_err();
        assert_eq!(err, LogError::LogClosed(0));
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_overflowing_task_mutates_nothing() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        let updates = vec![(user(1), 2i128), (user(2), 1i128), (user(3), i128::MAX)];
        let err = log
            .append_task_updates(org(), ROOT_SKILL, &updates)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::ArithmeticFault(_)));
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_task_batch_appends_all() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let leaf = skills.add_skill(Some(ROOT_SKILL)).await.unwrap();
        let log = ReputationUpdateLog::new(0, 0, registry, skills);

        let updates = vec![(user(1), 100i128), (user(2), 50i128), (user(3), 200i128)];
        let indices = log
            .append_task_updates(org(), leaf, &updates)
            .await
            .unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(log.len().await, 3);
        assert_eq!(log.get(2).await.unwrap().n_previous_updates, 8);
    }

    #[tokio::test]
    async fn test_concurrent_appends_totally_ordered() {
        let (registry, skills) = setup();
        registry.register(org()).await;
        let log = Arc::new(ReputationUpdateLog::new(0, 0, registry, skills));

        let mut handles = Vec::new();
        for i in 0..10u8 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append(org(), user(i), ROOT_SKILL, 10).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(log.len().await, 10);
        for i in 1..10 {
            let prev = log.get(i - 1).await.unwrap();
            let cur = log.get(i).await.unwrap();
            assert_eq!(
                cur.n_previous_updates,
                prev.n_previous_updates + prev.n_updates
            );
        }
    }
}
