pub mod error;

pub use error::{Result, SkillError};

use guild_types::{SkillId, MINING_SKILL};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// The root of the skill graph. Every other skill descends from it.
pub const ROOT_SKILL: SkillId = 0;

/// Append-only skill graph. Skills never change parent once created, so
/// ancestor resolution is deterministic and pure given the graph.
#[derive(Debug)]
pub struct SkillHierarchy {
    parents: Arc<RwLock<HashMap<SkillId, Option<SkillId>>>>,
    next_id: Arc<RwLock<SkillId>>,
}

impl SkillHierarchy {
    /// Seeds the root skill and the mining skill (child of root).
    pub fn new() -> Self {
        let mut parents = HashMap::new();
        parents.insert(ROOT_SKILL, None);
        parents.insert(MINING_SKILL, Some(ROOT_SKILL));

        Self {
            parents: Arc::new(RwLock::new(parents)),
            next_id: Arc::new(RwLock::new(MINING_SKILL + 1)),
        }
    }

    /// Add a skill under `parent` (or as another top-level root when `None`).
    pub async fn add_skill(&self, parent: Option<SkillId>) -> Result<SkillId> {
        let mut parents = self.parents.write().await;

        if let Some(p) = parent {
            if !parents.contains_key(&p) {
                return Err(SkillError::UnknownParent(p));
            }
        }

        let mut next_id = self.next_id.write().await;
        let id = *next_id;
        *next_id += 1;
        parents.insert(id, parent);

        debug!(skill_id = id, parent = ?parent, "Skill added");
        Ok(id)
    }

    /// Full ancestor chain of `skill`, ordered root-ward and excluding
    /// the skill itself.
    pub async fn ancestors_of(&self, skill: SkillId) -> Result<Vec<SkillId>> {
        let parents = self.parents.read().await;

        let mut current = *parents
            .get(&skill)
            .ok_or(SkillError::UnknownSkill(skill))?;

        let mut chain = Vec::new();
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = parents.get(&ancestor).copied().flatten();
        }
        Ok(chain)
    }

    pub async fn ancestor_count(&self, skill: SkillId) -> Result<usize> {
        Ok(self.ancestors_of(skill).await?.len())
    }

    pub async fn contains(&self, skill: SkillId) -> bool {
        self.parents.read().await.contains_key(&skill)
    }

    pub async fn skill_count(&self) -> usize {
        self.parents.read().await.len()
    }
}

impl Default for SkillHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SkillHierarchy {
    fn clone(&self) -> Self {
        Self {
            parents: Arc::clone(&self.parents),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_skills() {
        let skills = SkillHierarchy::new();
        assert!(skills.contains(ROOT_SKILL).await);
        assert!(skills.contains(MINING_SKILL).await);
        assert_eq!(skills.ancestors_of(ROOT_SKILL).await.unwrap(), vec![]);
        assert_eq!(
            skills.ancestors_of(MINING_SKILL).await.unwrap(),
            vec![ROOT_SKILL]
        );
    }

    #[tokio::test]
    async fn test_ancestor_chain_rootward() {
        let skills = SkillHierarchy::new();
        let a = skills.add_skill(Some(ROOT_SKILL)).await.unwrap();
        let b = skills.add_skill(Some(a)).await.unwrap();
        let c = skills.add_skill(Some(b)).await.unwrap();

        assert_eq!(skills.ancestors_of(c).await.unwrap(), vec![b, a, ROOT_SKILL]);
        assert_eq!(skills.ancestor_count(c).await.unwrap(), 3);
        assert_eq!(skills.ancestor_count(a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_parent_rejected() {
        let skills = SkillHierarchy::new();
        let err = skills.add_skill(Some(999)).await.unwrap_err();
        assert_eq!(err, SkillError::UnknownParent(999));
    }

    #[tokio::test]
    async fn test_unknown_skill_rejected() {
        let skills = SkillHierarchy::new();
        let err = skills.ancestors_of(42).await.unwrap_err();
        assert_eq!(err, SkillError::UnknownSkill(42));
    }

    #[tokio::test]
    async fn test_resolution_is_stable() {
        let skills = SkillHierarchy::new();
        let a = skills.add_skill(Some(ROOT_SKILL)).await.unwrap();
        let b = skills.add_skill(Some(a)).await.unwrap();

        let first = skills.ancestors_of(b).await.unwrap();
        // Later additions never perturb an existing chain.
        skills.add_skill(Some(b)).await.unwrap();
        skills.add_skill(None).await.unwrap();
        let second = skills.ancestors_of(b).await.unwrap();
        assert_eq!(first, second);
    }
}
