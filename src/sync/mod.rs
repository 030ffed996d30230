//! Synchronized playback groups
//!
//! A sync group is a fixed set of instance indices whose user-originated
//! transport actions mirror each other. Membership is configured once at
//! service build time and never mutated. Propagation depth is exactly one:
//! the command layer applies an action to its origin first, then replays it
//! on every other member, never back onto the origin.

use serde::{Deserialize, Serialize};

/// A transport action replayed across a sync group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "value")]
pub enum SyncAction {
    Play,
    Pause,
    Seek(f64),
    SeekForward(f64),
    SeekRewind(f64),
}

/// A fixed set of mirrored instances, optionally sharing one media source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncGroup {
    pub members: Vec<usize>,
    pub shared_url: Option<String>,
}

impl SyncGroup {
    pub fn new(members: Vec<usize>) -> Self {
        Self {
            members,
            shared_url: None,
        }
    }

    pub fn with_shared_url(members: Vec<usize>, url: impl Into<String>) -> Self {
        Self {
            members,
            shared_url: Some(url.into()),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}

/// Resolves which instances must mirror an action from a given origin
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    groups: Vec<SyncGroup>,
}

impl SyncCoordinator {
    /// Groups are expected to be disjoint; when an index appears in more
    /// than one group, the first group wins.
    pub fn new(groups: Vec<SyncGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[SyncGroup] {
        &self.groups
    }

    /// The group the origin belongs to, if any
    pub fn group_of(&self, origin: usize) -> Option<&SyncGroup> {
        self.groups.iter().find(|g| g.contains(origin))
    }

    /// Every member of the origin's group except the origin itself.
    /// An origin outside any group has no followers.
    pub fn followers(&self, origin: usize) -> Vec<usize> {
        self.group_of(origin)
            .map(|group| {
                group
                    .members
                    .iter()
                    .copied()
                    .filter(|&member| member != origin)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Shared media source configured for the instance's group, if any
    pub fn shared_url(&self, index: usize) -> Option<&str> {
        self.group_of(index)
            .and_then(|group| group.shared_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followers_exclude_origin() {
        let coordinator = SyncCoordinator::new(vec![SyncGroup::new(vec![1, 2])]);
        assert_eq!(coordinator.followers(1), vec![2]);
        assert_eq!(coordinator.followers(2), vec![1]);
    }

    #[test]
    fn test_origin_outside_any_group_has_no_followers() {
        let coordinator = SyncCoordinator::new(vec![SyncGroup::new(vec![1, 2])]);
        assert!(coordinator.followers(0).is_empty());
        assert!(coordinator.followers(7).is_empty());
    }

    #[test]
    fn test_multiple_disjoint_groups() {
        let coordinator = SyncCoordinator::new(vec![
            SyncGroup::new(vec![0, 1, 2]),
            SyncGroup::new(vec![5, 6]),
        ]);
        assert_eq!(coordinator.followers(1), vec![0, 2]);
        assert_eq!(coordinator.followers(5), vec![6]);
    }

    #[test]
    fn test_shared_url() {
        let coordinator = SyncCoordinator::new(vec![SyncGroup::with_shared_url(
            vec![1, 2],
            "https://example.com/live.m3u8",
        )]);
        assert_eq!(
            coordinator.shared_url(2),
            Some("https://example.com/live.m3u8")
        );
        assert_eq!(coordinator.shared_url(0), None);
    }
}
