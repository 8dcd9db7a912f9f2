//! User-driven cluster merging.
//!
//! Merges are kept as disjoint groups of labels. Every group is represented
//! by its smallest label, so remapping a firings table through
//! [`ClusterMerge::label_map`] collapses each group onto one cluster.
//! Label `0` (unclassified) and negative labels never take part in a merge.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Disjoint groups of merged cluster labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<Vec<i32>>", into = "Vec<Vec<i32>>")
)]
pub struct ClusterMerge {
    /// Groups of at least two labels, ordered by representative.
    groups: Vec<BTreeSet<i32>>,
}

impl ClusterMerge {
    /// Creates an empty merge (every label represents itself).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `labels` into one group, absorbing any group that already
    /// contains one of them.
    pub fn merge(&mut self, labels: &[i32]) {
        let mut merged: BTreeSet<i32> = labels.iter().copied().filter(|&k| k > 0).collect();
        if merged.is_empty() {
            return;
        }
        self.groups.retain(|group| {
            if group.is_disjoint(&merged) {
                true
            } else {
                merged.extend(group.iter().copied());
                false
            }
        });
        if merged.len() >= 2 {
            self.groups.push(merged);
        }
        self.groups.sort_by_key(|group| group.first().copied());
    }

    /// Removes each of `labels` from its group.
    ///
    /// Groups left with a single label dissolve.
    pub fn unmerge(&mut self, labels: &[i32]) {
        for group in &mut self.groups {
            for label in labels {
                group.remove(label);
            }
        }
        self.groups.retain(|group| group.len() >= 2);
        self.groups.sort_by_key(|group| group.first().copied());
    }

    /// Representative (smallest label) of `k`'s group, or `k` itself.
    #[must_use]
    pub fn representative_label(&self, k: i32) -> i32 {
        self.group_of(k)
            .and_then(|group| group.first().copied())
            .unwrap_or(k)
    }

    /// All labels sharing `k`'s representative, sorted.
    #[must_use]
    pub fn labels_with_same_representative(&self, k: i32) -> Vec<i32> {
        self.group_of(k)
            .map_or_else(|| vec![k], |group| group.iter().copied().collect())
    }

    /// Representatives of all labels in `labels`, sorted and deduplicated.
    #[must_use]
    pub fn representative_labels(&self, labels: &[i32]) -> Vec<i32> {
        let reps: BTreeSet<i32> = labels
            .iter()
            .map(|&k| self.representative_label(k))
            .collect();
        reps.into_iter().collect()
    }

    /// Mapping from every label in `0..=max_label` to its representative.
    ///
    /// Index 0 maps to 0.
    #[must_use]
    pub fn label_map(&self, max_label: i32) -> Vec<i32> {
        (0..=max_label.max(0))
            .map(|k| if k == 0 { 0 } else { self.representative_label(k) })
            .collect()
    }

    /// Returns true if labels `a` and `b` share a representative.
    #[must_use]
    pub fn are_merged(&self, a: i32, b: i32) -> bool {
        self.representative_label(a) == self.representative_label(b)
    }

    /// Current merge groups.
    #[must_use]
    pub fn groups(&self) -> &[BTreeSet<i32>] {
        &self.groups
    }

    /// Returns true if nothing is merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Removes all merges.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    fn group_of(&self, k: i32) -> Option<&BTreeSet<i32>> {
        self.groups.iter().find(|group| group.contains(&k))
    }
}

impl From<Vec<Vec<i32>>> for ClusterMerge {
    fn from(groups: Vec<Vec<i32>>) -> Self {
        let mut merge = Self::new();
        for group in groups {
            merge.merge(&group);
        }
        merge
    }
}

impl From<ClusterMerge> for Vec<Vec<i32>> {
    fn from(merge: ClusterMerge) -> Self {
        merge
            .groups
            .into_iter()
            .map(|group| group.into_iter().collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmerged_label_represents_itself() {
        let merge = ClusterMerge::new();
        assert_eq!(merge.representative_label(7), 7);
        assert_eq!(merge.labels_with_same_representative(7), vec![7]);
    }

    #[test]
    fn test_merge_uses_minimum_label() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[5, 3]);
        assert_eq!(merge.representative_label(5), 3);
        assert_eq!(merge.representative_label(3), 3);
        assert!(merge.are_merged(3, 5));
    }

    #[test]
    fn test_representative_is_idempotent() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[4, 9, 6]);
        merge.merge(&[2, 11]);
        for k in 1..=12 {
            let once = merge.representative_label(k);
            assert_eq!(merge.representative_label(once), once);
        }
    }

    #[test]
    fn test_overlapping_merges_union() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[1, 2]);
        merge.merge(&[2, 3]);
        merge.merge(&[7, 8]);
        assert_eq!(merge.labels_with_same_representative(3), vec![1, 2, 3]);
        assert_eq!(merge.groups().len(), 2);

        merge.merge(&[3, 8]);
        assert_eq!(merge.groups().len(), 1);
        assert_eq!(merge.representative_label(7), 1);
    }

    #[test]
    fn test_unmerge_removes_label() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[1, 2, 3]);
        merge.unmerge(&[1]);
        assert_eq!(merge.representative_label(1), 1);
        assert_eq!(merge.representative_label(3), 2);

        merge.unmerge(&[2]);
        assert!(merge.is_empty());
        assert_eq!(merge.representative_label(3), 3);
    }

    #[test]
    fn test_label_map() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[2, 4]);
        assert_eq!(merge.label_map(5), vec![0, 1, 2, 3, 2, 5]);
        assert_eq!(merge.representative_labels(&[4, 2, 5]), vec![2, 5]);
    }

    #[test]
    fn test_unclassified_never_merged() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[0, 3]);
        assert!(merge.is_empty());
        assert_eq!(merge.label_map(0), vec![0]);
    }

    #[test]
    fn test_from_groups_normalises_overlap() {
        let merge = ClusterMerge::from(vec![vec![1, 2], vec![2, 5], vec![9]]);
        assert_eq!(merge.groups().len(), 1);
        let groups: Vec<Vec<i32>> = merge.into();
        assert_eq!(groups, vec![vec![1, 2, 5]]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip_as_group_list() {
        let mut merge = ClusterMerge::new();
        merge.merge(&[3, 1]);
        let json = serde_json::to_string(&merge).unwrap();
        assert_eq!(json, "[[1,3]]");
        let back: ClusterMerge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, merge);
    }
}
