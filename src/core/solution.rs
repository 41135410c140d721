use super::{Comparator, Instance};
use crate::cast_usize;
use serde::{Deserialize, Serialize};

/// A single assigned review: the reviewer and their affinity for the paper.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReviewerScore {
    pub reviewer: usize,
    pub score: f64,
}

/// Assignment of reviewers to papers. Entry `p` holds the reviewers of paper `p`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Assignment {
    papers: Vec<Vec<ReviewerScore>>,
}

impl Assignment {
    /// Creates an empty assignment for the given number of papers.
    #[must_use]
    pub fn new(n_papers: usize) -> Self {
        Self {
            papers: vec![Vec::new(); n_papers],
        }
    }

    /// Builds an assignment from an integral reviewers x papers solution matrix.
    /// A variable counts as assigned when its value exceeds one half, which
    /// tolerates the floating-point output of the LP backend.
    #[must_use]
    pub fn from_matrix(instance: &Instance, matrix: &[Vec<f64>]) -> Self {
        let mut assignment = Self::new(instance.n_papers());
        for (reviewer, row) in matrix.iter().enumerate() {
            for (paper, &value) in row.iter().enumerate() {
                if value > 0.5 {
                    assignment.assign(paper, reviewer, instance.affinities[reviewer][paper]);
                }
            }
        }
        assignment
    }

    /// Assigns a reviewer to a paper.
    pub fn assign(&mut self, paper: usize, reviewer: usize, score: f64) {
        self.papers[paper].push(ReviewerScore { reviewer, score });
    }

    /// Returns the reviewers assigned to a paper.
    #[must_use]
    pub fn paper(&self, paper: usize) -> &[ReviewerScore] {
        &self.papers[paper]
    }

    /// Returns the assigned reviewers of every paper.
    #[must_use]
    pub fn papers(&self) -> &[Vec<ReviewerScore>] {
        &self.papers
    }

    /// Returns whether the reviewer is assigned to the paper.
    #[must_use]
    pub fn contains(&self, paper: usize, reviewer: usize) -> bool {
        self.papers[paper]
            .iter()
            .any(|entry| entry.reviewer == reviewer)
    }

    /// Returns the number of papers assigned to a reviewer.
    #[must_use]
    pub fn reviewer_load(&self, reviewer: usize) -> usize {
        self.papers
            .iter()
            .filter(|paper| paper.iter().any(|entry| entry.reviewer == reviewer))
            .count()
    }

    /// Returns the total affinity of all assigned reviews.
    #[must_use]
    pub fn total_affinity(&self) -> f64 {
        self.papers
            .iter()
            .flatten()
            .map(|entry| entry.score)
            .sum()
    }

    /// Verifies the assignment against the instance: exact coverage per
    /// paper, load windows per reviewer, no conflicted pair assigned and
    /// every attribute constraint satisfied.
    #[must_use]
    pub fn verify(&self, instance: &Instance) -> bool {
        if self.papers.len() != instance.n_papers() {
            return false;
        }

        for (paper, entries) in self.papers.iter().enumerate() {
            let coverage = cast_usize(u64::from(instance.coverages[paper]));
            if entries.len() != coverage {
                log::debug!("paper {paper} has {} of {coverage} reviewers", entries.len());
                return false;
            }
        }

        let loads_lb = instance.effective_loads_lb();
        for (reviewer, (&maximum, &minimum)) in instance.loads.iter().zip(&loads_lb).enumerate() {
            let load = self.reviewer_load(reviewer);
            if load > cast_usize(u64::from(maximum)) || load < cast_usize(u64::from(minimum)) {
                log::debug!("reviewer {reviewer} load {load} outside [{minimum}, {maximum}]");
                return false;
            }
        }

        for (paper, entries) in self.papers.iter().enumerate() {
            for entry in entries {
                if instance.constraints[entry.reviewer][paper] == -1 {
                    log::debug!("conflicted pair ({}, {paper}) assigned", entry.reviewer);
                    return false;
                }
            }
        }

        for attribute in &instance.attributes {
            let bound = cast_usize(u64::from(attribute.bound));
            for (paper, entries) in self.papers.iter().enumerate() {
                let count = entries
                    .iter()
                    .filter(|entry| attribute.members.contains(&entry.reviewer))
                    .count();
                let obeyed = match attribute.comparator {
                    Comparator::Eq => count == bound,
                    Comparator::Geq => count >= bound,
                    Comparator::Leq => count <= bound,
                };
                if !obeyed {
                    log::debug!(
                        "paper {paper} has {count} reviewers of type {} (required {} {})",
                        attribute.name,
                        attribute.comparator,
                        attribute.bound
                    );
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::AttributeConstraint;
    use ahash::{HashSet, HashSetExt};

    fn instance() -> Instance {
        Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.5, 0.5]],
            vec![vec![0, 0], vec![0, 0], vec![0, 0]],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![1, 1],
        )
    }

    #[test]
    fn from_matrix_thresholds_values() {
        let instance = instance();
        let matrix = vec![
            vec![0.999_999_9, 0.0],
            vec![0.000_000_1, 1.0],
            vec![0.0, 0.0],
        ];
        let assignment = Assignment::from_matrix(&instance, &matrix);

        assert!(assignment.contains(0, 0));
        assert!(assignment.contains(1, 1));
        assert!(!assignment.contains(0, 1));
        assert!(assignment.verify(&instance));
        assert!((assignment.total_affinity() - 1.7).abs() < 1e-9);
    }

    #[test]
    fn verify_rejects_wrong_coverage() {
        let instance = instance();
        let mut assignment = Assignment::new(2);
        assignment.assign(0, 0, 0.9);
        assert!(!assignment.verify(&instance));
    }

    #[test]
    fn verify_rejects_conflicted_pair() {
        let mut instance = instance();
        instance.constraints[0][0] = -1;
        let mut assignment = Assignment::new(2);
        assignment.assign(0, 0, 0.9);
        assignment.assign(1, 1, 0.8);
        assert!(!assignment.verify(&instance));
    }

    #[test]
    fn verify_rejects_overloaded_reviewer() {
        let instance = instance();
        let mut assignment = Assignment::new(2);
        assignment.assign(0, 0, 0.9);
        assignment.assign(1, 0, 0.1);
        assert!(!assignment.verify(&instance));
    }

    #[test]
    fn verify_checks_attribute_bounds() {
        let mut members = HashSet::new();
        members.insert(0);
        members.insert(1);
        let instance = instance().with_attributes(vec![AttributeConstraint {
            name: "Senior".into(),
            bound: 1,
            comparator: Comparator::Eq,
            members,
        }]);

        let mut assignment = Assignment::new(2);
        assignment.assign(0, 0, 0.9);
        assignment.assign(1, 1, 0.8);
        assert!(assignment.verify(&instance));

        let mut violating = Assignment::new(2);
        violating.assign(0, 2, 0.5);
        violating.assign(1, 1, 0.8);
        assert!(!violating.verify(&instance));
    }
}
