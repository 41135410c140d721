use ahash::HashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Comparator of an attribute constraint.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Serialize, PartialEq)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Geq,
    #[serde(rename = "<=")]
    Leq,
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Geq => ">=",
            Self::Leq => "<=",
        })
    }
}

/// Bound on the number of reviewers from a named subgroup assigned to each paper.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AttributeConstraint {
    pub name: String,
    pub bound: u32,
    pub comparator: Comparator,
    pub members: HashSet<usize>,
}

/// Errors raised when an instance is malformed.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("expected {expected} entries of {what}, found {found}")]
    Dimension {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("constraint value {value} for reviewer {reviewer} and paper {paper} is not -1, 0 or 1")]
    InvalidConstraint {
        reviewer: usize,
        paper: usize,
        value: i8,
    },
    #[error("attribute constraint {name} references reviewer {reviewer} out of range")]
    MemberOutOfRange { name: String, reviewer: usize },
    #[error("reviewer {reviewer} has minimum load {minimum} above maximum load {maximum}")]
    LoadWindow {
        reviewer: usize,
        minimum: u32,
        maximum: u32,
    },
    #[error("{what} index {index} out of range")]
    IndexOutOfRange { what: &'static str, index: usize },
    #[error("conflicting constraint rows for reviewer {reviewer} and paper {paper}")]
    ConflictingRows { reviewer: usize, paper: usize },
}

/// An instance of the reviewer-paper matching problem.
///
/// Rows of `affinities` and `constraints` correspond to reviewers and
/// columns to papers. A constraint of -1 forbids the pair, 1 forces it
/// and 0 leaves it free.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Instance {
    pub affinities: Vec<Vec<f64>>,
    pub constraints: Vec<Vec<i8>>,
    pub loads: Vec<u32>,
    pub loads_lb: Vec<u32>,
    pub coverages: Vec<u32>,
    #[serde(default)]
    pub attributes: Vec<AttributeConstraint>,
    #[serde(default)]
    pub allow_zero_score_assignments: bool,
}

impl Instance {
    /// Creates a new instance without attribute constraints.
    #[must_use]
    pub const fn new(
        affinities: Vec<Vec<f64>>,
        constraints: Vec<Vec<i8>>,
        loads: Vec<u32>,
        loads_lb: Vec<u32>,
        coverages: Vec<u32>,
    ) -> Self {
        Self {
            affinities,
            constraints,
            loads,
            loads_lb,
            coverages,
            attributes: Vec::new(),
            allow_zero_score_assignments: false,
        }
    }

    /// Adds attribute constraints to the instance.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<AttributeConstraint>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Allows assigning reviewers to papers they have no known affinity with.
    #[must_use]
    pub const fn with_zero_score_assignments(mut self) -> Self {
        self.allow_zero_score_assignments = true;
        self
    }

    /// Returns the number of reviewers.
    #[must_use]
    pub fn n_reviewers(&self) -> usize {
        self.loads.len()
    }

    /// Returns the number of papers.
    #[must_use]
    pub fn n_papers(&self) -> usize {
        self.coverages.len()
    }

    /// Checks the dimensions and value ranges of the instance.
    ///
    /// # Errors
    /// - If any matrix row count or length disagrees with the capacities.
    /// - If a constraint value is outside {-1, 0, 1}.
    /// - If an attribute constraint references a reviewer out of range.
    /// - If a reviewer's minimum load exceeds its maximum load.
    pub fn validate(&self) -> Result<(), InstanceError> {
        let n_rev = self.n_reviewers();
        let n_pap = self.n_papers();

        check_dimension("affinity rows", n_rev, self.affinities.len())?;
        check_dimension("constraint rows", n_rev, self.constraints.len())?;
        check_dimension("minimum loads", n_rev, self.loads_lb.len())?;

        for row in &self.affinities {
            check_dimension("affinity columns", n_pap, row.len())?;
        }

        for (reviewer, row) in self.constraints.iter().enumerate() {
            check_dimension("constraint columns", n_pap, row.len())?;
            for (paper, &value) in row.iter().enumerate() {
                if !(-1..=1).contains(&value) {
                    return Err(InstanceError::InvalidConstraint {
                        reviewer,
                        paper,
                        value,
                    });
                }
            }
        }

        for (reviewer, (&minimum, &maximum)) in self.loads_lb.iter().zip(&self.loads).enumerate() {
            if minimum > maximum {
                return Err(InstanceError::LoadWindow {
                    reviewer,
                    minimum,
                    maximum,
                });
            }
        }

        for attribute in &self.attributes {
            if let Some(&reviewer) = attribute.members.iter().find(|&&member| member >= n_rev) {
                return Err(InstanceError::MemberOutOfRange {
                    name: attribute.name.clone(),
                    reviewer,
                });
            }
        }

        Ok(())
    }

    /// Derives the weight matrix used by the relaxation objective.
    /// Conflicted pairs carry their negative constraint value instead of
    /// the affinity score.
    #[must_use]
    pub fn weights(&self) -> Vec<Vec<f64>> {
        self.affinities
            .iter()
            .zip(&self.constraints)
            .map(|(affinities, constraints)| {
                affinities
                    .iter()
                    .zip(constraints)
                    .map(|(&affinity, &constraint)| {
                        if constraint <= -1 {
                            f64::from(constraint)
                        } else {
                            affinity
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Returns the minimum loads actually enforced by the relaxation.
    ///
    /// Unless zero-score assignments are allowed, reviewers without a
    /// non-zero affinity to any unconstrained paper get a minimum load
    /// of zero so the coverage constraints stay satisfiable.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn effective_loads_lb(&self) -> Vec<u32> {
        if self.allow_zero_score_assignments {
            return self.loads_lb.clone();
        }

        let mut zeroed = 0usize;
        let loads_lb = self
            .loads_lb
            .iter()
            .zip(self.affinities.iter().zip(&self.constraints))
            .map(|(&minimum, (affinities, constraints))| {
                let has_affinity = affinities
                    .iter()
                    .zip(constraints)
                    .any(|(&affinity, &constraint)| constraint == 0 && affinity != 0.0);
                if has_affinity {
                    minimum
                } else {
                    zeroed += 1;
                    0
                }
            })
            .collect();

        if zeroed > 0 {
            log::debug!(
                "setting minimum load for {zeroed} reviewers to 0 \
                 because they have no known affinity with any paper"
            );
        }

        loads_lb
    }
}

fn check_dimension(what: &'static str, expected: usize, found: usize) -> Result<(), InstanceError> {
    if expected == found {
        Ok(())
    } else {
        Err(InstanceError::Dimension {
            what,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ahash::HashSetExt;

    fn instance() -> Instance {
        Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8]],
            vec![vec![0, -1], vec![0, 0]],
            vec![1, 1],
            vec![0, 0],
            vec![1, 1],
        )
    }

    #[test]
    fn instance_should_serialize() -> anyhow::Result<()> {
        let instance = instance();

        let serialized = crate::data::to_string(&instance)?;
        let mut reader = std::io::Cursor::new(serialized);
        let deserialized: Instance = crate::data::deserialize(&mut reader)?;

        assert_eq!(instance, deserialized);

        Ok(())
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn weights_mask_conflicts() {
        let weights = instance().weights();
        assert_eq!(weights[0][0], 0.9);
        assert_eq!(weights[0][1], -1.0);
        assert_eq!(weights[1][1], 0.8);
    }

    #[test]
    fn minimum_load_zeroed_without_affinity() {
        let mut instance = Instance::new(
            vec![vec![0.0, 0.0], vec![0.2, 0.8]],
            vec![vec![0, 0], vec![0, 0]],
            vec![2, 2],
            vec![1, 1],
            vec![1, 1],
        );
        assert_eq!(instance.effective_loads_lb(), vec![0, 1]);

        instance = instance.with_zero_score_assignments();
        assert_eq!(instance.effective_loads_lb(), vec![1, 1]);
    }

    #[test]
    fn minimum_load_zeroed_when_only_affinity_is_conflicted() {
        let instance = Instance::new(
            vec![vec![0.9, 0.0]],
            vec![vec![-1, 0]],
            vec![1],
            vec![1],
            vec![1, 0],
        );
        assert_eq!(instance.effective_loads_lb(), vec![0]);
    }

    #[test]
    fn validate_rejects_bad_dimensions() {
        let mut bad = instance();
        bad.affinities.pop();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_constraint_value() {
        let mut bad = instance();
        bad.constraints[0][0] = 2;
        assert!(matches!(
            bad.validate(),
            Err(InstanceError::InvalidConstraint {
                reviewer: 0,
                paper: 0,
                value: 2
            })
        ));
    }

    #[test]
    fn validate_rejects_member_out_of_range() {
        let mut members = HashSet::new();
        members.insert(7);
        let bad = instance().with_attributes(vec![AttributeConstraint {
            name: "Seniority".into(),
            bound: 1,
            comparator: Comparator::Geq,
            members,
        }]);
        assert!(matches!(
            bad.validate(),
            Err(InstanceError::MemberOutOfRange { reviewer: 7, .. })
        ));
    }

    #[test]
    fn validate_rejects_inverted_load_window() {
        let mut bad = instance();
        bad.loads_lb[1] = 5;
        assert!(matches!(
            bad.validate(),
            Err(InstanceError::LoadWindow { reviewer: 1, .. })
        ));
    }

    #[test]
    fn validate_accepts_well_formed_instance() -> anyhow::Result<()> {
        instance().validate()?;
        Ok(())
    }
}
