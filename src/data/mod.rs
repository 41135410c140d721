mod run;

pub use run::*;

use crate::core::{AttributeConstraint, Instance, InstanceError};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Reads a JSON value from the reader.
///
/// # Errors
/// - If the input is not valid JSON for the expected type.
pub fn deserialize<T: DeserializeOwned>(reader: &mut impl BufRead) -> Result<T> {
    Ok(serde_json::from_reader(reader)?)
}

/// Serializes a value to a JSON string.
///
/// # Errors
/// - If the value cannot be serialized.
pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// A row of the aggregate-score table: the affinity of a reviewer for a paper.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScoreRow {
    pub paper: usize,
    pub reviewer: usize,
    pub score: f64,
}

/// A row of the constraint table: -1 forbids the pair, 1 forces it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
pub struct ConstraintRow {
    pub paper: usize,
    pub reviewer: usize,
    pub constraint: i8,
}

/// The flat tables produced by the data-preparation layer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Tables {
    pub n_reviewers: usize,
    pub n_papers: usize,
    pub scores: Vec<ScoreRow>,
    pub constraints: Vec<ConstraintRow>,
    pub loads: Vec<u32>,
    pub loads_lb: Vec<u32>,
    pub coverages: Vec<u32>,
    #[serde(default)]
    pub attributes: Vec<AttributeConstraint>,
    #[serde(default)]
    pub allow_zero_score_assignments: bool,
}

impl TryFrom<Tables> for Instance {
    type Error = InstanceError;

    /// Builds the dense matching instance from the flat tables, rejecting
    /// out-of-range ids and pairs carrying both a conflict and a forced
    /// assignment.
    fn try_from(tables: Tables) -> Result<Self, Self::Error> {
        let mut affinities = vec![vec![0.0; tables.n_papers]; tables.n_reviewers];
        let mut constraints = vec![vec![0_i8; tables.n_papers]; tables.n_reviewers];

        for row in &tables.scores {
            check_pair(&tables, row.reviewer, row.paper)?;
            affinities[row.reviewer][row.paper] = row.score;
        }

        for row in &tables.constraints {
            check_pair(&tables, row.reviewer, row.paper)?;
            if !(-1..=1).contains(&row.constraint) {
                return Err(InstanceError::InvalidConstraint {
                    reviewer: row.reviewer,
                    paper: row.paper,
                    value: row.constraint,
                });
            }
            let cell = &mut constraints[row.reviewer][row.paper];
            if *cell != 0 && *cell != row.constraint {
                return Err(InstanceError::ConflictingRows {
                    reviewer: row.reviewer,
                    paper: row.paper,
                });
            }
            *cell = row.constraint;
        }

        let mut instance = Self::new(
            affinities,
            constraints,
            tables.loads,
            tables.loads_lb,
            tables.coverages,
        )
        .with_attributes(tables.attributes);
        if tables.allow_zero_score_assignments {
            instance = instance.with_zero_score_assignments();
        }
        instance.validate()?;
        Ok(instance)
    }
}

fn check_pair(tables: &Tables, reviewer: usize, paper: usize) -> Result<(), InstanceError> {
    if reviewer >= tables.n_reviewers {
        return Err(InstanceError::IndexOutOfRange {
            what: "reviewer",
            index: reviewer,
        });
    }
    if paper >= tables.n_papers {
        return Err(InstanceError::IndexOutOfRange {
            what: "paper",
            index: paper,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn tables() -> Tables {
        Tables {
            n_reviewers: 2,
            n_papers: 2,
            scores: vec![
                ScoreRow {
                    paper: 0,
                    reviewer: 0,
                    score: 0.9,
                },
                ScoreRow {
                    paper: 1,
                    reviewer: 1,
                    score: 0.8,
                },
            ],
            constraints: vec![ConstraintRow {
                paper: 1,
                reviewer: 0,
                constraint: -1,
            }],
            loads: vec![1, 1],
            loads_lb: vec![0, 0],
            coverages: vec![1, 1],
            ..Tables::default()
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn tables_build_a_dense_instance() -> anyhow::Result<()> {
        let instance = Instance::try_from(tables())?;

        assert_eq!(instance.n_reviewers(), 2);
        assert_eq!(instance.n_papers(), 2);
        assert_eq!(instance.affinities[0][0], 0.9);
        assert_eq!(instance.affinities[0][1], 0.0);
        assert_eq!(instance.constraints[0][1], -1);
        Ok(())
    }

    #[test]
    fn out_of_range_reviewer_is_rejected() {
        let mut bad = tables();
        bad.scores[0].reviewer = 5;
        assert!(matches!(
            Instance::try_from(bad),
            Err(InstanceError::IndexOutOfRange {
                what: "reviewer",
                index: 5
            })
        ));
    }

    #[test]
    fn conflicting_constraint_rows_are_rejected() {
        let mut bad = tables();
        bad.constraints.push(ConstraintRow {
            paper: 1,
            reviewer: 0,
            constraint: 1,
        });
        assert!(matches!(
            Instance::try_from(bad),
            Err(InstanceError::ConflictingRows {
                reviewer: 0,
                paper: 1
            })
        ));
    }

    #[test]
    fn duplicate_identical_rows_are_allowed() -> anyhow::Result<()> {
        let mut tables = tables();
        tables.constraints.push(ConstraintRow {
            paper: 1,
            reviewer: 0,
            constraint: -1,
        });
        let instance = Instance::try_from(tables)?;
        assert_eq!(instance.constraints[0][1], -1);
        Ok(())
    }
}
