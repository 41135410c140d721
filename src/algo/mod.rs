mod fairir;
mod lp;

pub use fairir::FairIR;
pub use lp::{ConstraintId, Relaxation, SolveStatus};

use crate::core::{Comparator, Matcher};
use thiserror::Error;

/// Registry of all available matchers.
#[linkme::distributed_slice]
pub static MATCHERS: [fn() -> Box<dyn Matcher>];

/// Errors reported by the matching solvers. None of them are retried
/// internally; they all unwind to the top-level matching call.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("relaxation infeasible at makespan {makespan}: {reason}")]
    Infeasible { makespan: f64, reason: String },
    #[error(
        "paper {paper} violated attribute constraint {name}: \
         expected {comparator} {bound}, found {actual} (values {values:?})"
    )]
    AttributeViolation {
        paper: usize,
        name: String,
        comparator: Comparator,
        bound: u32,
        actual: f64,
        values: Vec<f64>,
    },
    #[error("LP backend failure: {0}")]
    Backend(String),
    #[error("no solution available: latest solve status is {status:?}")]
    NotSolved { status: SolveStatus },
    #[error("rounding made no progress after {iterations} iterations")]
    NoProgress { iterations: usize },
}
