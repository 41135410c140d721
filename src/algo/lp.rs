use super::SolverError;
use crate::core::{AttributeConstraint, Comparator, Instance};
use ahash::{HashSet, HashSetExt};
use good_lp::{constraint, microlp, variable, variables, Expression, ResolutionError, Solution, SolverModel};

/// Identifier of one member of a constraint family in the relaxation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConstraintId {
    /// Maximum load of a reviewer.
    LoadUb(usize),
    /// Minimum load of a reviewer.
    LoadLb(usize),
    /// Exact number of reviews of a paper.
    Coverage(usize),
    /// Attribute constraint (by index) applied to a paper.
    Attribute(usize, usize),
    /// Fairness threshold of a paper.
    Makespan(usize),
}

/// Outcome of the latest relaxation solve.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SolveStatus {
    #[default]
    Unsolved,
    Optimal,
    Infeasible,
}

/// The LP relaxation of a matching instance.
///
/// Owns the decision variables `x[r][p]` in `[0, 1]` with their current
/// bounds, the active constraint set and the fairness threshold. The
/// model is lowered to a fresh `good_lp` problem on every solve; dropped
/// constraints and fixed bounds carry over, so the constraint set only
/// ever shrinks within one matching run.
pub struct Relaxation {
    weights: Vec<Vec<f64>>,
    loads: Vec<u32>,
    loads_lb: Vec<u32>,
    coverages: Vec<u32>,
    attributes: Vec<AttributeConstraint>,
    makespan: f64,
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
    dropped: HashSet<ConstraintId>,
    values: Vec<Vec<f64>>,
    status: SolveStatus,
}

impl Relaxation {
    /// Builds the relaxation of an instance with a zero fairness threshold.
    ///
    /// Conflicted pairs are created with an upper bound of zero and forced
    /// pairs with a lower bound of one, so the prohibitions hold regardless
    /// of the objective.
    #[must_use]
    pub fn new(instance: &Instance) -> Self {
        let n_rev = instance.n_reviewers();
        let n_pap = instance.n_papers();

        let mut lower = vec![vec![0.0; n_pap]; n_rev];
        let mut upper = vec![vec![1.0; n_pap]; n_rev];
        for (reviewer, row) in instance.constraints.iter().enumerate() {
            for (paper, &value) in row.iter().enumerate() {
                if value <= -1 {
                    upper[reviewer][paper] = 0.0;
                } else if value == 1 {
                    lower[reviewer][paper] = 1.0;
                }
            }
        }

        Self {
            weights: instance.weights(),
            loads: instance.loads.clone(),
            loads_lb: instance.effective_loads_lb(),
            coverages: instance.coverages.clone(),
            attributes: instance.attributes.clone(),
            makespan: 0.0,
            lower,
            upper,
            dropped: HashSet::new(),
            values: vec![vec![0.0; n_pap]; n_rev],
            status: SolveStatus::Unsolved,
        }
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

    /// Returns the current fairness threshold.
    #[must_use]
    pub const fn makespan(&self) -> f64 {
        self.makespan
    }

    /// A safe upper bound on any paper's weighted review total.
    #[must_use]
    pub fn makespan_upper_bound(&self) -> f64 {
        let max_weight = self
            .weights
            .iter()
            .flatten()
            .fold(0.0_f64, |max, &weight| max.max(weight));
        let max_coverage = self.coverages.iter().copied().max().unwrap_or_default();
        max_weight * f64::from(max_coverage)
    }

    /// Replaces the fairness threshold of the makespan constraint family.
    /// Makespan constraints dropped by the rounding engine stay dropped.
    pub fn set_makespan(&mut self, makespan: f64) {
        self.makespan = makespan;
        self.status = SolveStatus::Unsolved;
    }

    /// Removes a constraint from the relaxation for the rest of this run.
    pub fn drop_constraint(&mut self, id: ConstraintId) {
        if self.dropped.insert(id) {
            self.status = SolveStatus::Unsolved;
        }
    }

    /// Returns whether a constraint has been dropped.
    #[must_use]
    pub fn is_dropped(&self, id: ConstraintId) -> bool {
        self.dropped.contains(&id)
    }

    /// Permanently fixes a variable to the given value.
    pub fn fix(&mut self, reviewer: usize, paper: usize, value: f64) {
        self.lower[reviewer][paper] = value;
        self.upper[reviewer][paper] = value;
        self.status = SolveStatus::Unsolved;
    }

    /// Returns the bounds of a variable.
    #[must_use]
    pub fn bounds(&self, reviewer: usize, paper: usize) -> (f64, f64) {
        (self.lower[reviewer][paper], self.upper[reviewer][paper])
    }

    /// Returns the value of a variable in the latest solution.
    #[must_use]
    pub fn value(&self, reviewer: usize, paper: usize) -> f64 {
        self.values[reviewer][paper]
    }

    /// Returns the status of the latest solve.
    #[must_use]
    pub const fn status(&self) -> SolveStatus {
        self.status
    }

    /// Solves the relaxation with the current bounds and constraint set.
    ///
    /// Infeasibility is a regular outcome here (the makespan search probes
    /// thresholds that may be too high); any other backend failure is an
    /// error.
    ///
    /// # Errors
    /// - If the backend reports anything besides an optimum or infeasibility.
    pub fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        let n_rev = self.n_reviewers();
        let n_pap = self.n_papers();

        let mut vars = variables!();
        let mut xs = Vec::with_capacity(n_rev);
        for reviewer in 0..n_rev {
            let mut row = Vec::with_capacity(n_pap);
            for paper in 0..n_pap {
                let bounds = variable()
                    .min(self.lower[reviewer][paper])
                    .max(self.upper[reviewer][paper]);
                row.push(vars.add(bounds));
            }
            xs.push(row);
        }

        let mut objective = Expression::from(0.0);
        for (weights, variables) in self.weights.iter().zip(&xs) {
            for (&weight, &variable) in weights.iter().zip(variables) {
                objective += weight * variable;
            }
        }

        let mut problem = vars.maximise(objective).using(microlp);

        for (reviewer, &load) in self.loads.iter().enumerate() {
            if !self.is_dropped(ConstraintId::LoadUb(reviewer)) {
                let total = row_sum(&xs[reviewer]);
                problem = problem.with(constraint!(total <= f64::from(load)));
            }
            if !self.is_dropped(ConstraintId::LoadLb(reviewer)) {
                let total = row_sum(&xs[reviewer]);
                problem = problem.with(constraint!(total >= f64::from(self.loads_lb[reviewer])));
            }
        }

        for (paper, &coverage) in self.coverages.iter().enumerate() {
            if !self.is_dropped(ConstraintId::Coverage(paper)) {
                let total = column_sum(&xs, paper);
                problem = problem.with(constraint!(total == f64::from(coverage)));
            }
        }

        for (index, attribute) in self.attributes.iter().enumerate() {
            for paper in 0..n_pap {
                if self.is_dropped(ConstraintId::Attribute(index, paper)) {
                    continue;
                }
                let total = attribute
                    .members
                    .iter()
                    .fold(Expression::from(0.0), |sum, &member| sum + xs[member][paper]);
                let bound = f64::from(attribute.bound);
                problem = match attribute.comparator {
                    Comparator::Eq => problem.with(constraint!(total == bound)),
                    Comparator::Geq => problem.with(constraint!(total >= bound)),
                    Comparator::Leq => problem.with(constraint!(total <= bound)),
                };
            }
        }

        for paper in 0..n_pap {
            if self.is_dropped(ConstraintId::Makespan(paper)) {
                continue;
            }
            let total = (0..n_rev).fold(Expression::from(0.0), |sum, reviewer| {
                sum + self.weights[reviewer][paper] * xs[reviewer][paper]
            });
            problem = problem.with(constraint!(total >= self.makespan));
        }

        match problem.solve() {
            Ok(solution) => {
                for (values, variables) in self.values.iter_mut().zip(&xs) {
                    for (value, &variable) in values.iter_mut().zip(variables) {
                        *value = solution.value(variable);
                    }
                }
                self.status = SolveStatus::Optimal;
                Ok(SolveStatus::Optimal)
            }
            Err(ResolutionError::Infeasible) => {
                self.status = SolveStatus::Infeasible;
                Ok(SolveStatus::Infeasible)
            }
            Err(error) => Err(SolverError::Backend(error.to_string())),
        }
    }

    /// A diagnostic error for the latest infeasible solve, summarizing the
    /// active constraint families at the current threshold.
    #[must_use]
    pub fn infeasibility(&self) -> SolverError {
        let families = [
            ("load", self.loads.len() * 2),
            ("coverage", self.coverages.len()),
            ("attribute", self.attributes.len() * self.n_papers()),
            ("makespan", self.n_papers()),
        ];
        let families = families
            .iter()
            .map(|(name, total)| format!("{total} {name}"))
            .collect::<Vec<_>>()
            .join(", ");
        SolverError::Infeasible {
            makespan: self.makespan,
            reason: format!(
                "constraint families: {families}; {} dropped so far",
                self.dropped.len()
            ),
        }
    }

    /// Returns the latest solution as a reviewers x papers matrix.
    ///
    /// # Errors
    /// - If the relaxation has not been solved to optimality.
    pub fn solution_matrix(&self) -> Result<Vec<Vec<f64>>, SolverError> {
        if self.status == SolveStatus::Optimal {
            Ok(self.values.clone())
        } else {
            Err(SolverError::NotSolved {
                status: self.status,
            })
        }
    }
}

fn row_sum(variables: &[good_lp::Variable]) -> Expression {
    variables
        .iter()
        .fold(Expression::from(0.0), |sum, &variable| sum + variable)
}

fn column_sum(xs: &[Vec<good_lp::Variable>], paper: usize) -> Expression {
    xs.iter()
        .fold(Expression::from(0.0), |sum, row| sum + row[paper])
}
