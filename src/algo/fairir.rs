#![allow(clippy::float_cmp)]
use super::{ConstraintId, Relaxation, SolveStatus, SolverError};
use crate::cast_usize;
use crate::core::{Assignment, AttributeConstraint, Comparator, Instance, Matcher};

/// Iterations of the makespan binary search. The achievable precision is
/// roughly `makespan_upper_bound / 2^10`.
const MAKESPAN_ITERATIONS: usize = 10;

/// Tolerance for treating a floating-point LP value as 0 or 1.
const INTEGRALITY_EPS: f64 = 1e-6;

/// FairIR matcher: fair reviewer-paper matching via iterative relaxation.
///
/// Binary-searches the highest feasible fairness threshold (the minimum
/// weighted affinity guaranteed to every paper), then drives the LP
/// relaxation to an integral solution by fixing resolved variables and
/// dropping makespan or load constraints on small fractional supports.
#[derive(Clone, Copy, Debug, Default)]
pub struct FairIR {
    threshold: f64,
}

impl FairIR {
    /// Creates a matcher with a fixed fairness threshold.
    /// A non-positive threshold means the highest feasible one is searched.
    #[must_use]
    pub const fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Matcher for FairIR {
    fn matching(&mut self, instance: &Instance) -> anyhow::Result<Assignment> {
        instance.validate()?;
        Ok(solve(instance, self.threshold)?)
    }

    fn name(&self) -> &'static str {
        "FairIR"
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::MATCHERS)]
static INSTANCE: fn() -> Box<dyn Matcher> = || Box::new(FairIR::default());

fn solve(instance: &Instance, threshold: f64) -> Result<Assignment, SolverError> {
    if instance.n_papers() == 0 {
        return Ok(Assignment::new(0));
    }
    if instance.n_reviewers() == 0 {
        return if instance.coverages.iter().all(|&coverage| coverage == 0) {
            Ok(Assignment::new(instance.n_papers()))
        } else {
            Err(SolverError::Infeasible {
                makespan: threshold.max(0.0),
                reason: "no reviewers available".into(),
            })
        };
    }

    let mut relaxation = Relaxation::new(instance);
    let makespan = if threshold > 0.0 {
        log::debug!("using configured fairness threshold {threshold}");
        threshold
    } else {
        let makespan = find_makespan(&mut relaxation)?;
        log::debug!("found fairness threshold {makespan}");
        makespan
    };
    relaxation.set_makespan(makespan);

    round_fractional(&mut relaxation, &instance.attributes)?;

    let matrix = relaxation.solution_matrix()?;
    Ok(Assignment::from_matrix(instance, &matrix))
}

/// Binary search for the highest fairness threshold with a feasible
/// relaxation. Starts at the safe upper bound, shrinks the interval from
/// the top on infeasibility and grows it from the bottom otherwise.
/// Returns 0 when no probed threshold was feasible.
fn find_makespan(relaxation: &mut Relaxation) -> Result<f64, SolverError> {
    let mut mn = 0.0;
    let mut mx = relaxation.makespan_upper_bound();
    let mut ms = mx;
    let mut best = None;

    relaxation.set_makespan(ms);
    let mut status = relaxation.solve()?;

    for iteration in 0..MAKESPAN_ITERATIONS {
        log::debug!("makespan search iteration {iteration}: ms {ms}, status {status:?}");
        if status == SolveStatus::Infeasible {
            mx = ms;
            ms -= (ms - mn) / 2.0;
        } else {
            best = Some(ms);
            mn = ms;
            ms += (mx - ms) / 2.0;
        }
        relaxation.set_makespan(ms);
        status = relaxation.solve()?;
    }

    Ok(best.unwrap_or(0.0))
}

/// Rounds a fractional solution to an integral one.
///
/// Per iteration: solve the relaxation, validate the attribute constraints
/// against the (possibly fractional) solution, fix resolved variables, then
/// drop the makespan constraint of every paper with exactly 2 or 3
/// fractional assignments or, failing that, the load constraints of every
/// reviewer with exactly 2 fractional assignments. Each dropped constraint
/// strictly shrinks the fractional support, so the loop is bounded by the
/// number of variables.
fn round_fractional(
    relaxation: &mut Relaxation,
    attributes: &[AttributeConstraint],
) -> Result<(), SolverError> {
    let n_rev = relaxation.n_reviewers();
    let n_pap = relaxation.n_papers();
    let mut ledger = vec![vec![-1.0; n_pap]; n_rev];

    for _ in 0..n_rev * n_pap {
        if relaxation.solve()? != SolveStatus::Optimal {
            return Err(relaxation.infeasibility());
        }

        validate_attributes(relaxation, attributes)?;

        if is_integral(relaxation) {
            return Ok(());
        }

        let mut frac_by_paper = vec![0_usize; n_pap];
        let mut frac_by_reviewer = vec![0_usize; n_rev];

        for reviewer in 0..n_rev {
            for paper in 0..n_pap {
                let value = relaxation.value(reviewer, paper);
                if value.abs() <= INTEGRALITY_EPS {
                    if ledger[reviewer][paper] != 0.0
                        && may_fix_to_zero(reviewer, paper, attributes, &ledger)
                    {
                        relaxation.fix(reviewer, paper, 0.0);
                        ledger[reviewer][paper] = 0.0;
                    }
                } else if (value - 1.0).abs() <= INTEGRALITY_EPS {
                    if ledger[reviewer][paper] != 1.0
                        && may_fix_to_one(reviewer, paper, attributes, &ledger)
                    {
                        relaxation.fix(reviewer, paper, 1.0);
                        ledger[reviewer][paper] = 1.0;
                    }
                } else {
                    frac_by_paper[paper] += 1;
                    frac_by_reviewer[reviewer] += 1;
                    ledger[reviewer][paper] = value;
                }
            }
        }

        let mut removed = false;
        for (paper, &count) in frac_by_paper.iter().enumerate() {
            if (count == 2 || count == 3) && !relaxation.is_dropped(ConstraintId::Makespan(paper)) {
                log::debug!(
                    "dropping makespan constraint of paper {paper} \
                     with {count} fractional assignments"
                );
                relaxation.drop_constraint(ConstraintId::Makespan(paper));
                removed = true;
            }
        }

        if !removed {
            for (reviewer, &count) in frac_by_reviewer.iter().enumerate() {
                if count == 2 {
                    log::debug!(
                        "dropping load constraints of reviewer {reviewer} \
                         with 2 fractional assignments"
                    );
                    relaxation.drop_constraint(ConstraintId::LoadUb(reviewer));
                    relaxation.drop_constraint(ConstraintId::LoadLb(reviewer));
                }
            }
        }
    }

    Err(SolverError::NoProgress {
        iterations: n_rev * n_pap,
    })
}

/// Checks every attribute constraint against the solved relaxation. A
/// violation here means the formulation itself is broken and is never
/// silently tolerated.
fn validate_attributes(
    relaxation: &Relaxation,
    attributes: &[AttributeConstraint],
) -> Result<(), SolverError> {
    for attribute in attributes {
        for paper in 0..relaxation.n_papers() {
            let values: Vec<f64> = attribute
                .members
                .iter()
                .map(|&member| relaxation.value(member, paper))
                .collect();
            let actual: f64 = values.iter().sum();
            let bound = f64::from(attribute.bound);
            let obeyed = match attribute.comparator {
                Comparator::Eq => (actual - bound).abs() <= INTEGRALITY_EPS,
                Comparator::Geq => actual >= bound - INTEGRALITY_EPS,
                Comparator::Leq => actual <= bound + INTEGRALITY_EPS,
            };
            if !obeyed {
                return Err(SolverError::AttributeViolation {
                    paper,
                    name: attribute.name.clone(),
                    comparator: attribute.comparator,
                    bound: attribute.bound,
                    actual,
                    values,
                });
            }
        }
    }
    Ok(())
}

fn is_integral(relaxation: &Relaxation) -> bool {
    (0..relaxation.n_reviewers()).all(|reviewer| {
        (0..relaxation.n_papers()).all(|paper| {
            let value = relaxation.value(reviewer, paper);
            value.abs() <= INTEGRALITY_EPS || (value - 1.0).abs() <= INTEGRALITY_EPS
        })
    })
}

/// A variable may be fixed to 0 only when every `==`/`>=` attribute
/// constraint whose members include its reviewer is already met by
/// assignments fixed to 1, so the fix cannot strand the bound.
fn may_fix_to_zero(
    reviewer: usize,
    paper: usize,
    attributes: &[AttributeConstraint],
    ledger: &[Vec<f64>],
) -> bool {
    attributes
        .iter()
        .filter(|attribute| attribute.members.contains(&reviewer))
        .all(|attribute| match attribute.comparator {
            Comparator::Leq => true,
            Comparator::Eq | Comparator::Geq => {
                fixed_ones(attribute, paper, ledger) >= cast_usize(u64::from(attribute.bound))
            }
        })
}

/// A variable may be fixed to 1 only when no `<=` attribute constraint
/// whose members include its reviewer would be pushed over its bound.
fn may_fix_to_one(
    reviewer: usize,
    paper: usize,
    attributes: &[AttributeConstraint],
    ledger: &[Vec<f64>],
) -> bool {
    attributes
        .iter()
        .filter(|attribute| attribute.members.contains(&reviewer))
        .all(|attribute| match attribute.comparator {
            Comparator::Leq => {
                fixed_ones(attribute, paper, ledger) + 1 <= cast_usize(u64::from(attribute.bound))
            }
            Comparator::Eq | Comparator::Geq => true,
        })
}

fn fixed_ones(attribute: &AttributeConstraint, paper: usize, ledger: &[Vec<f64>]) -> usize {
    attribute
        .members
        .iter()
        .filter(|&&member| ledger[member][paper] == 1.0)
        .count()
}

#[cfg(test)]
mod test {
    use super::*;
    use ahash::HashSet;

    fn members(reviewers: &[usize]) -> HashSet<usize> {
        reviewers.iter().copied().collect()
    }

    fn attribute(bound: u32, comparator: Comparator, reviewers: &[usize]) -> AttributeConstraint {
        AttributeConstraint {
            name: "Senior".into(),
            bound,
            comparator,
            members: members(reviewers),
        }
    }

    #[test]
    fn matcher_name_outlives_the_matcher() {
        let name = {
            let matcher: Box<dyn Matcher> = Box::new(FairIR::default());
            matcher.name()
        };
        assert_eq!(name, "FairIR");
    }

    #[test]
    fn assigns_best_reviewers() -> anyhow::Result<()> {
        let instance = Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.5, 0.5]],
            vec![vec![0, 0], vec![0, 0], vec![0, 0]],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![1, 1],
        );

        let assignment = FairIR::default().matching(&instance)?;

        assert!(assignment.verify(&instance));
        assert!(assignment.contains(0, 0));
        assert!(assignment.contains(1, 1));
        assert_eq!(assignment.reviewer_load(2), 0);
        assert!((assignment.total_affinity() - 1.7).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn conflict_beats_highest_affinity() -> anyhow::Result<()> {
        let instance = Instance::new(
            vec![vec![0.95], vec![0.4]],
            vec![vec![-1], vec![0]],
            vec![1, 1],
            vec![0, 0],
            vec![1],
        );

        let assignment = FairIR::default().matching(&instance)?;

        assert!(assignment.verify(&instance));
        assert!(!assignment.contains(0, 0));
        assert!(assignment.contains(0, 1));
        Ok(())
    }

    #[test]
    fn supply_shortage_yields_no_assignment() {
        let instance = Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8]],
            vec![vec![0, 0], vec![0, 0]],
            vec![1, 1],
            vec![0, 0],
            vec![2, 2],
        );

        assert!(FairIR::default().matching(&instance).is_err());
    }

    #[test]
    fn infeasible_configured_threshold_is_an_error() {
        let instance = Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.5, 0.5]],
            vec![vec![0, 0], vec![0, 0], vec![0, 0]],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![1, 1],
        );

        // No paper arrangement gives paper 1 a weighted total of 0.85.
        assert!(FairIR::with_threshold(0.85).matching(&instance).is_err());
    }

    #[test]
    fn feasible_configured_threshold_is_used() -> anyhow::Result<()> {
        let instance = Instance::new(
            vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.5, 0.5]],
            vec![vec![0, 0], vec![0, 0], vec![0, 0]],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![1, 1],
        );

        let assignment = FairIR::with_threshold(0.75).matching(&instance)?;

        assert!(assignment.verify(&instance));
        assert!(assignment.contains(0, 0));
        assert!(assignment.contains(1, 1));
        Ok(())
    }

    #[test]
    fn equality_attribute_picks_exactly_one_member() -> anyhow::Result<()> {
        let instance = Instance::new(
            vec![vec![0.6], vec![0.7], vec![0.5]],
            vec![vec![0], vec![0], vec![0]],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![2],
        )
        .with_attributes(vec![attribute(1, Comparator::Eq, &[0, 1])]);

        let assignment = FairIR::default().matching(&instance)?;

        assert!(assignment.verify(&instance));
        let senior_count = [0, 1]
            .iter()
            .filter(|&&reviewer| assignment.contains(0, reviewer))
            .count();
        assert_eq!(senior_count, 1);
        assert!(assignment.contains(0, 2));
        Ok(())
    }

    #[test]
    fn larger_instance_rounds_to_integral_assignment() -> anyhow::Result<()> {
        let instance = Instance::new(
            vec![
                vec![0.91, 0.27, 0.44],
                vec![0.13, 0.86, 0.52],
                vec![0.67, 0.45, 0.88],
                vec![0.38, 0.71, 0.23],
            ],
            vec![vec![0; 3]; 4],
            vec![2, 2, 2, 2],
            vec![1, 1, 1, 1],
            vec![2, 2, 2],
        );

        let assignment = FairIR::default().matching(&instance)?;

        assert!(assignment.verify(&instance));
        for paper in 0..3 {
            assert_eq!(assignment.paper(paper).len(), 2);
        }
        Ok(())
    }

    #[test]
    fn minimum_loads_are_respected() -> anyhow::Result<()> {
        // Reviewer 2 has the weakest scores but a minimum load of one.
        let instance = Instance::new(
            vec![vec![0.9, 0.8], vec![0.7, 0.9], vec![0.1, 0.2]],
            vec![vec![0, 0], vec![0, 0], vec![0, 0]],
            vec![2, 2, 2],
            vec![0, 0, 1],
            vec![2, 2],
        );

        let assignment = FairIR::default().matching(&instance)?;

        assert!(assignment.verify(&instance));
        assert!(assignment.reviewer_load(2) >= 1);
        Ok(())
    }

    #[test]
    fn empty_instance_yields_empty_assignment() -> anyhow::Result<()> {
        let instance = Instance::new(Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let assignment = FairIR::default().matching(&instance)?;
        assert!(assignment.papers().is_empty());
        Ok(())
    }

    #[test]
    fn rounding_terminates_within_the_variable_budget() -> anyhow::Result<()> {
        // A single variable allows exactly one rounding iteration.
        let instance = Instance::new(vec![vec![0.9]], vec![vec![0]], vec![1], vec![0], vec![1]);
        let mut relaxation = Relaxation::new(&instance);
        round_fractional(&mut relaxation, &[])?;
        assert_eq!(relaxation.status(), SolveStatus::Optimal);
        Ok(())
    }

    #[test]
    fn fix_to_zero_requires_met_equality_bound() {
        let attributes = vec![attribute(1, Comparator::Eq, &[0, 1])];
        let mut ledger = vec![vec![-1.0], vec![-1.0], vec![-1.0]];

        assert!(!may_fix_to_zero(0, 0, &attributes, &ledger));
        // Non-members are unrestricted.
        assert!(may_fix_to_zero(2, 0, &attributes, &ledger));

        ledger[1][0] = 1.0;
        assert!(may_fix_to_zero(0, 0, &attributes, &ledger));
    }

    #[test]
    fn fix_to_one_respects_upper_attribute_bound() {
        let attributes = vec![attribute(1, Comparator::Leq, &[0, 1])];
        let mut ledger = vec![vec![-1.0], vec![-1.0], vec![-1.0]];

        assert!(may_fix_to_one(0, 0, &attributes, &ledger));
        assert!(may_fix_to_one(2, 0, &attributes, &ledger));

        ledger[1][0] = 1.0;
        assert!(!may_fix_to_one(0, 0, &attributes, &ledger));
        assert!(may_fix_to_one(2, 0, &attributes, &ledger));
    }

    #[test]
    fn attribute_validation_reports_the_offending_paper() {
        let instance = Instance::new(
            vec![vec![0.6], vec![0.7]],
            vec![vec![0], vec![0]],
            vec![1, 1],
            vec![0, 0],
            vec![1],
        );
        let mut relaxation = Relaxation::new(&instance);
        relaxation
            .solve()
            .unwrap_or_else(|error| panic!("solve failed: {error}"));

        // The solved coverage of one cannot also sum to two over all members.
        let attributes = vec![attribute(2, Comparator::Eq, &[0, 1])];
        let result = validate_attributes(&relaxation, &attributes);
        assert!(matches!(
            result,
            Err(SolverError::AttributeViolation { paper: 0, .. })
        ));
    }
}
