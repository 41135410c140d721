mod problem;
mod solution;

pub use problem::*;
pub use solution::*;

/// Matches reviewers to the papers of an instance.
pub trait Matcher {
    /// Computes a complete assignment for the given instance.
    ///
    /// # Errors
    /// - If the instance is malformed.
    /// - If no assignment exists under the current constraints.
    /// - If the LP backend fails.
    fn matching(&mut self, instance: &Instance) -> anyhow::Result<Assignment>;

    /// Returns the name of the matcher. The name outlives any instance so
    /// it can be listed by the CLI after the matcher is gone.
    fn name(&self) -> &'static str;
}
