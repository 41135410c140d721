#![deny(clippy::all, clippy::cargo, clippy::expect_used, clippy::unwrap_used)]
#![deny(clippy::pedantic, clippy::nursery, unsafe_code)]
#![warn(clippy::unimplemented, clippy::redundant_type_annotations)]

use anyhow::Result;
use std::io::BufRead;

pub mod algo;
pub mod core;
pub mod data;

/// Runs the given matcher on the instance read from reader and writes the
/// assignment to stdout. Also writes the total affinity to stdout.
///
/// # Errors
/// - If the instance could not be read from the reader.
/// - If no assignment could be found.
/// - If the assignment could not be written to stdout.
///
/// # Panics
/// - If the assignment is invalid in debug mode.
pub fn run_reader(matcher: &mut dyn core::Matcher, reader: &mut impl BufRead) -> Result<()> {
    let instance: core::Instance = data::deserialize(reader)?;
    let assignment = matcher.matching(&instance)?;

    debug_assert!(
        assignment.verify(&instance),
        "Assignment is invalid: {assignment:?}"
    );

    println!("{}", data::to_string(&assignment)?);
    println!("{}", assignment.total_affinity());

    Ok(())
}

#[cfg(not(target_pointer_width = "64"))]
compile_error!("Must be 64-bit system!");

/// Casts the given value to `usize`.
/// It should never fail on 64-bit systems.
///
/// # Panics
/// - If the value cannot be cast to `usize`.
#[must_use]
pub fn cast_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or_else(|_| unreachable!("Must be 64-bit system!"))
}

/// Casts the given value to `u64`.
/// It should never fail on 64-bit systems.
///
/// # Panics
/// - If the value cannot be cast to `usize`.
#[must_use]
pub fn cast_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or_else(|_| unreachable!("Must be 64-bit system!"))
}
