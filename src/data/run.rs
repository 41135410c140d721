use crate::core::{Instance, Matcher};
use crate::data::deserialize;
use anyhow::{anyhow, ensure};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use std::fs::File;
use std::io::BufReader;

/// Report of running a directory of instances.
#[derive(Debug, Deserialize, Serialize)]
pub struct Report {
    matcher: String,
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Create a new report.
    fn new(matcher: String) -> Self {
        let entries = Vec::new();
        Self { matcher, entries }
    }

    /// Get the matcher name.
    #[must_use]
    pub fn matcher_name(&self) -> &str {
        &self.matcher
    }

    /// Get the entries.
    #[must_use]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "Matcher: {}", self.matcher)?;
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        writeln!(f, "-------------------")
    }
}

/// Report of running a single instance.
#[non_exhaustive]
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub score: f64,
    pub time: f64,
}

impl Display for ReportEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}: {:.3} in {:.2} sec", self.name, self.score, self.time)
    }
}

/// Run all instance files in the `dir` directory and report the total
/// affinity and wall time per instance.
///
/// # Errors
/// - If a file cannot be read or parsed.
/// - If the matcher fails on an instance.
/// - If a returned assignment does not verify against its instance.
pub fn run(dir: &str, matcher: &mut dyn Matcher) -> anyhow::Result<Report> {
    let mut report = Report::new(matcher.name().into());

    for file in std::fs::read_dir(dir)? {
        let file = file?;
        let name = file
            .file_name()
            .to_str()
            .ok_or_else(|| anyhow!("Cannot read filename"))?
            .to_owned();

        let instance: Instance = deserialize(&mut BufReader::new(File::open(file.path())?))?;

        let time = std::time::Instant::now();
        let assignment = matcher.matching(&instance)?;
        let time = time.elapsed().as_secs_f64();

        ensure!(assignment.verify(&instance), "Invalid assignment for {name}");

        let score = assignment.total_affinity();
        report.entries.push(ReportEntry { name, score, time });
    }

    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn report_displays_entries() {
        let mut report = Report::new("FairIR".into());
        report.entries.push(ReportEntry {
            name: "icml.json".into(),
            score: 1.7,
            time: 0.25,
        });

        let text = report.to_string();
        assert!(text.starts_with("Matcher: FairIR\n"));
        assert!(text.contains("icml.json: 1.700 in 0.25 sec"));
    }
}
