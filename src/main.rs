use clap::{Parser, ValueEnum};
use frm::core::{Instance, Matcher};
use frm::{algo, data, run_reader};
use rand::prelude::*;
use std::io::Write;
use std::num::NonZero;

#[derive(Copy, Clone, Debug)]
struct Algorithm(usize, &'static str);

impl From<Algorithm> for Box<dyn Matcher> {
    fn from(value: Algorithm) -> Box<dyn Matcher> {
        algo::MATCHERS[value.0]()
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.1)
    }
}

impl ValueEnum for Algorithm {
    fn value_variants<'a>() -> &'a [Self] {
        static ALGORITHMS: std::sync::LazyLock<Vec<Algorithm>> = std::sync::LazyLock::new(|| {
            let iter = algo::MATCHERS.iter().enumerate();
            iter.map(|(i, init)| Algorithm(i, init().name())).collect()
        });

        ALGORITHMS.as_slice()
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.1))
    }
}

/// Application assigning reviewers to conference papers.
#[derive(Debug, Parser)]
enum Application {
    /// Run one of the implemented matchers on an instance read from stdin.
    Run { algorithm: Algorithm },
    /// Run benchmarks on a directory of instances.
    Bench {
        /// The input directory.
        input: String,
        /// Exclude matching algorithms.
        #[clap(short, long, value_delimiter = ',')]
        exclude: Vec<Algorithm>,
    },
    /// Generate test instances for the matching problem.
    Gen {
        /// The number of reviewers.
        reviewers: NonZero<usize>,
        /// The number of papers.
        papers: NonZero<usize>,
        /// The number of reviews required per paper.
        #[clap(short = 'k', long, default_value = "3")]
        coverage: u32,
        /// The maximum number of papers per reviewer.
        #[clap(short, long, default_value = "6")]
        max_load: u32,
        /// The minimum number of papers per reviewer.
        #[clap(short = 'n', long, default_value = "0")]
        min_load: u32,
        /// The probability that a reviewer-paper pair is conflicted.
        #[clap(short, long, default_value = "0.05")]
        conflict_ratio: f64,
        /// Number of test cases to generate.
        #[clap(short, long, default_value = "1")]
        amount: NonZero<u64>,
        /// Path to output the generated instances. If the directory does not exist, it will be created.
        #[clap(short, long, default_value = "output")]
        output: String,
    },
}

fn matchers(exclude: &[Algorithm]) -> impl Iterator<Item = Box<dyn Matcher>> + '_ {
    let iter = algo::MATCHERS.iter().map(|init| init());
    iter.filter(|matcher| !exclude.iter().any(|name| name.1 == matcher.name()))
}

fn gen_affinities(reviewers: usize, papers: usize) -> Vec<Vec<f64>> {
    let mut rng = thread_rng();
    (0..reviewers)
        .map(|_| (0..papers).map(|_| rng.gen_range(0.0..=1.0)).collect())
        .collect()
}

fn gen_constraints(reviewers: usize, papers: usize, conflict_ratio: f64) -> Vec<Vec<i8>> {
    let mut rng = thread_rng();
    (0..reviewers)
        .map(|_| {
            (0..papers)
                .map(|_| if rng.gen_bool(conflict_ratio) { -1 } else { 0 })
                .collect()
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Application::parse() {
        Application::Run { algorithm } => {
            let mut matcher = Box::<dyn Matcher>::from(algorithm);
            run_reader(matcher.as_mut(), &mut std::io::stdin().lock())
        }
        Application::Bench { input, exclude } => {
            for mut matcher in matchers(&exclude) {
                println!("{}", data::run(&input, matcher.as_mut())?);
            }
            Ok(())
        }
        Application::Gen {
            reviewers,
            papers,
            coverage,
            max_load,
            min_load,
            conflict_ratio,
            amount,
            output,
        } => {
            let reviewers = reviewers.get();
            let papers = papers.get();

            let output = std::path::Path::new(&output);
            if !output.try_exists()? {
                std::fs::create_dir_all(output)?;
            }

            for i in 0..amount.get() {
                let instance = Instance::new(
                    gen_affinities(reviewers, papers),
                    gen_constraints(reviewers, papers, conflict_ratio),
                    vec![max_load; reviewers],
                    vec![min_load; reviewers],
                    vec![coverage; papers],
                );
                let filename = format!("{reviewers}x{papers}_{i}.json");
                std::fs::File::create(output.join(filename))?
                    .write_all(data::to_string(&instance)?.as_bytes())?;
            }
            Ok(())
        }
    }
}
