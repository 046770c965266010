//! cmh-run: race writer tasks against shared containers and verify the result.
//!
//! # Usage
//!
//! ```bash
//! cmh-run --strategy mutex --tasks 2 --iterations 1000
//! cmh-run --strategy none,mutex,cow --side-by-side --json
//! RUST_LOG=debug cmh-run --strategy map --keys shuffled
//! ```
//!
//! Exits non-zero when any run fails verification.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use cmh_core::{KeyPattern, RunResult, Strategy, Verification, Verifier};
use cmh_harness::{get_or_generate_seed, Harness, HarnessConfig, Lane};

/// Maximum join timeout accepted on the command line (milliseconds).
const TIMEOUT_MS_MAX: u64 = 3_600_000;

/// Race concurrent writers against shared containers and verify the outcome.
#[derive(Parser, Debug)]
#[command(name = "cmh-run")]
#[command(about = "Concurrent mutable collection harness")]
struct Cli {
    /// Strategies to run: none, mutex, cow, map, or all.
    #[arg(long, value_delimiter = ',', default_value = "all")]
    strategy: Vec<String>,

    /// Writer tasks per strategy (overrides CMH_TASKS).
    #[arg(long)]
    tasks: Option<usize>,

    /// Writes per task (overrides CMH_ITERATIONS).
    #[arg(long)]
    iterations: Option<u64>,

    /// Join timeout in milliseconds (overrides CMH_TIMEOUT_MS).
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Key pattern: disjoint, overlapping, shuffled or shuffled:<seed>.
    ///
    /// Defaults to disjoint for sequences and overlapping for the map.
    #[arg(long)]
    keys: Option<String>,

    /// Seed for the shuffled pattern (random if not set).
    ///
    /// Without --keys this selects the shuffled pattern. Rejected together
    /// with any other pattern or with an inline `shuffled:<seed>`.
    #[arg(long)]
    seed: Option<u64>,

    /// Run every selected strategy at the same time instead of one by one.
    #[arg(long)]
    side_by_side: bool,

    /// Print a JSON report instead of text.
    #[arg(long)]
    json: bool,
}

fn parse_strategies(names: &[String]) -> Result<Vec<Strategy>, String> {
    let mut strategies: Vec<Strategy> = Vec::new();
    for name in names {
        let parsed = if name.eq_ignore_ascii_case("all") {
            Strategy::ALL.to_vec()
        } else {
            vec![name.parse::<Strategy>().map_err(|e| e.to_string())?]
        };
        for strategy in parsed {
            if !strategies.contains(&strategy) {
                strategies.push(strategy);
            }
        }
    }
    Ok(strategies)
}

fn build_config(cli: &Cli) -> Result<HarnessConfig, String> {
    let mut config = HarnessConfig::default()
        .with_env_overrides()
        .map_err(|e| e.to_string())?;

    if let Some(tasks) = cli.tasks {
        config.tasks = tasks;
    }
    if let Some(iterations) = cli.iterations {
        config.iterations_per_task = iterations;
    }
    if let Some(ms) = cli.timeout_ms {
        config.timeout = Duration::from_millis(ms.min(TIMEOUT_MS_MAX));
    }
    if let Some(pattern) = key_pattern(cli)? {
        config.key_pattern = Some(pattern);
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Key pattern selected by `--keys` and `--seed`, if either is given.
fn key_pattern(cli: &Cli) -> Result<Option<KeyPattern>, String> {
    let Some(ref keys) = cli.keys else {
        return Ok(cli.seed.map(|seed| KeyPattern::Shuffled { seed }));
    };

    let pattern = keys.parse::<KeyPattern>().map_err(|e| e.to_string())?;
    let inline_seed = keys.contains(':');
    match (pattern, cli.seed) {
        (KeyPattern::Shuffled { .. }, Some(seed)) if !inline_seed => {
            Ok(Some(KeyPattern::Shuffled { seed }))
        }
        (KeyPattern::Shuffled { .. }, None) if !inline_seed => {
            let seed = get_or_generate_seed().map_err(|e| e.to_string())?;
            Ok(Some(KeyPattern::Shuffled { seed }))
        }
        (_, Some(_)) => Err(format!("--seed cannot be combined with --keys {}", keys)),
        (pattern, None) => Ok(Some(pattern)),
    }
}

fn execute(cli: &Cli) -> Result<Vec<(RunResult, Verification)>, String> {
    let strategies = parse_strategies(&cli.strategy)?;
    let config = build_config(cli)?;
    let harness = Harness::new(config.timeout);

    let lanes = strategies
        .iter()
        .map(|&strategy| Lane::new(strategy, &config))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let results = if cli.side_by_side {
        harness.run_side_by_side(lanes).map_err(|e| e.to_string())?
    } else {
        lanes
            .into_iter()
            .map(|lane| harness.run(lane))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?
    };

    Ok(results
        .into_iter()
        .map(|result| {
            let verification = Verifier::for_result(&result).verify();
            (result, verification)
        })
        .collect())
}

fn render_json(runs: &[(RunResult, Verification)]) -> Result<String, serde_json::Error> {
    let entries: Vec<serde_json::Value> = runs
        .iter()
        .map(|(result, verification)| {
            json!({
                "strategy": result.strategy,
                "elapsed_ms": result.elapsed.as_secs_f64() * 1000.0,
                "result": result,
                "verification": verification,
            })
        })
        .collect();

    let output = json!({
        "all_passed": runs.iter().all(|(_, v)| v.passed),
        "runs": entries,
    });
    serde_json::to_string_pretty(&output)
}

fn render_text(runs: &[(RunResult, Verification)]) -> String {
    let mut out = String::new();
    for (result, verification) in runs {
        out.push_str(&result.format());
        out.push('\n');
        out.push_str(&verification.format_report());
        out.push('\n');
    }
    let failed = runs.iter().filter(|(_, v)| !v.passed).count();
    out.push_str(&format!(
        "Total: {} passed, {} failed\n",
        runs.len() - failed,
        failed
    ));
    out
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let runs = match execute(&cli) {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.json {
        match render_json(&runs) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: failed to render JSON: {e}");
                return ExitCode::from(2);
            }
        }
    } else {
        print!("{}", render_text(&runs));
    }

    if runs.iter().all(|(_, v)| v.passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
