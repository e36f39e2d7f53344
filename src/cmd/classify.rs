//! Offline log classification — `vcr-orchestrator classify`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use vcr_orchestrator::model::{Phase, Totals};
use vcr_orchestrator::parser::{ParsedOutput, is_build_failure, parse};

#[derive(Serialize)]
struct Classification {
    phase: Phase,
    #[serde(flatten)]
    parsed: ParsedOutput,
    totals: Totals,
    build_failure: bool,
}

pub fn cmd_classify(log: &Path, phase: Phase) -> Result<()> {
    let raw = std::fs::read_to_string(log)
        .with_context(|| format!("Failed to read log: {}", log.display()))?;
    let parsed = parse(&raw, phase);

    let totals = Totals::from_results(&parsed.results);

    let classification = Classification {
        phase,
        build_failure: parsed.results.is_empty() && is_build_failure(&raw),
        parsed,
        totals,
    };
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}
