use super::ParseError;
use crate::crd::BenchmarkResult;

/// Parse OpenFOAM's final `ExecutionTime = X s  ClockTime = Y s` banner
/// (spec §4.5): the last occurrence wins (solvers print it every write
/// interval, not just at the end).
pub fn parse(log: &str) -> Result<BenchmarkResult, ParseError> {
    if log.trim().is_empty() {
        return Err(ParseError::EmptyLog);
    }

    let wall_time_seconds = log
        .lines()
        .rev()
        .find_map(extract_execution_time)
        .ok_or_else(|| ParseError::MissingMarker("ExecutionTime banner".to_string()))?;

    Ok(BenchmarkResult::OpenFOAM { wall_time_seconds })
}

fn extract_execution_time(line: &str) -> Option<f64> {
    let after = line.split("ExecutionTime = ").nth(1)?;
    let number = after.split(" s").next()?;
    number.trim().parse().ok()
}
