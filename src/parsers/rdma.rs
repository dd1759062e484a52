use super::ParseError;
use crate::crd::{BenchmarkResult, RdmaPoint};

/// Which perftest column to extract (spec §4.5): bandwidth parses
/// `BW average[MB/sec]`, latency parses `t_avg[usec]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    BwAverage,
    TAvg,
}

/// Parse `ib_write_bw`/`ib_read_bw` output's `BW average[MB/sec]` column
/// across message sizes.
pub fn parse_bandwidth(log: &str) -> Result<BenchmarkResult, ParseError> {
    let points = parse_points(log, Column::BwAverage)?;
    Ok(BenchmarkResult::RDMABandwidth { points })
}

/// Parse `ib_write_lat`/`ib_read_lat` output's `t_avg[usec]` column across
/// message sizes.
pub fn parse_latency(log: &str) -> Result<BenchmarkResult, ParseError> {
    let points = parse_points(log, Column::TAvg)?;
    Ok(BenchmarkResult::RDMALatency { points })
}

/// perftest data rows are fixed-width numeric tables: `#bytes #iterations
/// ...`. Bandwidth rows are `bytes iterations BW_peak BW_average MsgRate`
/// (5 columns); latency rows are `bytes iterations t_min t_max t_typical
/// t_avg t_stdev p99 p99.9` (9 columns).
fn parse_points(log: &str, column: Column) -> Result<Vec<RdmaPoint>, ParseError> {
    if log.trim().is_empty() {
        return Err(ParseError::EmptyLog);
    }

    let expected_len = match column {
        Column::BwAverage => 5,
        Column::TAvg => 9,
    };
    let value_index = match column {
        Column::BwAverage => 3,
        Column::TAvg => 5,
    };

    let points: Vec<RdmaPoint> = log
        .lines()
        .filter_map(|line| parse_row(line, expected_len, value_index))
        .collect();

    if points.is_empty() {
        return Err(ParseError::MissingMarker(
            "perftest result table".to_string(),
        ));
    }

    Ok(points)
}

fn parse_row(line: &str, expected_len: usize, value_index: usize) -> Option<RdmaPoint> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != expected_len {
        return None;
    }

    Some(RdmaPoint {
        bytes: tokens[0].parse().ok()?,
        value: tokens[value_index].parse().ok()?,
    })
}
