use super::ParseError;
use crate::crd::{BenchmarkResult, PingPongRecord};

/// Parse Intel MPI Benchmarks' PingPong table (spec §4.5): rows of
/// `#bytes #repetitions t_avg[usec] Mbytes/sec`, comment lines prefixed `#`.
pub fn parse(log: &str) -> Result<BenchmarkResult, ParseError> {
    if log.trim().is_empty() {
        return Err(ParseError::EmptyLog);
    }

    let records: Vec<PingPongRecord> = log
        .lines()
        .filter_map(parse_row)
        .collect();

    if records.is_empty() {
        return Err(ParseError::MissingMarker("PingPong result table".to_string()));
    }

    let smallest_bytes = records.iter().map(|r| r.bytes).min().unwrap();
    let largest_bytes = records.iter().map(|r| r.bytes).max().unwrap();

    Ok(BenchmarkResult::MPIPingPong {
        records,
        smallest_bytes,
        largest_bytes,
    })
}

fn parse_row(line: &str) -> Option<PingPongRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 4 {
        return None;
    }

    Some(PingPongRecord {
        bytes: tokens[0].parse().ok()?,
        repetitions: tokens[1].parse().ok()?,
        t_avg_usec: tokens[2].parse().ok()?,
        mbytes_per_sec: tokens[3].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOG: &str = "\
#---------------------------------------------------
# Benchmarking PingPong
# #processes = 2
#---------------------------------------------------
       #bytes #repetitions      t[usec]   Mbytes/sec
            0         1000         1.50         0.00
            1         1000         1.52         0.66
         1024         1000        12.40        82.58
        65536         640        210.30       311.80";

    #[test]
    fn test_parses_all_data_rows() {
        let result = parse(SAMPLE_LOG).expect("should parse");
        match result {
            BenchmarkResult::MPIPingPong {
                records,
                smallest_bytes,
                largest_bytes,
            } => {
                assert_eq!(records.len(), 4);
                assert_eq!(smallest_bytes, 0);
                assert_eq!(largest_bytes, 65536);
            }
            _ => panic!("wrong result variant"),
        }
    }

    #[test]
    fn test_largest_record_values() {
        let result = parse(SAMPLE_LOG).unwrap();
        if let BenchmarkResult::MPIPingPong { records, .. } = result {
            let last = records.last().unwrap();
            assert_eq!(last.bytes, 65536);
            assert_eq!(last.repetitions, 640);
            assert!((last.t_avg_usec - 210.30).abs() < f64::EPSILON);
            assert!((last.mbytes_per_sec - 311.80).abs() < f64::EPSILON);
        } else {
            panic!("wrong result variant");
        }
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        let log = "# Benchmarking PingPong\n# #processes = 2\n";
        assert!(parse(log).is_err());
    }

    #[test]
    fn test_empty_log_is_parse_error() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyLog);
    }
}
