use super::ParseError;
use crate::crd::BenchmarkResult;

/// Parse the bundled PyTorch script's timing banner (spec §4.5): `CPU Peak
/// Memory`, `GPU Peak Memory` (optional, CPU-only runs omit it), and `CPU
/// Wall Time` lines.
pub fn parse(log: &str) -> Result<BenchmarkResult, ParseError> {
    if log.trim().is_empty() {
        return Err(ParseError::EmptyLog);
    }

    let cpu_peak_memory_mb = extract_value(log, "CPU Peak Memory")
        .ok_or_else(|| ParseError::MissingMarker("CPU Peak Memory line".to_string()))?;
    let cpu_wall_time_s = extract_value(log, "CPU Wall Time")
        .ok_or_else(|| ParseError::MissingMarker("CPU Wall Time line".to_string()))?;
    let gpu_peak_memory_mb = extract_value(log, "GPU Peak Memory");

    Ok(BenchmarkResult::PyTorch {
        cpu_peak_memory_mb,
        gpu_peak_memory_mb,
        cpu_wall_time_s,
    })
}

fn extract_value(log: &str, label: &str) -> Option<f64> {
    let prefix = format!("{label}:");
    log.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(&prefix)?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPU_ONLY_LOG: &str = "\
loading model...
running inference...
CPU Peak Memory: 512.34 MB
CPU Wall Time: 12.345 s\n";

    const GPU_LOG: &str = "\
loading model...
CPU Peak Memory: 812.00 MB
GPU Peak Memory: 2048.50 MB
CPU Wall Time: 3.210 s\n";

    #[test]
    fn test_cpu_only_run_has_no_gpu_value() {
        let result = parse(CPU_ONLY_LOG).expect("should parse");
        match result {
            BenchmarkResult::PyTorch {
                cpu_peak_memory_mb,
                gpu_peak_memory_mb,
                cpu_wall_time_s,
            } => {
                assert!((cpu_peak_memory_mb - 512.34).abs() < f64::EPSILON);
                assert_eq!(gpu_peak_memory_mb, None);
                assert!((cpu_wall_time_s - 12.345).abs() < f64::EPSILON);
            }
            _ => panic!("wrong result variant"),
        }
    }

    #[test]
    fn test_gpu_run_captures_gpu_value() {
        let result = parse(GPU_LOG).expect("should parse");
        match result {
            BenchmarkResult::PyTorch {
                gpu_peak_memory_mb, ..
            } => assert_eq!(gpu_peak_memory_mb, Some(2048.50)),
            _ => panic!("wrong result variant"),
        }
    }

    #[test]
    fn test_missing_cpu_wall_time_is_parse_error() {
        let log = "CPU Peak Memory: 512.34 MB\n";
        assert!(parse(log).is_err());
    }

    #[test]
    fn test_empty_log_is_parse_error() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyLog);
    }
}
