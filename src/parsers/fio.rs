use serde_json::Value;

use super::ParseError;
use crate::crd::BenchmarkResult;

/// Parse `fio --output-format=json+` (spec §4.5): aggregate `bw_bytes` and
/// `iops` across every job, mean `clat.mean` (ns) converted to ms.
pub fn parse(log: &str) -> Result<BenchmarkResult, ParseError> {
    if log.trim().is_empty() {
        return Err(ParseError::EmptyLog);
    }

    let json_start = log
        .find('{')
        .ok_or_else(|| ParseError::MissingMarker("fio json+ output".to_string()))?;
    let root: Value = serde_json::from_str(log[json_start..].trim())
        .map_err(|e| ParseError::Malformed(format!("fio json: {e}")))?;

    let jobs = root
        .get("jobs")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::Malformed("missing jobs array".to_string()))?;

    if jobs.is_empty() {
        return Err(ParseError::MissingMarker("at least one fio job".to_string()));
    }

    let mut bw_bytes_total = 0u64;
    let mut iops_total = 0.0f64;
    let mut clat_sum_ms = 0.0f64;
    let mut clat_count = 0u32;

    for job in jobs {
        let direction = active_direction(job)
            .ok_or_else(|| ParseError::Malformed("job has no read/write data".to_string()))?;

        bw_bytes_total += direction.get("bw_bytes").and_then(Value::as_u64).unwrap_or(0);
        iops_total += direction.get("iops").and_then(Value::as_f64).unwrap_or(0.0);

        if let Some(mean_ns) = direction
            .get("clat_ns")
            .and_then(|c| c.get("mean"))
            .and_then(Value::as_f64)
        {
            clat_sum_ms += mean_ns / 1_000_000.0;
            clat_count += 1;
        }
    }

    let clat_mean_ms = if clat_count > 0 {
        clat_sum_ms / clat_count as f64
    } else {
        0.0
    };

    Ok(BenchmarkResult::Fio {
        bw_bytes: bw_bytes_total,
        iops: iops_total,
        clat_mean_ms,
    })
}

/// fio reports both a `read` and `write` section per job; the active one is
/// whichever actually moved bytes.
fn active_direction(job: &Value) -> Option<&Value> {
    for key in ["read", "write"] {
        if let Some(section) = job.get(key) {
            let moved = section.get("bw_bytes").and_then(Value::as_u64).unwrap_or(0) > 0;
            if moved {
                return Some(section);
            }
        }
    }
    job.get("read")
}
