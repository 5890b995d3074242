//! Report rendering: console lines and the machine-readable JSON form.

use std::io::Write;
use std::path::Path;

use cascade_nist::TestResult;

/// One console line per result, stable field order:
/// `name p_value passed metric=value…` (metrics alphabetical).
pub fn format_line(result: &TestResult) -> String {
    let mut line = format!(
        "{} p_value={:.6} passed={}",
        result.test_name, result.p_value, result.passed
    );
    for (key, value) in &result.metrics {
        line.push_str(&format!(" {key}={value}"));
    }
    line
}

/// Write one JSON record per line. Structured mirror of the console output.
pub fn write_json_lines(path: &Path, results: &[TestResult]) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(results.len() * 128);
    for result in results {
        let record = serde_json::to_string(result)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        out.extend_from_slice(record.as_bytes());
        out.push(b'\n');
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_nist::metrics;

    fn sample() -> TestResult {
        TestResult::from_p_value(
            "frequency.monobit",
            0.5321,
            0.01,
            metrics![("ones_count", 512.0), ("bias", 0.5)],
        )
    }

    #[test]
    fn line_has_stable_field_order() {
        let line = format_line(&sample());
        assert_eq!(
            line,
            "frequency.monobit p_value=0.532100 passed=true bias=0.5 ones_count=512"
        );
    }

    #[test]
    fn json_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        write_json_lines(&path, &[sample(), sample()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["test_name"], "frequency.monobit");
        assert_eq!(parsed["passed"], true);
        assert_eq!(parsed["metrics"]["ones_count"], 512.0);
    }
}
