//! Text serialization for `vector` columns: `[f1,f2,...,fn]`, six fractional
//! digits, tolerant on read (trims whitespace and either bracket style).
//!
//! `pgvector`'s text input/output format accepts this directly via a
//! `::vector` cast, so the gateway binds and reads these columns as plain
//! `TEXT` rather than pulling in a separate vector-binding crate.

use crate::error::StorageError;

pub fn format_vector(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.6}")).collect();
    format!("[{}]", parts.join(","))
}

pub fn parse_vector(raw: &str) -> Result<Vec<f32>, StorageError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| StorageError::InvalidVector(raw.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_to_six_digits() {
        let values = vec![0.123_456_7_f32, -1.0, 2.5];
        let formatted = format_vector(&values);
        let parsed = parse_vector(&formatted).unwrap();
        for (a, b) in values.iter().zip(parsed.iter()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn tolerates_whitespace_and_braces() {
        let parsed = parse_vector("  [ 1.000000 , 2.000000 ] ").unwrap();
        assert_eq!(parsed, vec![1.0, 2.0]);
    }

    #[test]
    fn empty_vector_parses_to_empty() {
        assert_eq!(parse_vector("[]").unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn malformed_element_is_an_error() {
        assert!(parse_vector("[1.0,oops]").is_err());
    }

    #[test]
    fn format_uses_exactly_six_fractional_digits() {
        assert_eq!(format_vector(&[1.0]), "[1.000000]");
    }
}
