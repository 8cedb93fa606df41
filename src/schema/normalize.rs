//! Value normalizers for the formatted strings found in municipal extracts.

const NULL_TOKENS: &[&str] = &["", "nan", "na", "n/a", "null", "none", "-"];

fn is_null_token(raw: &str) -> bool {
    NULL_TOKENS.iter().any(|t| raw.eq_ignore_ascii_case(t))
}

/// Parses a plain or currency-formatted number (`$1,234.50`, ` 12 `).
///
/// Returns `None` for empty, null-like, or unparseable input.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if is_null_token(trimmed) {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a percentage. `25%` and `25 %` become `0.25`; a bare number is
/// taken as already fractional.
pub fn parse_percentage(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    match trimmed.strip_suffix('%') {
        Some(number) => parse_number(number).map(|v| v / 100.0),
        None => parse_number(trimmed),
    }
}

/// Parses a non-negative whole count, accepting float spellings such as `2.0`.
pub fn parse_count(raw: &str) -> Option<u32> {
    parse_number(raw)
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.round() as u32)
}

/// Parses a four-digit construction or remodel year. `0` and out-of-range
/// values are treated as missing.
pub fn parse_year(raw: &str) -> Option<i32> {
    parse_number(raw)
        .map(|v| v.round() as i64)
        .filter(|y| (1600..=2100).contains(y))
        .map(|y| y as i32)
}

/// Normalizes a postal code to a zero-padded 5-digit string.
///
/// `2134`, `2134.0`, `02134` and `02134-1234` all map to `"02134"`.
pub fn normalize_postal_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('\'');
    let base = trimmed.split('-').next().unwrap_or(trimmed).trim();
    if is_null_token(base) {
        return None;
    }
    let value = base.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 || !(1.0..=99_999.0).contains(&value) {
        return None;
    }
    Some(format!("{:05}", value as u32))
}

/// Trims a text cell, mapping empty and null-like values to `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_null_token(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a combined location cell such as `(42.3601, -71.0589)`.
pub fn parse_location_pair(raw: &str) -> Option<(f64, f64)> {
    let inner = raw
        .trim()
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']']);
    let mut parts = inner.split(',');
    let lat = parse_number(parts.next()?)?;
    let lon = parse_number(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_number("$1,234,500.00"), Some(1_234_500.0));
        assert_eq!(parse_number(" 980000 "), Some(980_000.0));
        assert_eq!(parse_number("$ 12"), Some(12.0));
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("twelve"), None);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("25%"), Some(0.25));
        assert_eq!(parse_percentage("12.5 %"), Some(0.125));
        assert_eq!(parse_percentage("0.4"), Some(0.4));
        assert_eq!(parse_percentage(""), None);
    }

    #[test]
    fn test_parse_count_and_year() {
        assert_eq!(parse_count("3.0"), Some(3));
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_year("1925"), Some(1925));
        assert_eq!(parse_year("0"), None);
    }

    #[test]
    fn test_normalize_postal_code() {
        assert_eq!(normalize_postal_code("2134"), Some("02134".into()));
        assert_eq!(normalize_postal_code("2134.0"), Some("02134".into()));
        assert_eq!(normalize_postal_code("02134-1234"), Some("02134".into()));
        assert_eq!(normalize_postal_code("'02116"), Some("02116".into()));
        assert_eq!(normalize_postal_code("abc"), None);
        assert_eq!(normalize_postal_code(""), None);
    }

    #[test]
    fn test_parse_location_pair() {
        assert_eq!(
            parse_location_pair("(42.3601, -71.0589)"),
            Some((42.3601, -71.0589))
        );
        assert_eq!(parse_location_pair("42.1"), None);
    }
}
