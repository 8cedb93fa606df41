//! Numeric helpers shared by the cleaners, the aggregator and the serving views.

/// Computes the arithmetic mean of a slice of values. Returns `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of `values`: the middle element for an odd count, the mean of the
/// two central elements for an even count. Returns `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Median over the finite, strictly positive values only.
pub fn positive_median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let kept: Vec<f64> = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    median(&kept)
}

/// `part / total * 1000`, or 0.0 when `total` is zero.
pub fn per_thousand(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 1000.0
    }
}

/// `numerator / denominator` when both are present and the denominator is positive.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() && d.is_finite() => Some(n / d),
        _ => None,
    }
}

/// Value assigned to every member of a zero-variance column.
pub const CONSTANT_SCORE: f64 = 0.0;

/// Min-max normalizes the present values of a column onto `[0, scale]`.
///
/// Absent entries stay absent. When every present value is equal (including a
/// single value) each one maps to [`CONSTANT_SCORE`].
pub fn min_max_scale(values: &[Option<f64>], scale: f64) -> Vec<Option<f64>> {
    let present = values.iter().flatten().copied().filter(|v| v.is_finite());
    let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;

    values
        .iter()
        .map(|value| {
            let v = (*value)?;
            if !v.is_finite() {
                return None;
            }
            if range > 0.0 {
                Some((v - min) / range * scale)
            } else {
                Some(CONSTANT_SCORE)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[10.0, 20.0, 30.0]), Some(20.0));
        assert_eq!(median(&[10.0, 20.0, 30.0, 40.0]), Some(25.0));
    }

    #[test]
    fn test_median_unsorted_input() {
        assert_eq!(median(&[30.0, 10.0, 20.0]), Some(20.0));
        assert_eq!(median(&[40.0, 10.0, 30.0, 20.0]), Some(25.0));
    }

    #[test]
    fn test_median_empty_is_none() {
        assert_eq!(median(&[]), None);
        assert_eq!(positive_median([0.0, -5.0, f64::NAN]), None);
    }

    #[test]
    fn test_positive_median_skips_zeros() {
        assert_eq!(positive_median([0.0, 100.0, 300.0]), Some(200.0));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn test_per_thousand() {
        assert_eq!(per_thousand(50, 1000), 50.0);
        assert_eq!(per_thousand(10, 0), 0.0);
    }

    #[test]
    fn test_ratio_guards_zero_denominator() {
        assert_eq!(ratio(Some(500_000.0), Some(50_000.0)), Some(10.0));
        assert_eq!(ratio(Some(500_000.0), Some(0.0)), None);
        assert_eq!(ratio(None, Some(50_000.0)), None);
    }

    #[test]
    fn test_min_max_single_element_is_constant() {
        assert_eq!(min_max_scale(&[Some(42.0)], 100.0), vec![Some(CONSTANT_SCORE)]);
    }

    #[test]
    fn test_min_max_zero_variance() {
        let scaled = min_max_scale(&[Some(3.0), Some(3.0), None], 100.0);
        assert_eq!(scaled, vec![Some(0.0), Some(0.0), None]);
    }

    #[test]
    fn test_min_max_range() {
        let scaled = min_max_scale(&[Some(10.0), None, Some(20.0), Some(15.0)], 100.0);
        assert_eq!(scaled, vec![Some(0.0), None, Some(100.0), Some(50.0)]);
    }
}
