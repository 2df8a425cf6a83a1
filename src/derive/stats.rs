//! Small order statistics shared by the Aggregator and the quantile colour scale.

/// Finite values sorted ascending.
pub(crate) fn sorted_values(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linear-interpolated quantile of an ascending slice (`q` in [0, 1]).
pub(crate) fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Cut points splitting `sorted` into `k` equal-count bins: `k + 1` edges from
/// the minimum to the maximum.
pub(crate) fn quantile_edges(sorted: &[f64], k: usize) -> Option<Vec<f64>> {
    if k == 0 {
        return None;
    }
    (0..=k)
        .map(|i| quantile(sorted, i as f64 / k as f64))
        .collect()
}

/// Index of the right-closed bin that holds `value`; the first bin also holds
/// the minimum.
pub(crate) fn bin_index(edges: &[f64], value: f64) -> usize {
    let inner = &edges[1..edges.len().saturating_sub(1).max(1)];
    inner.partition_point(|edge| *edge < value)
}

/// Share of `sorted` that is less than or equal to `value`.
pub(crate) fn percentile_rank(sorted: &[f64], value: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let at_or_below = sorted.partition_point(|v| *v <= value);
    Some(at_or_below as f64 / sorted.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 0.5), Some(2.5));
        assert_eq!(quantile(&sorted, 1.0), Some(4.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_bin_index_is_right_closed() {
        let edges = quantile_edges(&[10.0, 20.0, 30.0, 40.0, 50.0], 4).unwrap();
        assert_eq!(edges, vec![10.0, 20.0, 30.0, 40.0, 50.0]);

        assert_eq!(bin_index(&edges, 10.0), 0);
        assert_eq!(bin_index(&edges, 20.0), 0);
        assert_eq!(bin_index(&edges, 20.5), 1);
        assert_eq!(bin_index(&edges, 40.0), 2);
        assert_eq!(bin_index(&edges, 50.0), 3);
    }

    #[test]
    fn test_percentile_rank() {
        let sorted = sorted_values([40.0, 10.0, 30.0, 20.0]);
        assert_eq!(percentile_rank(&sorted, 10.0), Some(0.25));
        assert_eq!(percentile_rank(&sorted, 40.0), Some(1.0));
        assert_eq!(percentile_rank(&sorted, 25.0), Some(0.5));
    }

    #[test]
    fn test_sorted_values_drops_non_finite() {
        assert_eq!(sorted_values([3.0, f64::NAN, 1.0, f64::INFINITY]), vec![1.0, 3.0]);
    }
}
