use crate::models::{EnrollmentRecord, OutlierBounds};

/// Tukey's fence multiplier applied to the interquartile range.
pub const TUKEY_FENCE: f64 = 1.5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub bounds: Option<OutlierBounds>,
    pub inliers: Vec<EnrollmentRecord>,
    pub outliers: Vec<EnrollmentRecord>,
}

/// Split into (valid, open): records with and without an elapsed time.
pub fn split_open(records: Vec<EnrollmentRecord>) -> (Vec<EnrollmentRecord>, Vec<EnrollmentRecord>) {
    records.into_iter().partition(|record| !record.is_open())
}

/// Quantile with linear interpolation between closest ranks. `sorted` must be ascending.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
        }
    }
}

pub fn outlier_bounds(days: &[i64]) -> Option<OutlierBounds> {
    let mut sorted: Vec<f64> = days.iter().map(|&d| d as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(OutlierBounds {
        q1,
        q3,
        iqr,
        lower: (q1 - TUKEY_FENCE * iqr).max(0.0),
        upper: q3 + TUKEY_FENCE * iqr,
    })
}

/// Partition valid records into inliers and statistical outliers, preserving order.
pub fn classify(valid: Vec<EnrollmentRecord>) -> Classified {
    let days: Vec<i64> = valid.iter().filter_map(|r| r.elapsed_days).collect();
    let Some(bounds) = outlier_bounds(&days) else {
        return Classified::default();
    };

    let (inliers, outliers): (Vec<_>, Vec<_>) = valid
        .into_iter()
        .partition(|r| r.elapsed_days.is_some_and(|d| bounds.admits(d)));

    Classified {
        bounds: Some(bounds),
        inliers,
        outliers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(days: &[i64]) -> Vec<EnrollmentRecord> {
        days.iter()
            .enumerate()
            .map(|(i, &d)| EnrollmentRecord {
                student_id: format!("s{i}"),
                cohort: "T1".to_string(),
                pipeline_name: "sales".to_string(),
                purchased_at: None,
                started_at: None,
                elapsed_days: Some(d),
                clamped: false,
            })
            .collect()
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert!((quantile(&sorted, 0.25).unwrap() - 2.25).abs() < 1e-9);
        assert!((quantile(&sorted, 0.75).unwrap() - 4.75).abs() < 1e-9);
        assert_eq!(quantile(&[7.0], 0.25), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn tukey_bounds_flag_far_values() {
        let classified = classify(valid(&[3, 100, 1, 5, 2, 4]));
        let bounds = classified.bounds.unwrap();
        assert!((bounds.iqr - 2.5).abs() < 1e-9);
        assert_eq!(bounds.lower, 0.0);
        assert!((bounds.upper - 8.5).abs() < 1e-9);

        let inlier_days: Vec<_> = classified.inliers.iter().filter_map(|r| r.elapsed_days).collect();
        assert_eq!(inlier_days, [3, 1, 5, 2, 4]);
        assert_eq!(classified.outliers.len(), 1);
        assert_eq!(classified.outliers[0].elapsed_days, Some(100));
    }

    #[test]
    fn lower_bound_can_exclude_small_values() {
        let classified = classify(valid(&[0, 20, 21, 22, 23, 24]));
        let bounds = classified.bounds.unwrap();
        assert!(bounds.lower > 0.0);
        assert!(bounds.lower <= bounds.upper);
        assert_eq!(classified.outliers[0].elapsed_days, Some(0));
    }

    #[test]
    fn empty_population_has_no_bounds() {
        assert_eq!(classify(Vec::new()), Classified::default());
    }

    #[test]
    fn identical_values_are_all_inliers() {
        let classified = classify(valid(&[4, 4, 4]));
        assert_eq!(classified.inliers.len(), 3);
        assert!(classified.outliers.is_empty());
    }

    #[test]
    fn split_keeps_order_within_each_side() {
        let mut records = valid(&[1, 2, 3]);
        records[1].elapsed_days = None;
        let (valid, open) = split_open(records);
        let ids: Vec<_> = valid.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, ["s0", "s2"]);
        assert_eq!(open[0].student_id, "s1");
    }
}
