use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::models::{DateRange, EnrollmentRecord, FilterCriteria, FilterOptions};

/// Keep the records passing every active dimension, in source order.
pub fn apply_filters(records: &[EnrollmentRecord], criteria: &FilterCriteria) -> Vec<EnrollmentRecord> {
    records
        .iter()
        .filter(|record| matches(record, criteria))
        .cloned()
        .collect()
}

pub fn matches(record: &EnrollmentRecord, criteria: &FilterCriteria) -> bool {
    if !allows(&criteria.student_ids, &record.student_id) {
        return false;
    }
    if !allows(&criteria.cohorts, &record.cohort) {
        return false;
    }
    if !allows(&criteria.pipelines, &record.pipeline_name) {
        return false;
    }
    match criteria.date_range {
        // A missing purchase date never lies within a range.
        Some(range) => record
            .purchased_at
            .is_some_and(|purchased| range.contains(purchased.date())),
        None => true,
    }
}

fn allows(selected: &BTreeSet<String>, value: &str) -> bool {
    selected.is_empty() || selected.contains(value)
}

pub fn observed_purchase_range(records: &[EnrollmentRecord]) -> Option<DateRange> {
    let dates = records.iter().filter_map(|r| r.purchased_at.map(|p| p.date()));
    dates.fold(None, |range: Option<DateRange>, date| match range {
        Some(range) => Some(DateRange {
            start: range.start.min(date),
            end: range.end.max(date),
        }),
        None => Some(DateRange { start: date, end: date }),
    })
}

/// Resolve the date interval, filling an absent endpoint from the observed purchase dates.
pub fn resolve_date_range(
    records: &[EnrollmentRecord],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Option<DateRange> {
    let observed = observed_purchase_range(records);
    let start = from.or(observed.map(|r| r.start))?;
    let end = to.or(observed.map(|r| r.end))?;
    Some(DateRange { start, end })
}

pub fn filter_options(records: &[EnrollmentRecord]) -> FilterOptions {
    fn distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
        values
            .filter(|v| !v.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    FilterOptions {
        student_ids: distinct(records.iter().map(|r| &r.student_id)),
        cohorts: distinct(records.iter().map(|r| &r.cohort)),
        pipelines: distinct(records.iter().map(|r| &r.pipeline_name)),
        purchase_range: observed_purchase_range(records).map(|r| (r.start, r.end)),
    }
}
