use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub student_id: String,
    pub cohort: String,
    pub pipeline_name: String,
    pub purchased_at: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
    /// Whole days between purchase and start, never negative.
    pub elapsed_days: Option<i64>,
    /// Set when the raw difference was negative and `elapsed_days` was clamped to zero.
    pub clamped: bool,
}

impl EnrollmentRecord {
    pub fn is_open(&self) -> bool {
        self.elapsed_days.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Empty sets place no constraint on their dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub student_ids: BTreeSet<String>,
    pub cohorts: BTreeSet<String>,
    pub pipelines: BTreeSet<String>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    pub fn admits(&self, days: i64) -> bool {
        let days = days as f64;
        self.lower <= days && days <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub mean_elapsed: Option<f64>,
    pub inlier_count: usize,
    pub excluded_count: usize,
    pub open_count: usize,
    pub clamped_count: usize,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeadTimeReport {
    pub criteria: FilterCriteria,
    pub bounds: Option<OutlierBounds>,
    pub inliers: Vec<EnrollmentRecord>,
    pub excluded: Vec<EnrollmentRecord>,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub student_ids: Vec<String>,
    pub cohorts: Vec<String>,
    pub pipelines: Vec<String>,
    pub purchase_range: Option<(NaiveDate, NaiveDate)>,
}
