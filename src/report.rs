use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::filter;
use crate::models::{EnrollmentRecord, FilterCriteria, LeadTimeReport, Summary};
use crate::outliers;

pub const NO_DATA: &str = "no data";

/// Column headers shared by the CSV exports and the HTML tables.
pub const COLUMNS: [&str; 6] = [
    "student_id",
    "cohort",
    "pipeline_name",
    "purchased_at",
    "started_at",
    "elapsed_days",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Filter, split, classify and aggregate. Every record of the filtered
/// population ends up in exactly one of the inlier or excluded tables.
pub fn run_pipeline(records: &[EnrollmentRecord], criteria: &FilterCriteria) -> LeadTimeReport {
    let filtered = filter::apply_filters(records, criteria);
    let clamped_count = filtered.iter().filter(|r| r.clamped).count();
    log::debug!("{} of {} records pass the filters", filtered.len(), records.len());

    let (valid, open) = outliers::split_open(filtered);
    let classified = outliers::classify(valid);
    log::debug!(
        "{} inliers, {} statistical outliers, {} open",
        classified.inliers.len(),
        classified.outliers.len(),
        open.len()
    );

    let open_count = open.len();
    let mut excluded = classified.outliers;
    excluded.extend(open);

    let summary = Summary {
        mean_elapsed: mean_elapsed(&classified.inliers),
        inlier_count: classified.inliers.len(),
        excluded_count: excluded.len(),
        open_count,
        clamped_count,
        lower_bound: classified.bounds.map(|b| b.lower),
        upper_bound: classified.bounds.map(|b| b.upper),
    };

    LeadTimeReport {
        criteria: criteria.clone(),
        bounds: classified.bounds,
        inliers: classified.inliers,
        excluded,
        summary,
    }
}

pub fn mean_elapsed(records: &[EnrollmentRecord]) -> Option<f64> {
    let days: Vec<i64> = records.iter().filter_map(|r| r.elapsed_days).collect();
    if days.is_empty() {
        return None;
    }
    Some(days.iter().sum::<i64>() as f64 / days.len() as f64)
}

pub fn format_timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// The six exported cells of a record, in `COLUMNS` order.
pub fn row_cells(record: &EnrollmentRecord) -> [String; 6] {
    [
        record.student_id.clone(),
        record.cohort.clone(),
        record.pipeline_name.clone(),
        format_timestamp(record.purchased_at),
        format_timestamp(record.started_at),
        record.elapsed_days.map(|d| d.to_string()).unwrap_or_default(),
    ]
}

fn or_no_data(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_else(|| NO_DATA.to_string())
}

pub fn summary_lines(summary: &Summary) -> Vec<String> {
    vec![
        format!("Mean days from purchase to start (outliers removed): {}", or_no_data(summary.mean_elapsed, 2)),
        format!("Records used in the mean: {}", summary.inlier_count),
        format!("Records excluded (outliers and open): {}", summary.excluded_count),
        format!("Open records (not started): {}", summary.open_count),
        format!("Start recorded before purchase (clamped to 0): {}", summary.clamped_count),
        format!("Lower bound (IQR): {}", or_no_data(summary.lower_bound, 2)),
        format!("Upper bound (IQR): {}", or_no_data(summary.upper_bound, 2)),
    ]
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn joined(values: &std::collections::BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn write_filter_table(output: &mut String, criteria: &FilterCriteria) {
    let _ = writeln!(output, "<h3>Applied filters</h3>");
    let _ = writeln!(output, "<table class=\"filters\">");
    let dimensions = [
        ("student_id", &criteria.student_ids),
        ("cohort", &criteria.cohorts),
        ("pipeline_name", &criteria.pipelines),
    ];
    for (name, values) in dimensions {
        if !values.is_empty() {
            let _ = writeln!(
                output,
                "<tr><td><strong>{name}</strong></td><td>{}</td></tr>",
                escape_html(&joined(values))
            );
        }
    }
    if let Some(range) = criteria.date_range {
        let _ = writeln!(
            output,
            "<tr><td><strong>Purchase date</strong></td><td>{} to {}</td></tr>",
            range.start, range.end
        );
    }
    let _ = writeln!(output, "</table>");
}

fn write_table(output: &mut String, records: &[EnrollmentRecord]) {
    let _ = writeln!(output, "<table>");
    let _ = write!(output, "<thead><tr>");
    for column in COLUMNS {
        let _ = write!(output, "<th>{column}</th>");
    }
    let _ = writeln!(output, "</tr></thead>");
    let _ = writeln!(output, "<tbody>");
    for record in records {
        let _ = write!(output, "<tr>");
        for cell in row_cells(record) {
            let _ = write!(output, "<td>{}</td>", escape_html(&cell));
        }
        let _ = writeln!(output, "</tr>");
    }
    let _ = writeln!(output, "</tbody>");
    let _ = writeln!(output, "</table>");
}

const STYLE: &str = r#"body { background-color: #010c26; color: white; font-family: Arial, sans-serif; padding: 40px; }
h1 { color: #ff5c52; }
.collapsible { background-color: #ff5c52; color: white; cursor: pointer; padding: 10px; width: 100%; border: none; text-align: left; font-size: 16px; margin-top: 20px; }
.content { display: none; max-height: 400px; overflow-y: auto; padding: 10px; background-color: white; color: black; margin-bottom: 20px; }
table { border-collapse: collapse; width: 100%; }
table.filters { background-color: white; color: black; width: auto; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #ff5c52; color: white; }"#;

const SCRIPT: &str = r#"for (const button of document.getElementsByClassName("collapsible")) {
  button.addEventListener("click", function () {
    const content = this.nextElementSibling;
    content.style.display = content.style.display === "block" ? "none" : "block";
  });
}"#;

pub fn build_html(report: &LeadTimeReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html>");
    let _ = writeln!(output, "<head>");
    let _ = writeln!(output, "<meta charset=\"utf-8\">");
    let _ = writeln!(output, "<title>Purchase to Start Lead Time</title>");
    let _ = writeln!(output, "<style>\n{STYLE}\n</style>");
    let _ = writeln!(output, "</head>");
    let _ = writeln!(output, "<body>");
    let _ = writeln!(output, "<h1>Mean Time Between Purchase and Course Start</h1>");
    let _ = writeln!(
        output,
        "<p>Statistical outliers removed with the IQR method; open enrollments are reported with the outliers.</p>"
    );

    write_filter_table(&mut output, &report.criteria);

    let mean = summary
        .mean_elapsed
        .map(|m| format!("{m:.2} days"))
        .unwrap_or_else(|| NO_DATA.to_string());
    let _ = writeln!(output, "<h3>Mean (outliers removed): {mean}</h3>");
    let quartiles = report
        .bounds
        .map(|b| format!("Q1 {:.2}, Q3 {:.2}, IQR {:.2}", b.q1, b.q3, b.iqr))
        .unwrap_or_else(|| NO_DATA.to_string());
    let metrics = [
        ("Quartiles of elapsed days", quartiles),
        ("Records used in the mean", summary.inlier_count.to_string()),
        ("Records excluded", summary.excluded_count.to_string()),
        ("Open records (not started)", summary.open_count.to_string()),
        ("Start before purchase (clamped)", summary.clamped_count.to_string()),
        ("Lower bound (IQR)", or_no_data(summary.lower_bound, 2)),
        ("Upper bound (IQR)", or_no_data(summary.upper_bound, 2)),
    ];
    for (label, value) in metrics {
        let _ = writeln!(output, "<p><strong>{label}:</strong> {value}</p>");
    }

    let _ = writeln!(output, "<button class=\"collapsible\">Records used in the mean</button>");
    let _ = writeln!(output, "<div class=\"content\">");
    write_table(&mut output, &report.inliers);
    let _ = writeln!(output, "</div>");

    let _ = writeln!(
        output,
        "<button class=\"collapsible\">Excluded records (outliers and open)</button>"
    );
    let _ = writeln!(output, "<div class=\"content\">");
    write_table(&mut output, &report.excluded);
    let _ = writeln!(output, "</div>");

    let _ = writeln!(output, "<script>\n{SCRIPT}\n</script>");
    let _ = writeln!(output, "</body>");
    let _ = writeln!(output, "</html>");
    output
}
