use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, Result};
use crate::models::EnrollmentRecord;

const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Header names accepted for each logical column, canonical name first.
const STUDENT_ID: &[&str] = &["student_id", "aluno_id"];
const COHORT: &[&str] = &["cohort", "turma"];
const PIPELINE_NAME: &[&str] = &["pipeline_name"];
const PURCHASED_AT: &[&str] = &["purchased_at", "closed_at"];
const STARTED_AT: &[&str] = &["started_at", "inicio_at"];

pub fn load_csv(path: &Path) -> Result<Vec<EnrollmentRecord>> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| PipelineError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    let records = read_records(reader, path)?;
    log::info!("Loaded {} enrollment records from {}", records.len(), path.display());
    Ok(records)
}

fn read_records<R: Read>(mut reader: csv::Reader<R>, path: &Path) -> Result<Vec<EnrollmentRecord>> {
    let unreadable = |source| PipelineError::InputUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let headers = reader.headers().map_err(unreadable)?.clone();
    let locate = |names: &'static [&'static str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|name| *name == h.trim()))
            .ok_or(PipelineError::MissingColumn {
                path: path.to_path_buf(),
                column: names[0],
            })
    };
    let student_idx = locate(STUDENT_ID)?;
    let cohort_idx = locate(COHORT)?;
    let pipeline_idx = locate(PIPELINE_NAME)?;
    let purchased_idx = locate(PURCHASED_AT)?;
    let started_idx = locate(STARTED_AT)?;

    let mut records = Vec::new();
    let mut unparsable = 0usize;
    let mut lossy_rows = 0usize;

    for (row_no, result) in reader.byte_records().enumerate() {
        let row = result.map_err(unreadable)?;
        if std::str::from_utf8(row.as_slice()).is_err() {
            lossy_rows += 1;
            log::debug!("Row {row_no}: invalid UTF-8 replaced");
        }
        let cell = |idx: usize| {
            String::from_utf8_lossy(row.get(idx).unwrap_or_default())
                .trim()
                .to_string()
        };

        let mut timestamp = |idx: usize, column: &str| {
            let raw = cell(idx);
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() && !raw.is_empty() {
                unparsable += 1;
                log::debug!("Row {row_no}: unparsable {column} value '{raw}'");
            }
            parsed
        };
        let purchased_at = timestamp(purchased_idx, "purchased_at");
        let started_at = timestamp(started_idx, "started_at");

        let (elapsed_days, clamped) = elapsed_days(purchased_at, started_at);
        records.push(EnrollmentRecord {
            student_id: cell(student_idx),
            cohort: cell(cohort_idx),
            pipeline_name: cell(pipeline_idx),
            purchased_at,
            started_at,
            elapsed_days,
            clamped,
        });
    }

    if lossy_rows > 0 {
        log::warn!(
            "{} rows in {} held invalid UTF-8; offending bytes were replaced",
            lossy_rows,
            path.display()
        );
    }
    if unparsable > 0 {
        log::warn!(
            "{} date values in {} could not be parsed and were treated as missing",
            unparsable,
            path.display()
        );
    }

    Ok(records)
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Floor of the day difference, clamped at zero. The flag reports whether clamping happened.
pub fn elapsed_days(
    purchased_at: Option<NaiveDateTime>,
    started_at: Option<NaiveDateTime>,
) -> (Option<i64>, bool) {
    match (purchased_at, started_at) {
        (Some(purchased), Some(started)) => {
            let days = (started - purchased).num_seconds().div_euclid(SECONDS_PER_DAY);
            (Some(days.max(0)), days < 0)
        }
        _ => (None, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_reader(input: &str, label: &str) -> Result<Vec<EnrollmentRecord>> {
        load_bytes(input.as_bytes(), label)
    }

    fn load_bytes(input: &[u8], label: &str) -> Result<Vec<EnrollmentRecord>> {
        let reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
        read_records(reader, Path::new(label))
    }

    fn at(date: &str) -> Option<NaiveDateTime> {
        parse_timestamp(date)
    }

    #[test]
    fn elapsed_days_counts_whole_days() {
        assert_eq!(elapsed_days(at("2024-01-01"), at("2024-01-10")), (Some(9), false));
        assert_eq!(
            elapsed_days(at("2024-01-01 18:00:00"), at("2024-01-03 06:00:00")),
            (Some(1), false)
        );
    }

    #[test]
    fn negative_difference_is_clamped() {
        assert_eq!(elapsed_days(at("2024-01-10"), at("2024-01-01")), (Some(0), true));
    }

    #[test]
    fn missing_date_leaves_elapsed_empty() {
        assert_eq!(elapsed_days(at("2024-01-10"), None), (None, false));
        assert_eq!(elapsed_days(None, at("2024-01-10")), (None, false));
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-05 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T16:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 14:30"), Some(expected));
        assert!(parse_timestamp("2024/03/05").is_some());
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn loads_rows_with_bad_fields_as_nulls() {
        let data = "\
student_id,cohort,pipeline_name,purchased_at,started_at
s1,T1,sales,2024-01-01,2024-01-10
s2,T1,sales,garbage,2024-01-10
s3,T2,upsell,2024-01-05,
s4,T2,upsell,2024-01-05
";
        let records = load_reader(data, "inline.csv").unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].elapsed_days, Some(9));
        assert_eq!(records[1].purchased_at, None);
        assert_eq!(records[1].elapsed_days, None);
        assert!(records[2].is_open());
        assert_eq!(records[3].started_at, None);
        assert_eq!(records[3].pipeline_name, "upsell");
    }

    #[test]
    fn accepts_original_column_names() {
        let data = "\
aluno_id,turma,pipeline_name,closed_at,inicio_at,extra
42,Turma A,inbound,2024-02-01 09:00:00,2024-02-04 10:00:00,x
";
        let records = load_reader(data, "vagas.csv").unwrap();
        assert_eq!(records[0].student_id, "42");
        assert_eq!(records[0].cohort, "Turma A");
        assert_eq!(records[0].elapsed_days, Some(3));
    }

    #[test]
    fn invalid_utf8_in_one_row_keeps_the_rest() {
        let mut data = b"student_id,cohort,pipeline_name,purchased_at,started_at\n".to_vec();
        data.extend_from_slice(b"s1,T1,sales,2024-01-01,2024-01-04\n");
        data.extend_from_slice(b"s2,Turma S\xE3o,sales,2024-01-02,2024-01-03\n");
        data.extend_from_slice(b"s3,T2,sales,2024-01-02,\n");

        let records = load_bytes(&data, "latin1.csv").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].elapsed_days, Some(3));
        assert_eq!(records[1].cohort, "Turma S\u{FFFD}o");
        assert_eq!(records[1].elapsed_days, Some(1));
        assert!(records[2].is_open());
    }

    #[test]
    fn missing_column_is_reported() {
        let data = "student_id,cohort,purchased_at,started_at\ns1,T1,2024-01-01,2024-01-02\n";
        let err = load_reader(data, "short.csv").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingColumn { column: "pipeline_name", .. }
        ));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_csv(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::InputUnreadable { .. }));
    }

    #[test]
    fn loads_from_disk_in_source_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,cohort,pipeline_name,purchased_at,started_at").unwrap();
        writeln!(file, "b,T1,p,2024-01-01,2024-01-02").unwrap();
        writeln!(file, "a,T1,p,2024-01-01,2024-01-03").unwrap();
        let records = load_csv(file.path()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }
}
