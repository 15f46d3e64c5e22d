use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};
use crate::models::{EnrollmentRecord, LeadTimeReport};
use crate::report;

pub const INLIERS_FILE: &str = "inliers.csv";
pub const EXCLUDED_FILE: &str = "excluded.csv";
pub const REPORT_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct WrittenArtifacts {
    pub inliers: PathBuf,
    pub excluded: PathBuf,
    pub report: PathBuf,
}

pub fn encode_csv(records: &[EnrollmentRecord], path: &Path) -> Result<Vec<u8>> {
    let encode = |source| PipelineError::ExportEncode {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(report::COLUMNS).map_err(encode)?;
    for record in records {
        writer.write_record(report::row_cells(record)).map_err(encode)?;
    }
    writer
        .into_inner()
        .map_err(|err| PipelineError::ExportWrite {
            path: path.to_path_buf(),
            source: err.into_error(),
        })
}

/// Replace `path` with `contents` only once they are fully on disk.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let write_failed = |source| PipelineError::ExportWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir).map_err(write_failed)?;
    staged.write_all(contents).map_err(write_failed)?;
    staged.flush().map_err(write_failed)?;
    staged
        .persist(path)
        .map_err(|err| write_failed(err.error))?;
    Ok(())
}

pub fn write_artifacts(report: &LeadTimeReport, out_dir: &Path) -> Result<WrittenArtifacts> {
    fs::create_dir_all(out_dir).map_err(|source| PipelineError::ExportWrite {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let artifacts = WrittenArtifacts {
        inliers: out_dir.join(INLIERS_FILE),
        excluded: out_dir.join(EXCLUDED_FILE),
        report: out_dir.join(REPORT_FILE),
    };

    // Encode everything up front so a failure leaves the directory untouched.
    let inliers_csv = encode_csv(&report.inliers, &artifacts.inliers)?;
    let excluded_csv = encode_csv(&report.excluded, &artifacts.excluded)?;
    let html = report::build_html(report);

    write_atomic(&artifacts.inliers, &inliers_csv)?;
    write_atomic(&artifacts.excluded, &excluded_csv)?;
    write_atomic(&artifacts.report, html.as_bytes())?;

    for path in [&artifacts.inliers, &artifacts.excluded, &artifacts.report] {
        log::info!("Wrote {}", path.display());
    }
    Ok(artifacts)
}
