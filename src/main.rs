use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

mod error;
mod export;
mod filter;
mod loader;
mod models;
mod outliers;
mod report;

use models::{EnrollmentRecord, FilterCriteria};

#[derive(Parser)]
#[command(name = "enrollment-lead-time")]
#[command(about = "Average time from purchase to course start, with IQR outlier removal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Keep only these student ids (repeatable)
    #[arg(long = "student")]
    students: Vec<String>,
    /// Keep only these cohorts (repeatable)
    #[arg(long = "cohort")]
    cohorts: Vec<String>,
    /// Keep only these pipelines (repeatable)
    #[arg(long = "pipeline")]
    pipelines: Vec<String>,
    /// First purchase date to include (defaults to the earliest observed)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last purchase date to include (defaults to the latest observed)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn criteria(&self, records: &[EnrollmentRecord]) -> FilterCriteria {
        FilterCriteria {
            student_ids: self.students.iter().cloned().collect(),
            cohorts: self.cohorts.iter().cloned().collect(),
            pipelines: self.pipelines.iter().cloned().collect(),
            date_range: filter::resolve_date_range(records, self.from, self.to),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the values available to each filter
    Options {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the summary metrics for a filter selection
    Summary {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write the CSV exports and the HTML report
    Report {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Options { input, json } => {
            let records = loader::load_csv(&input)?;
            let options = filter::filter_options(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&options)?);
                return Ok(());
            }
            println!("student_id: {}", options.student_ids.join(", "));
            println!("cohort: {}", options.cohorts.join(", "));
            println!("pipeline_name: {}", options.pipelines.join(", "));
            match options.purchase_range {
                Some((start, end)) => println!("purchased_at: {start} to {end}"),
                None => println!("purchased_at: {}", report::NO_DATA),
            }
        }
        Commands::Summary {
            input,
            filters,
            json,
        } => {
            let records = loader::load_csv(&input)?;
            let criteria = filters.criteria(&records);
            let result = report::run_pipeline(&records, &criteria);
            if json {
                println!("{}", serde_json::to_string_pretty(&result.summary)?);
                return Ok(());
            }
            for line in report::summary_lines(&result.summary) {
                println!("{line}");
            }
        }
        Commands::Report {
            input,
            filters,
            out_dir,
        } => {
            let records = loader::load_csv(&input)?;
            let criteria = filters.criteria(&records);
            let result = report::run_pipeline(&records, &criteria);
            export::write_artifacts(&result, &out_dir)
                .with_context(|| format!("failed to write report to {}", out_dir.display()))?;
            for line in report::summary_lines(&result.summary) {
                println!("{line}");
            }
            println!("Report written to {}.", out_dir.display());
        }
    }

    Ok(())
}
