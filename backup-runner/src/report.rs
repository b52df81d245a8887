//! Where a finished run's report goes.

use anyhow::Context;
use backup_engine::RunReport;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ReportSink {
    /// Print JSON instead of the text table
    pub json: bool,
    /// Also write the JSON report to this file
    pub path: Option<PathBuf>,
}

impl ReportSink {
    pub fn render(&self, report: &RunReport) -> anyhow::Result<String> {
        if self.json {
            Ok(report.to_json()?)
        } else {
            Ok(report.render_text())
        }
    }

    pub fn emit(&self, report: &RunReport) -> anyhow::Result<()> {
        println!("{}", self.render(report)?.trim_end());
        if let Some(path) = &self.path {
            report
                .save(path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        Ok(())
    }
}
