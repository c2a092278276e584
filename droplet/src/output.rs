//! Sweep report printing, as text or JSON.

use anyhow::Result;
use chrono::{DateTime, Utc};
use droplet_core::SweepStats;
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};

/// Prints command results to stdout and failures to stderr.
#[derive(Debug, Clone, Copy)]
pub struct OutputWriter {
    json: bool,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a sweep report.
    pub fn write_sweep(&self, report: &SweepOutput) -> Result<()> {
        let mut stdout = io::stdout().lock();
        if self.json {
            serde_json::to_writer_pretty(&mut stdout, report)?;
            writeln!(stdout)?;
        } else {
            write!(stdout, "{}", report.to_text())?;
        }
        Ok(())
    }

    /// Print a failure to stderr.
    pub fn write_error(&self, error: &anyhow::Error) {
        let _ = writeln!(io::stderr().lock(), "{}", self.render_error(error));
    }

    /// JSON mode renders `{"success": false, "error": ..}`.
    fn render_error(&self, error: &anyhow::Error) -> String {
        let message = format!("{:#}", error);
        if self.json {
            format!("{:#}", json!({ "success": false, "error": message }))
        } else {
            format!("Error: {}", message)
        }
    }
}

/// Output for `sweep` command.
#[derive(Debug, Serialize)]
pub struct SweepOutput {
    pub success: bool,
    pub root: String,
    pub started_at: DateTime<Utc>,
    /// Retention age in seconds; absent in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_secs: Option<u64>,
    #[serde(flatten)]
    pub stats: SweepStats,
}

impl SweepOutput {
    /// Human-readable summary.
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Removed {} files ({} bytes)\nRemoved {} empty directories\n",
            self.stats.files_removed, self.stats.bytes_freed, self.stats.dirs_removed
        );
        if self.stats.failures > 0 {
            text.push_str(&format!(
                "{} entries could not be removed (see log)\n",
                self.stats.failures
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(failures: usize) -> SweepOutput {
        SweepOutput {
            success: true,
            root: "/tmp/droplet".to_string(),
            started_at: DateTime::from_timestamp(0, 0).unwrap(),
            retention_secs: Some(259200),
            stats: SweepStats {
                files_removed: 2,
                bytes_freed: 10,
                dirs_removed: 1,
                failures,
            },
        }
    }

    #[test]
    fn test_sweep_output_json_is_flat() {
        let value = serde_json::to_value(sample(0)).unwrap();
        assert_eq!(value["files_removed"], 2);
        assert_eq!(value["bytes_freed"], 10);
        assert_eq!(value["dirs_removed"], 1);
        assert_eq!(value["retention_secs"], 259200);
        assert_eq!(value["started_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["success"], true);
        assert!(value.get("result_code").is_none());
    }

    #[test]
    fn test_sweep_output_text() {
        let text = sample(0).to_text();
        assert_eq!(
            text,
            "Removed 2 files (10 bytes)\nRemoved 1 empty directories\n"
        );
        assert!(sample(3).to_text().contains("3 entries could not be removed"));
    }

    #[test]
    fn test_debug_retention_omitted() {
        let mut output = sample(0);
        output.retention_secs = None;
        let value = serde_json::to_value(output).unwrap();
        assert!(value.get("retention_secs").is_none());
    }

    #[test]
    fn test_error_rendering() {
        let error = anyhow::anyhow!("root missing").context("Failed to sweep storage root");

        let text = OutputWriter::new(false).render_error(&error);
        assert_eq!(text, "Error: Failed to sweep storage root: root missing");

        let rendered = OutputWriter::new(true).render_error(&error);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "error": "Failed to sweep storage root: root missing" })
        );
    }
}
