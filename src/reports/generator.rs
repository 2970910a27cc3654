use crate::error::{OrchestratorError, OrchestratorResult};
use crate::reports::formatters::{
    completeness_label, excerpt, format_latency, status_glyph, status_label,
};
use crate::types::{ConsolidatedReport, RunSummary};

/// Report generator for creating various output formats
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a run summary in the specified format
    pub fn generate(&self, summary: &RunSummary, format: &str) -> OrchestratorResult<String> {
        match format.to_lowercase().as_str() {
            "json" => self.generate_json(summary),
            "markdown" => Ok(self.generate_markdown(summary)),
            "text" => Ok(self.generate_text(summary)),
            _ => Err(OrchestratorError::Config(format!(
                "unsupported output format: {}",
                format
            ))),
        }
    }

    fn generate_json(&self, summary: &RunSummary) -> OrchestratorResult<String> {
        serde_json::to_string_pretty(summary)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))
    }

    fn generate_markdown(&self, summary: &RunSummary) -> String {
        let mut out = format!(
            r#"# Commit Review Report

**Repository**: {}
**Session**: {}
**Work units**: {} ({} partial)

"#,
            summary.session.repository,
            summary.session.session_id,
            summary.reports.len(),
            summary.partial_count(),
        );

        for report in &summary.reports {
            out.push_str(&self.markdown_section(report));
        }

        out.push_str(&format!(
            "---\n*Generated at: {}*\n",
            summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out
    }

    fn markdown_section(&self, report: &ConsolidatedReport) -> String {
        let mut section = format!(
            "## {} [{}]\n\n",
            report.work_unit_id,
            completeness_label(report.completeness)
        );

        for result in &report.results {
            section.push_str(&format!(
                "- {} `{}` — {} ({}, {} attempt{})",
                status_glyph(result.status),
                result.agent_id,
                status_label(result.status),
                format_latency(result.latency_ms),
                result.attempts,
                if result.attempts == 1 { "" } else { "s" },
            ));
            if !result.succeeded() && !result.payload.is_empty() {
                section.push_str(&format!(": {}", excerpt(&result.payload, 100)));
            }
            section.push('\n');
        }
        section.push('\n');
        section
    }

    fn generate_text(&self, summary: &RunSummary) -> String {
        let mut out = format!(
            r#"Commit Review Report
====================

Repository: {}
Session: {}
Work units: {} ({} partial)

"#,
            summary.session.repository,
            summary.session.session_id,
            summary.reports.len(),
            summary.partial_count(),
        );

        for report in &summary.reports {
            out.push_str(&format!(
                "{} [{}]\n",
                report.work_unit_id,
                completeness_label(report.completeness)
            ));
            for result in &report.results {
                out.push_str(&format!(
                    "  {}: {} ({}, {} attempts)\n",
                    result.agent_id,
                    status_label(result.status),
                    format_latency(result.latency_ms),
                    result.attempts,
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "Generated at: {}\n",
            summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}
