use crate::events::REQUIRED_EVENTS;
use crate::validator::{MissionCriticalValidator, TimelineEntry};

/// Number of timeline entries shown before truncating.
pub const TIMELINE_PREVIEW: usize = 10;

impl MissionCriticalValidator {
    /// Render the fixed-format diagnostic report for the current state.
    pub fn generate_report(&self) -> String {
        let verdict = self.validate();
        let timeline = self.timeline();
        let mut lines = Vec::new();

        lines.push("=== MISSION CRITICAL EVENT VALIDATION ===".to_string());
        lines.push(format!(
            "Result: {}",
            if verdict.passed { "PASSED" } else { "FAILED" }
        ));
        lines.push(format!("Elapsed: {:.2}s", self.elapsed_secs()));
        lines.push(format!("Events recorded: {}", timeline.len()));

        lines.push(String::new());
        lines.push("Required events:".to_string());
        for event_type in REQUIRED_EVENTS {
            let count = self.count(event_type);
            let mark = if count > 0 { "x" } else { " " };
            lines.push(format!("  [{mark}] {event_type:<16} {count}"));
        }

        lines.push(String::new());
        push_section(&mut lines, "Failures", &verdict.failures);
        push_section(&mut lines, "Warnings", &verdict.warnings);

        lines.push(String::new());
        lines.push(format!(
            "Timeline (first {} of {}):",
            timeline.len().min(TIMELINE_PREVIEW),
            timeline.len()
        ));
        for entry in timeline.iter().take(TIMELINE_PREVIEW) {
            lines.push(format!("  +{:>7.2}s {}", entry.elapsed_secs, label(entry)));
        }
        if timeline.len() > TIMELINE_PREVIEW {
            lines.push(format!("  ... and {} more", timeline.len() - TIMELINE_PREVIEW));
        }

        lines.join("\n")
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    lines.push(format!("{title} ({}):", items.len()));
    if items.is_empty() {
        lines.push("  none".to_string());
    }
    for item in items {
        lines.push(format!("  - {item}"));
    }
}

fn label(entry: &TimelineEntry) -> &str {
    if entry.malformed {
        "<malformed>"
    } else {
        entry.event_type.as_deref().unwrap_or("<missing type>")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::ChatEvent;

    fn validator_with(types: &[&str]) -> MissionCriticalValidator {
        let mut validator = MissionCriticalValidator::new();
        for (i, t) in types.iter().enumerate() {
            validator.record_event_at(
                ChatEvent::new(*t).with_timestamp(i as f64),
                Duration::from_millis(100 * i as u64),
            );
        }
        validator
    }

    #[test]
    fn report_is_idempotent() {
        let validator = validator_with(&["agent_started", "tool_executing"]);
        assert_eq!(validator.generate_report(), validator.generate_report());
    }

    #[test]
    fn report_lists_verdict_table_and_failures() {
        let report = validator_with(&["agent_started", "agent_thinking", "agent_completed"]).generate_report();
        assert!(report.contains("Result: FAILED"));
        assert!(report.contains("[x] agent_started"));
        assert!(report.contains("[ ] tool_executing"));
        assert!(report.contains("Missing required events: tool_executing, tool_completed"));
        assert!(report.contains("Warnings (0):"));
    }

    #[test]
    fn passing_report() {
        let report = validator_with(&[
            "agent_started",
            "agent_thinking",
            "tool_executing",
            "tool_completed",
            "agent_completed",
        ])
        .generate_report();
        assert!(report.contains("Result: PASSED"));
        assert!(report.contains("Failures (0):"));
        assert!(report.contains("Elapsed: 0.40s"));
    }

    #[test]
    fn timeline_is_truncated_after_ten_entries() {
        let types: Vec<&str> = std::iter::once("agent_started")
            .chain(std::iter::repeat_n("agent_thinking", 12))
            .collect();
        let report = validator_with(&types).generate_report();
        assert!(report.contains("Timeline (first 10 of 13):"));
        assert!(report.contains("... and 3 more"));
    }
}
