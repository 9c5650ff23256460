use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::events::{
    ACTIVITY_EVENTS, AGENT_STARTED, COMPLETION_EVENTS, ChatEvent, REQUIRED_EVENTS, TOOL_COMPLETED,
    TOOL_EXECUTING, is_activity, is_completion,
};

/// Any single event arriving later than this after session start fails the run.
pub const EVENT_LATENCY_CEILING_SECS: f64 = 30.0;
/// First-to-last spread above this is only worth a warning.
pub const SESSION_SPREAD_WARNING_SECS: f64 = 10.0;

/// One recorded frame, in arrival order.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    /// Seconds since the validator was created
    pub elapsed_secs: f64,
    pub event_type: Option<String>,
    pub has_timestamp: bool,
    pub raw: Value,
    /// Frame was not a JSON object
    pub malformed: bool,
}

/// Outcome of [`MissionCriticalValidator::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

/// Watches one chat session's event stream and judges it.
///
/// Created at session start, fed every frame in arrival order, asked for a
/// verdict at the end, then dropped. Recording never rejects anything;
/// validation never panics. Failures come back as data for the caller's
/// assertion layer.
#[derive(Debug)]
pub struct MissionCriticalValidator {
    start: Instant,
    timeline: Vec<TimelineEntry>,
    counts: BTreeMap<String, usize>,
}

impl Default for MissionCriticalValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionCriticalValidator {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            timeline: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    /// Record an event stamped with the time since construction.
    pub fn record_event(&mut self, event: ChatEvent) {
        let elapsed = self.start.elapsed();
        self.record_event_at(event, elapsed);
    }

    /// Record an event at an explicit offset from session start. Used when
    /// replaying a captured stream.
    pub fn record_event_at(&mut self, event: ChatEvent, elapsed: Duration) {
        if let Some(event_type) = event.event_type() {
            *self.counts.entry(event_type.to_string()).or_insert(0) += 1;
        }
        tracing::debug!(
            event_type = event.event_type().unwrap_or("<missing>"),
            elapsed_secs = elapsed.as_secs_f64(),
            "recorded event"
        );
        self.timeline.push(TimelineEntry {
            elapsed_secs: elapsed.as_secs_f64(),
            has_timestamp: event.timestamp.is_some(),
            event_type: event.event_type,
            raw: event.data,
            malformed: false,
        });
    }

    /// Record a frame that could not be parsed as an event object.
    pub fn record_malformed(&mut self, raw: impl Into<String>) {
        let elapsed = self.start.elapsed();
        self.record_malformed_at(raw, elapsed);
    }

    pub fn record_malformed_at(&mut self, raw: impl Into<String>, elapsed: Duration) {
        let raw = raw.into();
        tracing::warn!(len = raw.len(), elapsed_secs = elapsed.as_secs_f64(), "recorded malformed frame");
        self.timeline.push(TimelineEntry {
            elapsed_secs: elapsed.as_secs_f64(),
            event_type: None,
            has_timestamp: false,
            raw: Value::String(raw),
            malformed: true,
        });
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.counts.get(event_type).copied().unwrap_or(0)
    }

    /// Whether a completion-class event has been seen.
    pub fn is_complete(&self) -> bool {
        self.counts.keys().any(|t| is_completion(t))
    }

    /// Offset of the last recorded frame, or zero.
    pub fn elapsed_secs(&self) -> f64 {
        self.timeline.last().map(|e| e.elapsed_secs).unwrap_or(0.0)
    }

    fn typed_events(&self) -> impl Iterator<Item = &str> {
        self.timeline.iter().filter_map(|e| e.event_type.as_deref())
    }

    /// Run all five checks. Pure function of the recorded state.
    pub fn validate(&self) -> Verdict {
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        self.check_coverage(&mut failures);
        self.check_ordering(&mut failures);
        self.check_pairing(&mut failures);
        self.check_timing(&mut failures, &mut warnings);
        self.check_completeness(&mut failures, &mut warnings);

        Verdict {
            passed: failures.is_empty(),
            failures,
            warnings,
        }
    }

    fn check_coverage(&self, failures: &mut Vec<String>) {
        let missing: Vec<&str> = REQUIRED_EVENTS
            .iter()
            .copied()
            .filter(|t| !self.counts.contains_key(*t))
            .collect();
        if !missing.is_empty() {
            failures.push(format!("Missing required events: {}", missing.join(", ")));
        }
    }

    /// Ordering is judged over typed events only. Malformed frames and
    /// untyped events are skipped here and reported by the data check, so a
    /// malformed first frame followed by `agent_started` still orders.
    fn check_ordering(&self, failures: &mut Vec<String>) {
        let typed: Vec<&str> = self.typed_events().collect();
        let (Some(first), Some(last)) = (typed.first(), typed.last()) else {
            failures.push("Ordering: no typed events recorded".to_string());
            return;
        };

        if *first != AGENT_STARTED {
            failures.push(format!(
                "Ordering: first event was '{first}', expected '{AGENT_STARTED}'"
            ));
        }
        if !typed.iter().any(|t| is_activity(t)) {
            failures.push(format!(
                "Ordering: no activity event observed (expected one of {})",
                ACTIVITY_EVENTS.join(", ")
            ));
        }
        if !is_completion(last) {
            failures.push(format!(
                "Ordering: last event was '{last}', expected one of {}",
                COMPLETION_EVENTS.join(", ")
            ));
        }
    }

    fn check_pairing(&self, failures: &mut Vec<String>) {
        let started = self.count(TOOL_EXECUTING);
        let finished = self.count(TOOL_COMPLETED);
        if started != finished {
            failures.push(format!(
                "Tool event pairing mismatch: {started} {TOOL_EXECUTING} vs {finished} {TOOL_COMPLETED}"
            ));
        }
    }

    fn check_timing(&self, failures: &mut Vec<String>, warnings: &mut Vec<String>) {
        for (index, entry) in self.timeline.iter().enumerate() {
            if entry.elapsed_secs > EVENT_LATENCY_CEILING_SECS {
                failures.push(format!(
                    "Timing: event #{index} ('{}') arrived at {:.2}s, over the {EVENT_LATENCY_CEILING_SECS:.0}s ceiling",
                    entry.event_type.as_deref().unwrap_or("<untyped>"),
                    entry.elapsed_secs
                ));
            }
        }

        if let (Some(first), Some(last)) = (self.timeline.first(), self.timeline.last()) {
            let spread = last.elapsed_secs - first.elapsed_secs;
            if spread > SESSION_SPREAD_WARNING_SECS {
                warnings.push(format!(
                    "Timing: {spread:.2}s between first and last event (soft limit {SESSION_SPREAD_WARNING_SECS:.0}s)"
                ));
            }
        }
    }

    fn check_completeness(&self, failures: &mut Vec<String>, warnings: &mut Vec<String>) {
        let mut untyped = Vec::new();
        let mut malformed = Vec::new();
        let mut without_timestamp = 0usize;

        for (index, entry) in self.timeline.iter().enumerate() {
            if entry.malformed {
                malformed.push(index);
                continue;
            }
            if entry.event_type.is_none() {
                untyped.push(index);
            }
            if !entry.has_timestamp {
                without_timestamp += 1;
            }
        }

        if !untyped.is_empty() {
            failures.push(format!(
                "Data: {} event(s) missing 'type' field (#{})",
                untyped.len(),
                join_indices(&untyped)
            ));
        }
        if !malformed.is_empty() {
            warnings.push(format!(
                "Data: {} frame(s) were not JSON objects (#{})",
                malformed.len(),
                join_indices(&malformed)
            ));
        }
        if without_timestamp > 0 {
            warnings.push(format!(
                "Data: {without_timestamp} event(s) missing 'timestamp' field"
            ));
        }
    }
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", #")
}
