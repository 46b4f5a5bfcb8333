//! Incident detector: classifies log events into severity-tagged clusters.
//!
//! Each event is matched against a fixed signal table keyed on the parsed
//! message (`msg` replaces the raw line when the line is JSON). Events
//! sharing a signal key form one bucket; each bucket becomes one incident.
//! The detector is pure apart from id generation: equal inputs produce equal
//! buckets.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use incident::{Incident, LogEvent, Severity, MAX_EVIDENCE};
use serde_json::Value;
use uuid::Uuid;

/// Evidence lines are capped at this many characters.
const MAX_EVIDENCE_CHARS: usize = 500;

/// Route used when an event carries none.
const UNKNOWN_ROUTE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Signal {
    key: String,
    severity: Severity,
    label: &'static str,
}

/// The matcher's view of one event: display message plus optional JSON
/// fields.
#[derive(Debug, Default)]
struct ParsedEvent {
    display: String,
    event_type: Option<String>,
    route: Option<String>,
}

fn parse_event(event: &LogEvent) -> ParsedEvent {
    let mut parsed = ParsedEvent {
        display: event.message.clone(),
        ..ParsedEvent::default()
    };

    // Best-effort JSON: malformed lines fall back to the raw message.
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&event.message) {
        if let Some(Value::String(msg)) = fields.get("msg") {
            parsed.display.clone_from(msg);
        }
        if let Some(Value::String(event_type)) = fields.get("type") {
            parsed.event_type = Some(event_type.clone());
        }
        if let Some(Value::String(route)) = fields.get("route") {
            parsed.route = Some(route.clone());
        }
    }
    parsed
}

fn classify(parsed: &ParsedEvent) -> Signal {
    let route = parsed.route.as_deref().unwrap_or(UNKNOWN_ROUTE);
    let message = parsed.display.as_str();

    if parsed.event_type.as_deref() == Some("error_burst")
        || message.contains("Synthetic error burst")
    {
        Signal {
            key: format!("error_burst:{route}"),
            severity: Severity::High,
            label: "error_burst",
        }
    } else if message.contains("Simulated error") {
        Signal {
            key: format!("error:{route}"),
            severity: Severity::High,
            label: "error",
        }
    } else if message.contains("Slow response") {
        Signal {
            key: format!("slow:{route}"),
            severity: Severity::Medium,
            label: "latency",
        }
    } else if message.contains("Failed login attempt") {
        Signal {
            key: format!("auth:{route}"),
            severity: Severity::Low,
            label: "auth",
        }
    } else {
        Signal {
            key: format!("other:{route}"),
            severity: Severity::Low,
            label: "unknown",
        }
    }
}

struct Bucket {
    severity: Severity,
    label: &'static str,
    evidence: Vec<String>,
    count: u64,
    first_seen_ns: i128,
    first_seen: String,
    last_seen_ns: i128,
    last_seen: String,
}

/// Cluster one query window of events into incidents, sorted
/// severity-descending then key-ascending for deterministic escalation
/// order.
#[must_use]
pub fn detect_incidents(events: &[LogEvent]) -> Vec<Incident> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for event in events {
        let parsed = parse_event(event);
        let signal = classify(&parsed);
        let nanos = event.timestamp_nanos();

        let bucket = buckets.entry(signal.key.clone()).or_insert_with(|| Bucket {
            severity: signal.severity,
            label: signal.label,
            evidence: Vec::new(),
            count: 0,
            first_seen_ns: nanos,
            first_seen: event.timestamp.clone(),
            last_seen_ns: nanos,
            last_seen: event.timestamp.clone(),
        });

        bucket.count += 1;
        // Timestamps compare numerically: decimal strings of unequal width
        // would order wrongly as text.
        if nanos < bucket.first_seen_ns {
            bucket.first_seen_ns = nanos;
            bucket.first_seen.clone_from(&event.timestamp);
        }
        if nanos > bucket.last_seen_ns {
            bucket.last_seen_ns = nanos;
            bucket.last_seen.clone_from(&event.timestamp);
        }
        if bucket.evidence.len() < MAX_EVIDENCE {
            bucket.evidence.push(truncate_chars(&parsed.display, MAX_EVIDENCE_CHARS));
        }
    }

    let mut incidents: Vec<(String, Incident)> = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let incident = Incident {
                id: Uuid::new_v4(),
                title: format!("Incident: {} ({key})", bucket.label),
                severity: bucket.severity,
                evidence: bucket.evidence,
                first_seen: bucket.first_seen,
                last_seen: bucket.last_seen,
                count: bucket.count,
            };
            (key, incident)
        })
        .collect();

    incidents.sort_by(|(key_a, a), (key_b, b)| {
        (Reverse(a.severity), key_a).cmp(&(Reverse(b.severity), key_b))
    });
    incidents.into_iter().map(|(_, incident)| incident).collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(timestamp: &str, message: &str) -> LogEvent {
        LogEvent {
            timestamp: timestamp.to_string(),
            message: message.to_string(),
            labels: HashMap::new(),
        }
    }

    fn json_event(timestamp: &str, msg: &str, event_type: Option<&str>, route: &str) -> LogEvent {
        let mut body = serde_json::json!({"msg": msg, "route": route});
        if let Some(t) = event_type {
            body["type"] = serde_json::json!(t);
        }
        event(timestamp, &body.to_string())
    }

    #[test]
    fn test_seed_scenario_two_incidents() {
        let events = vec![
            json_event("100", "Synthetic error burst", Some("error_burst"), "/api/orders"),
            json_event("200", "Slow response", None, "/slow"),
        ];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 2);
        // Severity-descending: high before medium.
        assert_eq!(incidents[0].severity, Severity::High);
        assert_eq!(incidents[0].title, "Incident: error_burst (error_burst:/api/orders)");
        assert_eq!(incidents[1].severity, Severity::Medium);
        assert_eq!(incidents[1].title, "Incident: latency (slow:/slow)");
    }

    #[test]
    fn test_empty_input_yields_no_incidents() {
        assert!(detect_incidents(&[]).is_empty());
    }

    #[test]
    fn test_malformed_json_is_classified_from_raw_message() {
        let events = vec![event("1", "{not json Simulated error")];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, Severity::High);
        assert_eq!(incidents[0].title, "Incident: error (error:unknown)");
    }

    #[test]
    fn test_bucket_aggregation_and_evidence_cap() {
        let events: Vec<LogEvent> = (0..8)
            .map(|i| json_event(&format!("{}", 100 + i), "Simulated error", None, "/api/pay"))
            .collect();
        let incidents = detect_incidents(&events);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].count, 8);
        assert_eq!(incidents[0].evidence.len(), MAX_EVIDENCE);
        assert_eq!(incidents[0].first_seen, "100");
        assert_eq!(incidents[0].last_seen, "107");
    }

    #[test]
    fn test_timestamps_compare_numerically_not_lexicographically() {
        let events = vec![
            json_event("1000", "Simulated error", None, "/a"),
            json_event("999", "Simulated error", None, "/a"),
        ];
        let incidents = detect_incidents(&events);
        // Lexicographically "1000" < "999"; numerically 999 is first.
        assert_eq!(incidents[0].first_seen, "999");
        assert_eq!(incidents[0].last_seen, "1000");
    }

    #[test]
    fn test_detector_pure_modulo_ids() {
        let events = vec![
            json_event("5", "Failed login attempt", None, "/login"),
            json_event("6", "something else entirely", None, "/misc"),
            event("7", "Slow response"),
        ];
        let first = detect_incidents(&events);
        let second = detect_incidents(&events);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_ne!(a.id, b.id);
            assert_eq!(a.title, b.title);
            assert_eq!(a.severity, b.severity);
            assert_eq!(a.evidence, b.evidence);
            assert_eq!(a.count, b.count);
            assert_eq!(a.first_seen, b.first_seen);
            assert_eq!(a.last_seen, b.last_seen);
        }
    }

    #[test]
    fn test_missing_route_defaults_to_unknown() {
        let events = vec![event("1", "{\"msg\": \"Slow response\"}")];
        let incidents = detect_incidents(&events);
        assert_eq!(incidents[0].title, "Incident: latency (slow:unknown)");
    }
}
