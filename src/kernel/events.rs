//! Job lifecycle events, broadcast-only (§3 `JobEvent`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Job;

/// The kind of transition a `JobEvent` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    Queued,
    Started,
    Completed,
    Failed,
    Cancelled,
    PriorityChanged,
}

/// An observable queue transition, broadcast to admin subscribers via the
/// `EventBus`. Events are not persisted — they are a live feed only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: Job,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: Job) -> Self {
        Self {
            kind,
            job,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::job::JobType;

    fn sample_job() -> Job {
        Job::new(JobType::CollectEod, "AAPL")
    }

    #[test]
    fn event_serializes_with_kind_and_job() {
        let event = JobEvent::new(JobEventKind::Queued, sample_job());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Queued"));
        assert!(json.contains("AAPL"));
    }

    #[test]
    fn events_round_trip_serialize() {
        for kind in [
            JobEventKind::Queued,
            JobEventKind::Started,
            JobEventKind::Completed,
            JobEventKind::Failed,
            JobEventKind::Cancelled,
            JobEventKind::PriorityChanged,
        ] {
            let event = JobEvent::new(kind, sample_job());
            let json = serde_json::to_string(&event).unwrap();
            let back: JobEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind, kind);
        }
    }
}
