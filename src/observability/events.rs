//! Index lifecycle events
//!
//! Point events are named here. Timed operations (`INDEX_BUILD`,
//! `INDEX_SERIALIZE`, `INDEX_APPEND`) are logged by
//! [`ObservationScope`](super::ObservationScope).

use std::fmt;

use super::logger::Severity;

/// Observable events in the index lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Construction
    /// Whole-array read failed, falling back to positioned reads
    FallbackRead,

    // Persistence
    /// Serialization skipped because the target is the source file
    SerializeSkipped,
    /// Index loaded from a file or buffer
    Deserialize,
    /// A corrupt index file was flushed and removed
    CorruptEvicted,
    /// Bins read from backing storage
    Activate,

    // Append
    /// Partial index unioned into the existing one
    AppendMerged,
    /// Partial index adopted as the whole index
    AppendAdopted,
    /// Index rebuilt from the concatenated column
    AppendRebuild,
    /// Partial index could not be merged
    MergeIncompatible,

    // Query
    /// A query was evaluated against the bins
    QueryEvaluated,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::FallbackRead => "INDEX_FALLBACK_READ",
            Event::SerializeSkipped => "INDEX_SERIALIZE_SKIPPED",
            Event::Deserialize => "INDEX_DESERIALIZE",
            Event::CorruptEvicted => "INDEX_CORRUPT_EVICTED",
            Event::Activate => "INDEX_ACTIVATE",
            Event::AppendMerged => "INDEX_APPEND_MERGED",
            Event::AppendAdopted => "INDEX_APPEND_ADOPTED",
            Event::AppendRebuild => "INDEX_APPEND_REBUILD",
            Event::MergeIncompatible => "INDEX_MERGE_INCOMPATIBLE",
            Event::QueryEvaluated => "INDEX_QUERY_EVALUATED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::Activate | Event::QueryEvaluated | Event::SerializeSkipped => Severity::Trace,
            Event::FallbackRead
            | Event::CorruptEvicted
            | Event::AppendRebuild
            | Event::MergeIncompatible => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let events = [
            Event::FallbackRead,
            Event::SerializeSkipped,
            Event::Deserialize,
            Event::CorruptEvicted,
            Event::Activate,
            Event::AppendMerged,
            Event::AppendAdopted,
            Event::AppendRebuild,
            Event::MergeIncompatible,
            Event::QueryEvaluated,
        ];

        for event in events {
            let s = event.as_str();
            assert!(s.starts_with("INDEX_"));
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_severities() {
        assert_eq!(Event::MergeIncompatible.severity(), Severity::Warn);
        assert_eq!(Event::Deserialize.severity(), Severity::Info);
        assert_eq!(Event::Activate.severity(), Severity::Trace);
    }
}
