//! # Recording Path Decision
//!
//! Decides, per completed session, where the sale record goes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Session Completion Routing                            │
//! │                                                                         │
//! │  session complete                                                      │
//! │       │                                                                 │
//! │       ├──► OfflineFrameRecord ──► frame outbox     (ALWAYS)            │
//! │       │                                                                 │
//! │       └──► decide_recording_path(config)                               │
//! │                 │                                                       │
//! │                 ├── offline flag set ──► RecordToOutbox                │
//! │                 │                         (transaction outbox)          │
//! │                 │                                                       │
//! │                 └── online ──────────► RecordImmediately               │
//! │                                           (direct remote write,         │
//! │                                            no local fallback)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The photographic product is never lost even when its financial record is:
//! a failed immediate write is logged and reconciled out of band.

use serde::{Deserialize, Serialize};

use crate::types::MachineConfiguration;

/// Where a completed sale is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPath {
    /// Synchronous remote write.
    RecordImmediately,
    /// Durable local queue, uploaded by a later sync pass.
    RecordToOutbox,
}

/// Chooses the recording path from the cached configuration.
///
/// Without a cached configuration the machine cannot know it is online, so
/// the sale is queued.
pub fn decide_recording_path(config: Option<&MachineConfiguration>) -> RecordingPath {
    match config {
        Some(config) if !config.offline => RecordingPath::RecordImmediately,
        _ => RecordingPath::RecordToOutbox,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_flag_queues() {
        let mut config = MachineConfiguration::new("M100", "S01");
        config.offline = true;
        assert_eq!(
            decide_recording_path(Some(&config)),
            RecordingPath::RecordToOutbox
        );
    }

    #[test]
    fn test_online_records_immediately() {
        let config = MachineConfiguration::new("M100", "S01");
        assert_eq!(
            decide_recording_path(Some(&config)),
            RecordingPath::RecordImmediately
        );
    }

    #[test]
    fn test_missing_config_queues() {
        assert_eq!(decide_recording_path(None), RecordingPath::RecordToOutbox);
    }
}
