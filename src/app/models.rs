use serde::{Deserialize, Serialize};

/// One progress report from the cycle-runner worker to whatever is watching
/// (CLI today, an on-device UI tomorrow). Sent over a bounded channel with
/// `try_send`; the worker never blocks on a slow consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
    },
    Log {
        /// Wall-clock `HH:MM:SS`, presentation-ready.
        timestamp: String,
        message: String,
    },
    CycleStarted {
        cycle: u32,
        cycle_count: u32,
    },
    Progress {
        completed_users: u32,
        total_users: u32,
        total_likes: u32,
        current_cycle: u32,
        /// Users left before the next app restart; 0 when restarts are off.
        restart_countdown: u32,
    },
    Finished(RunSummary),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles_run: u32,
    pub completed_users: u32,
    /// `user count x cycle count`; what a fully successful run would score.
    pub expected_likes: u32,
    pub total_likes: u32,
    pub app_restarts: u32,
    pub cancelled: bool,
}
