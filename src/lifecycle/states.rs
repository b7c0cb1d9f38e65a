use serde::{Deserialize, Serialize};
use std::fmt;

/// Named handler stage an event or message handler subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Runs synchronously on the triggering thread before execution
    Prepare,
    /// Runs on a worker as a single unit of work
    Execute,
    /// Delivered through the affinity executor when execution failed
    Error,
    /// Delivered through the affinity executor when execution succeeded
    Success,
    /// Always delivered exactly once per trigger
    Complete,
    /// Message refresh run inline on the requesting thread
    SyncRefresh,
    /// Message refresh run on a worker, cancellable
    AsyncRefresh,
    /// Delivered once a message refresh has resolved
    DataRefreshed,
}

impl Phase {
    /// Phases an [`Event`](crate::lifecycle::Event) carries, in lifecycle order
    pub const EVENT_PHASES: [Phase; 5] = [
        Phase::Prepare,
        Phase::Execute,
        Phase::Error,
        Phase::Success,
        Phase::Complete,
    ];

    /// Phases a [`Message`](crate::messaging::Message) carries
    pub const MESSAGE_PHASES: [Phase; 3] =
        [Phase::SyncRefresh, Phase::AsyncRefresh, Phase::DataRefreshed];

    /// Check if handlers of this phase are delivered through the affinity executor
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            Self::Error | Self::Success | Self::Complete | Self::DataRefreshed
        )
    }

    pub fn is_event_phase(&self) -> bool {
        Self::EVENT_PHASES.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Execute => "execute",
            Self::Error => "error",
            Self::Success => "success",
            Self::Complete => "complete",
            Self::SyncRefresh => "sync_refresh",
            Self::AsyncRefresh => "async_refresh",
            Self::DataRefreshed => "data_refreshed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepare" => Ok(Self::Prepare),
            "execute" => Ok(Self::Execute),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            "complete" => Ok(Self::Complete),
            "sync_refresh" => Ok(Self::SyncRefresh),
            "async_refresh" => Ok(Self::AsyncRefresh),
            "data_refreshed" => Ok(Self::DataRefreshed),
            _ => Err(format!("Invalid phase: {s}")),
        }
    }
}

/// Lifecycle state of a single event instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Not triggered, or the previous trigger has fully completed
    #[default]
    Idle,
    /// Prepare handlers are running on the caller's thread
    Preparing,
    /// The execute unit is scheduled or running on a worker
    Executing,
    /// Success handlers are being delivered
    Succeeded,
    /// Error handlers are being delivered
    Failed,
    /// Complete handlers are being delivered
    Completed,
}

impl LifecyclePhase {
    /// Check if a trigger is in flight (anything but idle)
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Check if this phase delivers callbacks through the affinity executor
    pub fn is_delivering(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Completed)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Preparing => write!(f, "preparing"),
            Self::Executing => write!(f, "executing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Refresh state of a single message instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    #[default]
    Idle,
    /// Sync and/or async refresh handlers are running
    Refreshing,
    /// DataRefreshed handlers are being delivered
    Delivering,
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Refreshing => write!(f, "refreshing"),
            Self::Delivering => write!(f, "delivering"),
        }
    }
}
