/*!
 * Batch lifecycle status and its validated transitions.
 */

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix used to persist statuses outside the known lifecycle
const UNKNOWN_PREFIX: &str = "unknown_";

/// Lifecycle status of one submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    Submitted,
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    /// The job completed but its output could not be fetched
    DownloadFailed,
    /// Any service status outside the lifecycle, kept verbatim
    Unknown(String),
}

/// A transition that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied { from: BatchStatus, to: BatchStatus },
    /// The requested status equals the current one
    Unchanged,
}

/// A transition that violates the lifecycle order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub from: BatchStatus,
    pub to: BatchStatus,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} is not allowed", self.from, self.to)
    }
}

impl BatchStatus {
    /// Interpret a raw service or ledger status string
    pub fn parse_raw(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        match raw.as_str() {
            "submitted" => Self::Submitted,
            "validating" => Self::Validating,
            "in_progress" => Self::InProgress,
            "finalizing" => Self::Finalizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "download_failed" => Self::DownloadFailed,
            other => Self::Unknown(other.strip_prefix(UNKNOWN_PREFIX).unwrap_or(other).to_string()),
        }
    }

    /// Position in the lifecycle; `None` for unknown statuses
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Submitted => Some(0),
            Self::Validating => Some(1),
            Self::InProgress => Some(2),
            Self::Finalizing => Some(3),
            Self::Completed | Self::Failed => Some(4),
            Self::DownloadFailed => Some(5),
            Self::Unknown(_) => None,
        }
    }

    /// No further service updates are expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DownloadFailed)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Validate moving from `self` to `next`
    pub fn transition(&self, next: &BatchStatus) -> Result<Transition, Rejection> {
        if self == next {
            return Ok(Transition::Unchanged);
        }

        let allowed = match (self, next) {
            (Self::Completed, Self::DownloadFailed) => true,
            (current, _) if current.is_terminal() => false,
            (_, Self::DownloadFailed) => false,
            (_, Self::Unknown(_)) => true,
            // The lifecycle position is lost, so only a final status may follow
            (Self::Unknown(_), next) => matches!(next, Self::Completed | Self::Failed),
            (current, next) => next.rank() > current.rank(),
        };

        if allowed {
            Ok(Transition::Applied {
                from: self.clone(),
                to: next.clone(),
            })
        } else {
            Err(Rejection {
                from: self.clone(),
                to: next.clone(),
            })
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("submitted"),
            Self::Validating => f.write_str("validating"),
            Self::InProgress => f.write_str("in_progress"),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::DownloadFailed => f.write_str("download_failed"),
            Self::Unknown(raw) => write!(f, "{}{}", UNKNOWN_PREFIX, raw),
        }
    }
}

impl FromStr for BatchStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_raw(s))
    }
}

impl Serialize for BatchStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BatchStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_raw(&raw))
    }
}
