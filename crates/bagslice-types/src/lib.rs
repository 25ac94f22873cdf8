//! Shared types for bagslice
//!
//! This crate contains data structures used across multiple bagslice crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Serialization tag used when a channel declaration does not carry one
pub const DEFAULT_SERIALIZATION_FORMAT: &str = "cdr";

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

// ============================================================================
// Log Metadata Types
// ============================================================================

/// A named, typed stream of records within a log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub message_count: u64,
    #[serde(default = "default_serialization_format")]
    pub serialization_format: String,
}

fn default_serialization_format() -> String {
    DEFAULT_SERIALIZATION_FORMAT.to_string()
}

impl Channel {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            message_count,
            serialization_format: default_serialization_format(),
        }
    }

    /// Listing label: "name (type) [N messages]"
    pub fn label(&self) -> String {
        format!(
            "{} ({}) [{} messages]",
            self.name, self.type_name, self.message_count
        )
    }
}

/// Minimum and maximum record timestamps of a log, in nanoseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeBounds {
    pub start_ns: i64,
    pub end_ns: i64,
}

impl TimeBounds {
    pub fn new(start_ns: i64, end_ns: i64) -> Self {
        Self { start_ns, end_ns }
    }

    /// Span between the first and last record
    pub fn duration_ns(&self) -> i64 {
        self.end_ns.saturating_sub(self.start_ns).max(0)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ns() as f64 / NANOS_PER_SEC
    }

    /// Widen the bounds to include `timestamp_ns`
    pub fn extend(&mut self, timestamp_ns: i64) {
        self.start_ns = self.start_ns.min(timestamp_ns);
        self.end_ns = self.end_ns.max(timestamp_ns);
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.start_ns)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.end_ns)
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// One timestamped unit of data on a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub channel: String,
    pub payload: Vec<u8>,
    pub timestamp_ns: i64,
}

impl Record {
    pub fn new(channel: impl Into<String>, payload: Vec<u8>, timestamp_ns: i64) -> Self {
        Self {
            channel: channel.into(),
            payload,
            timestamp_ns,
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Reasons a selection is refused before any I/O takes place
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no channels selected")]
    NoChannels,

    #[error("{field} time must not be negative (got {value})")]
    NegativeTime { field: &'static str, value: String },

    #[error("end time {end_ns} is before start time {start_ns}")]
    EndBeforeStart { start_ns: i64, end_ns: i64 },

    #[error("end time {end_ns} is beyond the end of the log ({max_ns})")]
    EndBeyondBound { end_ns: i64, max_ns: i64 },

    #[error("{field} time is not a finite number")]
    NotFinite { field: &'static str },
}

/// The channels and time window chosen for one filtering run
///
/// A selection can only be built through the validating constructors, so
/// every value of this type satisfies `0 <= start_ns <= end_ns` with at
/// least one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    channels: BTreeSet<String>,
    start_ns: i64,
    end_ns: i64,
}

impl Selection {
    /// Build a selection from absolute timestamps
    pub fn new<I, S>(channels: I, start_ns: i64, end_ns: i64) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: BTreeSet<String> = channels.into_iter().map(Into::into).collect();
        if channels.is_empty() {
            return Err(ValidationError::NoChannels);
        }
        if start_ns < 0 {
            return Err(ValidationError::NegativeTime {
                field: "start",
                value: start_ns.to_string(),
            });
        }
        if end_ns < 0 {
            return Err(ValidationError::NegativeTime {
                field: "end",
                value: end_ns.to_string(),
            });
        }
        if end_ns < start_ns {
            return Err(ValidationError::EndBeforeStart { start_ns, end_ns });
        }

        Ok(Self {
            channels,
            start_ns,
            end_ns,
        })
    }

    /// Build a selection from offsets in seconds relative to the start of the log
    ///
    /// A missing end offset means "until the last record".
    pub fn from_offsets<I, S>(
        channels: I,
        bounds: TimeBounds,
        start_secs: f64,
        end_secs: Option<f64>,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start_offset = offset_to_ns("start", start_secs)?;
        let start_ns = bounds.start_ns.saturating_add(start_offset);
        let end_ns = match end_secs {
            Some(secs) => bounds.start_ns.saturating_add(offset_to_ns("end", secs)?),
            None => bounds.end_ns,
        };

        let selection = Self::new(channels, start_ns, end_ns)?;
        selection.check_bounds(bounds)?;
        Ok(selection)
    }

    /// Reject windows that end after the log's last record
    pub fn check_bounds(&self, bounds: TimeBounds) -> Result<(), ValidationError> {
        if self.end_ns > bounds.end_ns {
            return Err(ValidationError::EndBeyondBound {
                end_ns: self.end_ns,
                max_ns: bounds.end_ns,
            });
        }
        Ok(())
    }

    pub fn channels(&self) -> &BTreeSet<String> {
        &self.channels
    }

    pub fn start_ns(&self) -> i64 {
        self.start_ns
    }

    pub fn end_ns(&self) -> i64 {
        self.end_ns
    }

    /// Width of the requested window
    pub fn span_ns(&self) -> i64 {
        self.end_ns - self.start_ns
    }

    pub fn includes_channel(&self, name: &str) -> bool {
        self.channels.contains(name)
    }

    /// Whether `timestamp_ns` lies in the closed window `[start_ns, end_ns]`
    pub fn contains_time(&self, timestamp_ns: i64) -> bool {
        self.start_ns <= timestamp_ns && timestamp_ns <= self.end_ns
    }
}

fn offset_to_ns(field: &'static str, secs: f64) -> Result<i64, ValidationError> {
    if !secs.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if secs < 0.0 {
        return Err(ValidationError::NegativeTime {
            field,
            value: secs.to_string(),
        });
    }
    Ok((secs * NANOS_PER_SEC).round() as i64)
}

// ============================================================================
// Progress Types
// ============================================================================

/// Events emitted by a filtering run, in order
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Position of the scan cursor within the requested window, 0..=100
    Progress(f64),
    Success,
    Failure(String),
}

impl ProgressEvent {
    /// Success and Failure end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure(_))
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(fraction) => write!(f, "{:.1}%", fraction),
            Self::Success => write!(f, "success"),
            Self::Failure(message) => write!(f, "failure: {}", message),
        }
    }
}
