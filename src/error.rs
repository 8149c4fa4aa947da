//! Crate error type.
//!
//! Only configuration problems are meant to abort a caller. Everything that can
//! go wrong *inside* a run (out-of-range arms, exhausted budgets) is recorded as
//! a [`Violation`](crate::Violation) instead, and per-seed failures are
//! isolated by the orchestrator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// `means_post` does not have the same number of arms as `means_pre`.
    #[error("means_post has {post} arms but means_pre has {pre}")]
    ShapeMismatch { pre: usize, post: usize },

    /// A success probability was outside `[0, 1]` (or not finite).
    #[error("arm {index}: probability {value} is outside [0, 1]")]
    InvalidProbability { index: usize, value: f64 },

    /// An environment or policy was configured with zero arms.
    #[error("bandit needs at least one arm")]
    NoArms,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot summarize an empty trajectory")]
    EmptyTrajectory,

    /// One seed of a generation failed; the generation continues without it.
    #[error("run {run} failed: {reason}")]
    SeedFailed { run: usize, reason: String },

    #[error("trajectory sink I/O error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("trajectory encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("configuration parse error: {0}")]
    Config(#[source] serde_json::Error),
}

impl Error {
    /// True for the error class that should abort the enclosing process.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::InvalidProbability { .. }
                | Error::NoArms
                | Error::InvalidConfig(_)
                | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_class_is_distinguished() {
        assert!(Error::ShapeMismatch { pre: 3, post: 2 }.is_configuration());
        assert!(Error::InvalidConfig("k".into()).is_configuration());
        assert!(!Error::EmptyTrajectory.is_configuration());
        assert!(!Error::SeedFailed {
            run: 1,
            reason: "boom".into()
        }
        .is_configuration());
    }

    #[test]
    fn messages_name_the_offending_values() {
        let e = Error::InvalidProbability {
            index: 2,
            value: 1.5,
        };
        assert_eq!(e.to_string(), "arm 2: probability 1.5 is outside [0, 1]");
    }
}
