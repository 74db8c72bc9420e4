//! Engine-wide properties checked after every simulated event.
//!
//! A [`SystemSnapshot`] captures what a UI could observe of each engine
//! (message list, channels, typing set). Each [`Invariant`] inspects the
//! snapshot and reports the first [`Violation`] it finds.
//!
//! ```ignore
//! let snapshot = SystemSnapshot::single(ClientSnapshot::from_engine(&engine));
//! InvariantRegistry::standard().check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    ExclusiveTimers, NoDuplicateMessages, SingleOptimisticPerRef, SingleRoomChannel,
    TypingExcludesSelf,
};
pub use snapshot::{ChannelSnapshot, ClientSnapshot, MessageSnapshot, SystemSnapshot};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken property, named after the check that found it.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Check name
    pub invariant: &'static str,
    /// Which client and which entry
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of engine state that no event sequence may break.
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Inspect `state`.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// The set of checks a driver runs after each event.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Message list, channel and typing checks:
    ///
    /// - [`NoDuplicateMessages`]
    /// - [`SingleOptimisticPerRef`]
    /// - [`ExclusiveTimers`]
    /// - [`SingleRoomChannel`]
    /// - [`TypingExcludesSelf`]
    pub fn standard() -> Self {
        Self {
            invariants: vec![
                Box::new(NoDuplicateMessages),
                Box::new(SingleOptimisticPerRef),
                Box::new(ExclusiveTimers),
                Box::new(SingleRoomChannel),
                Box::new(TypingExcludesSelf),
            ],
        }
    }

    /// Every violation in `state`.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> = self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Panic listing every violation, tagged with `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violated {context}:\n  {}", lines.join("\n  "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_engine_state_passes() {
        assert!(InvariantRegistry::standard().check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn violations_name_their_check() {
        let violation = Violation { invariant: "no_duplicate_messages", message: "message 4 listed twice".into() };
        assert_eq!(violation.to_string(), "no_duplicate_messages: message 4 listed twice");
    }
}
