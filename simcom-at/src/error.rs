use crate::lifecycle::LifecycleState;

/// Errors returned by the crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Serial read error
    Read,
    /// Serial write error
    Write,
    /// No decisive reply within the retry budget
    Timeout,
    /// The modem answered with a failure token
    ExplicitFailure,
    /// An expected reply (prompt, summary line, length) never showed up
    MalformedReply,
    /// A status code, length or payload size fell outside accepted bounds
    RangeViolation,
    /// A formatted command did not fit the command buffer
    Overflow,
    /// Driving a control line failed
    Pin,
    /// Lifecycle transition attempted from the wrong state
    InvalidState {
        expected: LifecycleState,
        found: LifecycleState,
    },
}
