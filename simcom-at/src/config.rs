use embassy_time::Duration;

/// How [`Client::wait_for_token`] searches for its token.
///
/// [`Client::wait_for_token`]: crate::Client::wait_for_token
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitWindow {
    /// Only the chunk read in a single poll is searched. A token split across
    /// two reads is never found.
    PerChunk,
    /// Chunks are accumulated in a bounded buffer, oldest text dropped first,
    /// and the whole buffer is searched on every poll.
    Rolling,
}

/// Configuration of the AT client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) max_attempts: u8,
    pub(crate) polls_per_attempt: u8,
    pub(crate) first_attempt_settle: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) wait_poll_interval: Duration,
    pub(crate) cmd_cooldown: Duration,
    pub(crate) wait_window: WaitWindow,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            polls_per_attempt: 5,
            first_attempt_settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            wait_poll_interval: Duration::from_millis(250),
            cmd_cooldown: Duration::from_millis(500),
            wait_window: WaitWindow::PerChunk,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a command is (re-)sent before giving up with
    /// `Outcome::Timeout`.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn polls_per_attempt(mut self, polls: u8) -> Self {
        self.polls_per_attempt = polls;
        self
    }

    /// Extra wait after the first transmission of a command only.
    #[must_use]
    pub const fn first_attempt_settle(mut self, duration: Duration) -> Self {
        self.first_attempt_settle = duration;
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, duration: Duration) -> Self {
        self.poll_interval = duration;
        self
    }

    #[must_use]
    pub const fn wait_poll_interval(mut self, duration: Duration) -> Self {
        self.wait_poll_interval = duration;
        self
    }

    /// Pause inserted between consecutive workflow steps and after raw data
    /// writes.
    #[must_use]
    pub const fn cmd_cooldown(mut self, duration: Duration) -> Self {
        self.cmd_cooldown = duration;
        self
    }

    #[must_use]
    pub const fn wait_window(mut self, window: WaitWindow) -> Self {
        self.wait_window = window;
        self
    }
}
