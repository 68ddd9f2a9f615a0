use core::fmt::Write as _;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use crate::{
    config::WaitWindow,
    helpers::{drop_front, push_lossy, LossyStr},
    Config, Error,
};

/// Command line termination character S3
pub const LINE_TERM_CHAR: u8 = b'\r';

/// Upper bound for a rendered command line, excluding the terminator.
pub const MAX_COMMAND_LEN: usize = 256;

const READ_CHUNK_LEN: usize = 64;

/// Substrings deciding the outcome of a command transaction.
///
/// Failure tokens are checked before success tokens, so a reply containing
/// both is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokens<'a> {
    pub success: &'a [&'a str],
    pub failure: &'a [&'a str],
}

impl Tokens<'static> {
    pub const DEFAULT: Self = Self {
        success: &["OK"],
        failure: &["ERROR"],
    };
}

impl Default for Tokens<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of a command transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome<const N: usize> {
    /// A reply chunk containing a success token
    Success(String<N>),
    /// A reply chunk containing a failure token
    ExplicitFailure(String<N>),
    /// Every attempt ran out of polls without a decisive reply
    Timeout,
}

impl<const N: usize> Outcome<N> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The reply text, if any reply was decisive.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Success(r) | Self::ExplicitFailure(r) => Some(r.as_str()),
            Self::Timeout => None,
        }
    }

    pub fn into_result(self) -> Result<String<N>, Error> {
        match self {
            Self::Success(r) => Ok(r),
            Self::ExplicitFailure(_) => Err(Error::ExplicitFailure),
            Self::Timeout => Err(Error::Timeout),
        }
    }

    /// The error a non-successful outcome maps to.
    pub fn error(&self) -> Option<Error> {
        match self {
            Self::Success(_) => None,
            Self::ExplicitFailure(_) => Some(Error::ExplicitFailure),
            Self::Timeout => Some(Error::Timeout),
        }
    }
}

/// Result of waiting for an unsolicited message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitResult<const N: usize> {
    /// Text following the token, from the text window it was found in
    Found(String<N>),
    NotFound,
}

impl<const N: usize> WaitResult<N> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Blocking AT client.
///
/// Owns the serial channel for its whole lifetime, so only one transaction is
/// ever in flight. Replies are collected into `heapless` strings of capacity
/// `N`; longer chunks are truncated.
pub struct Client<RW, D, const N: usize> {
    rw: RW,
    delay: D,
    config: Config,
}

impl<RW, D, const N: usize> Client<RW, D, N>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    pub fn new(rw: RW, delay: D, config: Config) -> Self {
        Self { rw, delay, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give back the channel and delay, e.g. before entering deep sleep.
    pub fn release(self) -> (RW, D) {
        (self.rw, self.delay)
    }

    /// Send `cmd` and wait for `OK` or `ERROR`, re-sending on timeout.
    pub fn execute(&mut self, cmd: &str) -> Result<Outcome<N>, Error> {
        self.execute_with(cmd.as_bytes(), &Tokens::DEFAULT)
    }

    /// Render a command from format arguments and execute it.
    pub fn execute_fmt(&mut self, args: core::fmt::Arguments<'_>) -> Result<Outcome<N>, Error> {
        let cmd = render(args)?;
        self.execute(&cmd)
    }

    /// Send `cmd` and classify replies against `tokens`.
    ///
    /// Up to `max_attempts` transmissions are made. After each one, up to
    /// `polls_per_attempt` polls spaced by `poll_interval` look for a reply
    /// chunk; the first transmission additionally waits
    /// `first_attempt_settle`. A decisive chunk ends the transaction at once.
    pub fn execute_with(&mut self, cmd: &[u8], tokens: &Tokens<'_>) -> Result<Outcome<N>, Error> {
        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                debug!("Attempt {}:", attempt);
            }

            self.send_inner(cmd)?;

            if attempt == 1 {
                self.sleep(self.config.first_attempt_settle);
            }

            for _ in 0..self.config.polls_per_attempt {
                self.sleep(self.config.poll_interval);

                let Some(chunk) = self.poll_chunk(false)? else {
                    continue;
                };

                if tokens.failure.iter().any(|t| chunk.contains(t)) {
                    warn!("Received error response: {:?}", LossyStr(chunk.as_bytes()));
                    return Ok(Outcome::ExplicitFailure(chunk));
                }

                if tokens.success.iter().any(|t| chunk.contains(t)) {
                    debug!("Received OK");
                    return Ok(Outcome::Success(chunk));
                }

                trace!("Reply without status token, still polling");
            }
        }

        warn!(
            "No decisive reply to {:?} after {} attempts",
            LossyStr(cmd),
            self.config.max_attempts
        );
        Ok(Outcome::Timeout)
    }

    /// Write `data` followed by the line terminator without waiting for any
    /// reply, then observe the command cooldown.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.send_inner(data)?;
        self.cooldown();
        Ok(())
    }

    pub fn send_data_fmt(&mut self, args: core::fmt::Arguments<'_>) -> Result<(), Error> {
        let data = render(args)?;
        self.send_data(data.as_bytes())
    }

    /// Poll for a single reply chunk, without sending anything.
    ///
    /// Uses the same budget as one command attempt. Returns `None` if nothing
    /// arrived.
    pub fn read_reply(&mut self) -> Result<Option<String<N>>, Error> {
        for _ in 0..self.config.polls_per_attempt {
            self.sleep(self.config.poll_interval);
            if let Some(chunk) = self.poll_chunk(false)? {
                return Ok(Some(chunk));
            }
        }
        debug!("No reply within one attempt budget");
        Ok(None)
    }

    /// Wait up to `max_wait` for `token` to show up unsolicited.
    ///
    /// Nothing is sent. On a match the text after the token is returned; with
    /// [`WaitWindow::PerChunk`] that is limited to the chunk holding the
    /// match. `echo` promotes the received text to `info` level.
    pub fn wait_for_token(
        &mut self,
        token: &str,
        max_wait: Duration,
        echo: bool,
    ) -> Result<WaitResult<N>, Error> {
        let step = self.config.wait_poll_interval.max(Duration::from_ticks(1));
        let mut waited = Duration::from_ticks(0);
        let mut window: String<N> = String::new();

        debug!("Waiting up to {} ms for {:?}", max_wait.as_millis(), token);

        while waited < max_wait {
            if let Some(chunk) = self.poll_chunk(echo)? {
                let haystack = match self.config.wait_window {
                    WaitWindow::PerChunk => chunk,
                    WaitWindow::Rolling => {
                        let excess = (window.len() + chunk.len()).saturating_sub(N);
                        drop_front(&mut window, excess);
                        // `chunk` fits in what is left after dropping `excess`.
                        let _ = window.push_str(&chunk);
                        window.clone()
                    }
                };

                if let Some(index) = haystack.find(token) {
                    debug!("Found message {:?}", token);
                    let mut trailing = haystack;
                    drop_front(&mut trailing, index + token.len());
                    return Ok(WaitResult::Found(trailing));
                }
            }

            self.sleep(step);
            waited += step;
        }

        debug!("Did not see message {:?}", token);
        Ok(WaitResult::NotFound)
    }

    /// Pause between consecutive commands.
    pub fn cooldown(&mut self) {
        self.sleep(self.config.cmd_cooldown);
    }

    /// Block for `duration`.
    pub fn pause(&mut self, duration: Duration) {
        self.sleep(duration);
    }

    fn sleep(&mut self, duration: Duration) {
        let us = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(us);
    }

    fn send_inner(&mut self, cmd: &[u8]) -> Result<(), Error> {
        if cmd.len() < 50 {
            debug!("Sending command: {:?}", LossyStr(cmd));
        } else {
            debug!("Sending command with long payload ({} bytes)", cmd.len());
        }

        self.rw.write_all(cmd).map_err(|_| Error::Write)?;
        self.rw
            .write_all(&[LINE_TERM_CHAR])
            .map_err(|_| Error::Write)?;
        self.rw.flush().map_err(|_| Error::Write)?;
        Ok(())
    }

    /// Read everything currently buffered by the channel as one chunk.
    fn poll_chunk(&mut self, echo: bool) -> Result<Option<String<N>>, Error> {
        if !self.rw.read_ready().map_err(|_| Error::Read)? {
            return Ok(None);
        }

        let mut chunk = String::new();
        let mut truncated = false;
        let mut buf = [0u8; READ_CHUNK_LEN];
        loop {
            let n = self.rw.read(&mut buf).map_err(|_| Error::Read)?;
            if !truncated && !push_lossy(&mut chunk, &buf[..n]) {
                truncated = true;
            }
            if n < buf.len() || !self.rw.read_ready().map_err(|_| Error::Read)? {
                break;
            }
        }

        if truncated {
            warn!("Reply exceeded {} bytes, tail discarded", N);
        }

        if echo {
            info!("> {:?}", LossyStr(chunk.as_bytes()));
        } else {
            trace!("> {:?}", LossyStr(chunk.as_bytes()));
        }

        Ok(Some(chunk))
    }
}

/// Render a command line into a bounded buffer.
pub fn render(args: core::fmt::Arguments<'_>) -> Result<String<MAX_COMMAND_LEN>, Error> {
    let mut cmd = String::new();
    cmd.write_fmt(args).map_err(|_| Error::Overflow)?;
    Ok(cmd)
}
