//! Scripted collaborators shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, ErrorType as PinErrorType, OutputPin};
use embedded_io::ErrorType;

use crate::{Client, Config};

#[derive(Debug)]
pub struct IoError;

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Serial channel double.
///
/// Every complete line written (terminated by `\r`) is matched against the
/// front of the expected exchanges; on a match the exchange's chunks are
/// scheduled for delivery, one per poll. `None` entries are polls that see no
/// data. Unsolicited text can be scheduled up front with [`MockChannel::deliver`].
#[derive(Default)]
pub struct MockChannel {
    exchanges: VecDeque<(&'static str, Vec<Option<&'static str>>)>,
    deliveries: VecDeque<Option<&'static str>>,
    pending: VecDeque<u8>,
    line: Vec<u8>,
    pub written: Vec<u8>,
    pub lines: Vec<String>,
    /// Polls that found no buffered data and consulted the schedule.
    pub polls: usize,
    pub fail_writes: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &'static str, chunks: &[&'static str]) -> Self {
        self.exchanges
            .push_back((command, chunks.iter().copied().map(Some).collect()));
        self
    }

    pub fn respond_after(
        mut self,
        command: &'static str,
        chunks: &[Option<&'static str>],
    ) -> Self {
        self.exchanges.push_back((command, chunks.to_vec()));
        self
    }

    pub fn deliver(mut self, chunks: &[Option<&'static str>]) -> Self {
        self.deliveries.extend(chunks.iter().copied());
        self
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub fn exchanges_left(&self) -> usize {
        self.exchanges.len()
    }

    fn complete_line(&mut self) {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        if let Some((expected, _)) = self.exchanges.front() {
            if *expected == line {
                if let Some((_, chunks)) = self.exchanges.pop_front() {
                    self.deliveries.extend(chunks);
                }
            }
        }
        self.lines.push(line);
    }
}

impl ErrorType for MockChannel {
    type Error = IoError;
}

impl embedded_io::Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(IoError);
        }
        for &b in buf {
            self.written.push(b);
            if b == b'\r' {
                self.complete_line();
            } else {
                self.line.push(b);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::ReadReady for MockChannel {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        self.polls += 1;
        match self.deliveries.pop_front() {
            Some(Some(chunk)) => {
                self.pending.extend(chunk.bytes());
                Ok(!self.pending.is_empty())
            }
            _ => Ok(false),
        }
    }
}

impl embedded_io::Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.pending.len());
        for (slot, b) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

/// Delay double that only accumulates virtual time.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub elapsed_ns: u64,
}

impl MockDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

#[derive(Debug)]
pub struct PinFault;

impl embedded_hal::digital::Error for PinFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub type PinLog = Rc<RefCell<Vec<(&'static str, bool)>>>;

/// Output pin double recording every level change into a shared log.
pub struct MockPin {
    pub name: &'static str,
    pub log: PinLog,
    pub fail: bool,
}

impl MockPin {
    pub fn new(name: &'static str, log: &PinLog) -> Self {
        Self {
            name,
            log: log.clone(),
            fail: false,
        }
    }
}

impl PinErrorType for MockPin {
    type Error = PinFault;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(PinFault);
        }
        self.log.borrow_mut().push((self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(PinFault);
        }
        self.log.borrow_mut().push((self.name, true));
        Ok(())
    }
}

pub const TEST_REPLY_LEN: usize = 256;

/// Millisecond timings keep the virtual clock readable in assertions.
pub fn test_config() -> Config {
    use embassy_time::Duration;

    Config::new()
        .first_attempt_settle(Duration::from_millis(5))
        .poll_interval(Duration::from_millis(1))
        .wait_poll_interval(Duration::from_millis(1))
        .cmd_cooldown(Duration::from_millis(2))
}

pub fn client(channel: MockChannel) -> Client<MockChannel, MockDelay, TEST_REPLY_LEN> {
    Client::new(channel, MockDelay::default(), test_config())
}
