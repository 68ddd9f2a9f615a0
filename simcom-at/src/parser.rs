//! Digit-run extraction from free-form modem replies.
//!
//! Replies like `+HTTPACTION: 1,200,68` or `+CGNSSINFO: 2,09,05,...` arrive
//! with unpredictable leading noise (echoed commands, line feeds, labels). The
//! parsers here never look at field positions or delimiters; they only care
//! about maximal runs of ASCII digits.

use heapless::{HistoryBuffer, Vec};
use nom::{bytes::complete::take_till, character::complete::digit1, IResult};

/// Everything up to the next ASCII digit.
fn noise(i: &str) -> IResult<&str, &str> {
    take_till(|c: char| c.is_ascii_digit())(i)
}

/// A single digit-run. Fails on empty input.
fn run(i: &str) -> IResult<&str, u32> {
    let (i, digits) = digit1(i)?;
    // Values above `u32::MAX` saturate.
    let value = digits.bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
    });
    Ok((i, value))
}

/// Iterator over the digit-runs of a string, left to right.
#[derive(Debug, Clone)]
pub struct DigitRuns<'a> {
    rest: &'a str,
}

impl Iterator for DigitRuns<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let (i, _) = noise(self.rest).ok()?;
        match run(i) {
            Ok((rest, value)) => {
                self.rest = rest;
                Some(value)
            }
            Err(_) => {
                self.rest = "";
                None
            }
        }
    }
}

/// Tokenize `text` into its digit-runs.
pub fn digit_runs(text: &str) -> DigitRuns<'_> {
    DigitRuns { rest: text }
}

/// Status code and data length of an action summary such as
/// `+HTTPACTION: <method>,<status>,<length>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActionResult {
    pub status_code: u32,
    pub data_length: u32,
}

/// Take the last two digit-runs of `text` as `(status_code, data_length)`.
///
/// Leading runs (command echo indices, method codes) are discarded. Missing
/// values default to 0, so a single run `n` gives `(0, n)`.
pub fn parse_action_result(text: &str) -> ActionResult {
    let result = digit_runs(text).fold(ActionResult::default(), |prev, value| ActionResult {
        status_code: prev.data_length,
        data_length: value,
    });
    trace!(
        "Parsed action result: status {}, length {}",
        result.status_code,
        result.data_length
    );
    result
}

/// The most recent `CAP` digit-runs of a reply, in their original order.
///
/// Backed by a ring buffer, so each run is inserted in constant time and the
/// oldest run is evicted once the series is full.
#[derive(Clone)]
pub struct NumericSeries<const CAP: usize> {
    buf: HistoryBuffer<u32, CAP>,
}

impl<const CAP: usize> NumericSeries<CAP> {
    pub fn new() -> Self {
        Self {
            buf: HistoryBuffer::new(),
        }
    }

    pub fn push(&mut self, value: u32) {
        self.buf.write(value);
    }

    /// Number of runs kept. `0` means the reply held no digits at all.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Runs from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.buf.oldest_ordered().copied()
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.iter().nth(index)
    }

    /// Most recently parsed run.
    pub fn last(&self) -> Option<u32> {
        self.buf.recent().copied()
    }

    pub fn to_vec(&self) -> Vec<u32, CAP> {
        self.iter().collect()
    }
}

impl<const CAP: usize> Default for NumericSeries<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> core::fmt::Debug for NumericSeries<CAP> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<const CAP: usize> PartialEq for NumericSeries<CAP> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<const CAP: usize> Eq for NumericSeries<CAP> {}

impl<const CAP: usize> PartialEq<[u32]> for NumericSeries<CAP> {
    fn eq(&self, other: &[u32]) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == *b)
    }
}

impl<const CAP: usize, const M: usize> PartialEq<[u32; M]> for NumericSeries<CAP> {
    fn eq(&self, other: &[u32; M]) -> bool {
        *self == other[..]
    }
}

/// Collect the digit-runs of `text`, keeping only the last `CAP`.
pub fn parse_numeric_series<const CAP: usize>(text: &str) -> NumericSeries<CAP> {
    let mut series = NumericSeries::new();
    for value in digit_runs(text) {
        series.push(value);
    }
    trace!("Parsed {} numeric fields (capacity {})", series.len(), CAP);
    series
}
