//! # simcom-at
//!
//! A blocking AT command client for SIMCom cellular modems (A7670 and
//! relatives), driven over any [`embedded_io`] serial channel.
//!
//! The crate is layered:
//!
//! - [`Client`] runs command transactions: it sends a command, polls for
//!   reply chunks and classifies them into an [`Outcome`], re-sending the
//!   command when nothing decisive arrives. It can also wait for unsolicited
//!   messages with [`Client::wait_for_token`].
//! - [`parser`] pulls numeric fields out of free-form replies by looking only
//!   at runs of ASCII digits.
//! - [`Modem`] owns a client together with the control lines, and drives the
//!   power-up sequence through its [`LifecycleState`]s.
//! - [`workflow`] holds the multi-step procedures: HTTP POST, GNSS fix
//!   acquisition, UDP datagrams and housekeeping queries.
//!
//! ```ignore
//! let client = Client::<_, _, 256>::new(serial, embassy_time::Delay, Config::new());
//! let mut modem = Modem::new(client, pins);
//! modem.start()?;
//!
//! let request = HttpRequest::post("http://example.com/ingest");
//! let response = workflow::http::post(modem.client()?, &request, b"hello")?;
//! ```
//!
//! ## Logging
//! Either `log` or `defmt` can be enabled as a feature, but not both.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod client;
mod config;
mod error;
mod helpers;
pub mod lifecycle;
pub mod parser;
pub mod workflow;

#[cfg(test)]
mod test_helpers;

pub use client::{
    render, Client, Outcome, Tokens, WaitResult, LINE_TERM_CHAR, MAX_COMMAND_LEN,
};
pub use config::{Config, WaitWindow};
pub use error::Error;
pub use lifecycle::{LifecycleState, Modem, ModemPins, NoPin, ProbeCommand};
pub use parser::{
    digit_runs, parse_action_result, parse_numeric_series, ActionResult, NumericSeries,
};
pub use workflow::http::HttpRequest;

pub use embassy_time::Duration;
