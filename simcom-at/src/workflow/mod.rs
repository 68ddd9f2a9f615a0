//! Multi-step procedures built on top of [`Client`].
//!
//! Each procedure is a sequence of [`Step`]s executed in order with a
//! cooldown between them. A failed step logs its message and, if marked
//! required, aborts the whole procedure.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use crate::{Client, Error, Outcome};

pub mod gnss;
pub mod http;
pub mod telemetry;
pub mod udp;

/// A single command of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<'a> {
    pub command: &'a str,
    /// Logged when the command does not succeed
    pub on_failure: &'static str,
    pub abort_on_failure: bool,
}

impl<'a> Step<'a> {
    /// A step whose failure aborts the procedure.
    pub const fn required(command: &'a str, on_failure: &'static str) -> Self {
        Self {
            command,
            on_failure,
            abort_on_failure: true,
        }
    }

    /// A step whose failure is only logged.
    pub const fn optional(command: &'a str, on_failure: &'static str) -> Self {
        Self {
            command,
            on_failure,
            abort_on_failure: false,
        }
    }
}

/// Packet domain attach, then activation of PDP context 1.
pub const NETWORK_ATTACH: [Step<'static>; 2] = [
    Step::required(
        "AT+CGATT?",
        "Failed to read packet domain attach or detach status",
    ),
    Step::required("AT+CGACT=1,1", "Failed to attach to PDP context"),
];

/// Execute one step. Returns the success reply, or `None` when an optional
/// step failed.
pub fn run_step<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    step: &Step<'_>,
) -> Result<Option<String<N>>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    match client.execute(step.command)? {
        Outcome::Success(reply) => Ok(Some(reply)),
        outcome => {
            error!("{}", step.on_failure);
            match outcome.error() {
                Some(e) if step.abort_on_failure => Err(e),
                _ => Ok(None),
            }
        }
    }
}

/// Execute `steps` in order, pausing for the command cooldown after each.
pub fn run_steps<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    steps: &[Step<'_>],
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    for step in steps {
        run_step(client, step)?;
        client.cooldown();
    }
    Ok(())
}
