//! UDP datagrams over the modem's TCP/IP stack (`AT+NETOPEN`, `AT+CIP*`).

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use super::{run_steps, Step};
use crate::{digit_runs, render, Client, Error, Tokens, WaitResult};

/// Largest payload sent in one datagram.
pub const MAX_DATAGRAM_LEN: usize = 1500;

const RECEIVE_TOKEN: &str = "+IPD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UdpSession {
    /// Link number, 0-9
    pub link: u8,
    pub local_port: u16,
}

/// A received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram<const N: usize> {
    /// Length announced by the `+IPD` header
    pub length: u32,
    /// Payload, cut to `length` bytes or to what arrived in the same chunk
    pub data: String<N>,
}

/// Open the network and a UDP socket bound to `session.local_port`.
///
/// An already opened network is not an error.
pub fn open<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    session: &UdpSession,
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let socket = render(format_args!(
        "AT+CIPOPEN={},\"UDP\",,,{}",
        session.link, session.local_port
    ))?;

    run_steps(
        client,
        &[
            Step::optional("AT+NETOPEN", "Failed to open network"),
            Step::required(&socket, "Failed to open UDP socket"),
        ],
    )
}

/// Send `payload` to `host:port`.
pub fn send<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    session: &UdpSession,
    host: &str,
    port: u16,
    payload: &[u8],
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    if payload.is_empty() || payload.len() > MAX_DATAGRAM_LEN {
        error!("Datagram of {} bytes out of range", payload.len());
        return Err(Error::RangeViolation);
    }

    client.send_data_fmt(format_args!(
        "AT+CIPSEND={},{},\"{}\",{}",
        session.link,
        payload.len(),
        host,
        port
    ))?;

    match client.read_reply()? {
        Some(prompt) if prompt.contains('>') => {}
        _ => {
            error!("No send prompt from modem");
            return Err(Error::MalformedReply);
        }
    }

    let outcome = client.execute_with(payload, &Tokens::DEFAULT)?;
    if let Some(e) = outcome.error() {
        error!("Failed to send datagram");
        return Err(e);
    }
    Ok(())
}

/// Wait up to `max_wait` for an incoming datagram.
pub fn receive<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    max_wait: Duration,
) -> Result<Option<Datagram<N>>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let trailing = match client.wait_for_token(RECEIVE_TOKEN, max_wait, false)? {
        WaitResult::Found(trailing) => trailing,
        WaitResult::NotFound => return Ok(None),
    };

    let (header, body) = trailing
        .split_once("\r\n")
        .unwrap_or((trailing.as_str(), ""));

    let Some(length) = digit_runs(header).next() else {
        error!("Datagram header without length");
        return Err(Error::MalformedReply);
    };

    let mut end = body.len().min(length as usize);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    if end < length as usize {
        warn!("Datagram truncated to {} of {} bytes", end, length);
    }

    let mut data = String::new();
    // `body` is part of an `N`-capacity reply.
    let _ = data.push_str(&body[..end]);

    debug!("Received datagram of {} bytes", length);
    Ok(Some(Datagram { length, data }))
}

/// Close the socket and the network. Failures are only logged.
pub fn close<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    session: &UdpSession,
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let socket = render(format_args!("AT+CIPCLOSE={}", session.link))?;

    run_steps(
        client,
        &[
            Step::optional(&socket, "Failed to close UDP socket"),
            Step::optional("AT+NETCLOSE", "Failed to close network"),
        ],
    )
}
