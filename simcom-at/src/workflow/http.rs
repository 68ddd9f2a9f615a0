//! HTTP(S) client of the modem (`AT+HTTP*`).
//!
//! A request runs as: optional network attach, `HTTPINIT`, the `HTTPPARA`
//! parameters, the body upload for methods that carry one, and finally
//! `HTTPACTION`. The action's summary line `+HTTPACTION: <method>,<status>,<length>`
//! yields the [`HttpResponse`].

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use super::{run_steps, Step, NETWORK_ATTACH};
use crate::{
    helpers::drop_front, parse_action_result, render, Client, Error, Outcome, Tokens,
    WaitResult,
};

/// Largest body accepted by `AT+HTTPDATA`.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

const ACTION_TOKEN: &str = "+HTTPACTION:";
const READ_LEN_TOKEN: &str = "LEN,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HttpMethod {
    Get = 0,
    Post = 1,
    Head = 2,
    Delete = 3,
    Put = 4,
}

impl HttpMethod {
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub content_type: &'a str,
    pub accept: &'a str,
    pub method: HttpMethod,
    /// Seconds the modem waits for the body after the `DOWNLOAD` prompt
    pub upload_timeout_s: u16,
    /// How long to wait for the `+HTTPACTION` summary after the action was
    /// accepted
    pub action_timeout: Duration,
    /// Run [`NETWORK_ATTACH`] first
    pub attach_network: bool,
}

impl<'a> HttpRequest<'a> {
    pub fn post(url: &'a str) -> Self {
        Self {
            url,
            content_type: "text/plain",
            accept: "*/*",
            method: HttpMethod::Post,
            upload_timeout_s: 10,
            action_timeout: Duration::from_secs(30),
            attach_network: true,
        }
    }

    pub fn get(url: &'a str) -> Self {
        Self {
            method: HttpMethod::Get,
            ..Self::post(url)
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub fn accept(mut self, accept: &'a str) -> Self {
        self.accept = accept;
        self
    }

    #[must_use]
    pub fn attach_network(mut self, attach: bool) -> Self {
        self.attach_network = attach;
        self
    }
}

/// Status and body length reported by `+HTTPACTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HttpResponse {
    pub status: u32,
    pub length: u32,
}

/// Upload `payload` and perform the request.
///
/// The payload must be 1 byte to [`MAX_BODY_LEN`]; this is checked before
/// anything is sent. A response is accepted only with a 2xx status and a
/// body length of 1 byte to [`MAX_BODY_LEN`].
pub fn post<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    request: &HttpRequest<'_>,
    payload: &[u8],
) -> Result<HttpResponse, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    if payload.is_empty() || payload.len() > MAX_BODY_LEN {
        error!("HTTP body of {} bytes out of range", payload.len());
        return Err(Error::RangeViolation);
    }

    prepare(client, request)?;
    upload(client, request, payload)?;
    action(client, request)
}

/// Perform a request without a body.
pub fn get<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    request: &HttpRequest<'_>,
) -> Result<HttpResponse, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    if request.method.has_body() {
        error!("HTTP method {:?} needs a body", request.method);
        return Err(Error::RangeViolation);
    }

    prepare(client, request)?;
    action(client, request)
}

fn prepare<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    request: &HttpRequest<'_>,
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    if request.attach_network {
        run_steps(client, &NETWORK_ATTACH)?;
    }

    let url = render(format_args!("AT+HTTPPARA=\"URL\",\"{}\"", request.url))?;
    let content = render(format_args!(
        "AT+HTTPPARA=\"CONTENT\",\"{}\"",
        request.content_type
    ))?;
    let accept = render(format_args!("AT+HTTPPARA=\"ACCEPT\",\"{}\"", request.accept))?;

    run_steps(
        client,
        &[
            Step::required("AT+HTTPINIT", "Failed to start HTTP service"),
            Step::required(&url, "Failed to set URL"),
            Step::required(&content, "Failed to set content type"),
            Step::required(&accept, "Failed to set accept type"),
        ],
    )
}

fn upload<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    request: &HttpRequest<'_>,
    payload: &[u8],
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    client.send_data_fmt(format_args!(
        "AT+HTTPDATA={},{}",
        payload.len(),
        request.upload_timeout_s
    ))?;

    // `DOWNLOAD`, or an error if the modem refused the size.
    match client.read_reply()? {
        Some(prompt) if !prompt.contains("ERROR") => {}
        _ => {
            error!("Failed to set HTTP data");
            return Err(Error::MalformedReply);
        }
    }

    let outcome = client.execute_with(payload, &Tokens::DEFAULT)?;
    if let Some(e) = outcome.error() {
        error!("Failed to upload HTTP data");
        return Err(e);
    }
    client.cooldown();
    Ok(())
}

fn action<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    request: &HttpRequest<'_>,
) -> Result<HttpResponse, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let reply = match client.execute_fmt(format_args!("AT+HTTPACTION={}", request.method as u8))? {
        Outcome::Success(reply) => reply,
        outcome => {
            error!("Failed to send HTTP {:?} request", request.method);
            return Err(outcome.error().unwrap_or(Error::Timeout));
        }
    };

    // The summary usually trails the `OK` in a later chunk, but a slow poll
    // can see both at once.
    let summary: String<N> = match reply.find(ACTION_TOKEN) {
        Some(index) => {
            let mut summary = reply;
            drop_front(&mut summary, index + ACTION_TOKEN.len());
            summary
        }
        None => match client.wait_for_token(ACTION_TOKEN, request.action_timeout, false)? {
            WaitResult::Found(summary) => summary,
            WaitResult::NotFound => {
                error!("No HTTP action result within {} ms", request.action_timeout.as_millis());
                return Err(Error::MalformedReply);
            }
        },
    };

    let line = summary.lines().next().unwrap_or("");
    let result = parse_action_result(line);
    info!(
        "HTTP status {}, {} bytes",
        result.status_code, result.data_length
    );

    if !(200..300).contains(&result.status_code) {
        error!("HTTP request rejected with status {}", result.status_code);
        return Err(Error::RangeViolation);
    }
    let length = result.data_length as usize;
    if length == 0 || length > MAX_BODY_LEN {
        error!("HTTP response length {} out of range", result.data_length);
        return Err(Error::RangeViolation);
    }

    Ok(HttpResponse {
        status: result.status_code,
        length: result.data_length,
    })
}

/// Ask the modem how many response bytes are ready to be read.
pub fn read_body_length<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
) -> Result<u32, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let reply = client.execute("AT+HTTPREAD?")?.into_result().map_err(|e| {
        error!("Failed to query HTTP body length");
        e
    })?;

    let Some(index) = reply.find(READ_LEN_TOKEN) else {
        error!("HTTP body length missing from reply");
        return Err(Error::MalformedReply);
    };
    let tail = &reply[index + READ_LEN_TOKEN.len()..];
    let length = parse_action_result(tail.lines().next().unwrap_or("")).data_length;

    if length == 0 || length as usize > MAX_BODY_LEN {
        error!("HTTP body length {} out of range", length);
        return Err(Error::RangeViolation);
    }
    Ok(length)
}

/// Read `length` bytes of the response body.
///
/// The body is returned as the modem framed it, inside the reply chunk that
/// carried the `OK`, truncated to the client's reply capacity.
pub fn read_body<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    length: u32,
) -> Result<String<N>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    if length == 0 || length as usize > MAX_BODY_LEN {
        return Err(Error::RangeViolation);
    }

    client
        .execute_fmt(format_args!("AT+HTTPREAD={}", length))?
        .into_result()
        .map_err(|e| {
            error!("Failed to read HTTP body");
            e
        })
}

/// Stop the HTTP service.
pub fn terminate<RW, D, const N: usize>(client: &mut Client<RW, D, N>) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    match client.execute("AT+HTTPTERM")? {
        Outcome::Success(_) => Ok(()),
        outcome => {
            warn!("Failed to stop HTTP service");
            Err(outcome.error().unwrap_or(Error::Timeout))
        }
    }
}
