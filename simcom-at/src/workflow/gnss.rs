//! GNSS receiver: power control and position fix acquisition.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::{run_steps, Step};
use crate::{parse_numeric_series, Client, Error, NumericSeries, WaitResult};

/// Command family of the receiver.
///
/// A7670 firmware with the GNSS engine uses `AT+CGNSS*`; older firmware only
/// knows the `AT+CGPS*` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GnssCommands {
    Gnss,
    Gps,
}

impl GnssCommands {
    pub const fn power_on(self) -> &'static str {
        match self {
            Self::Gnss => "AT+CGNSSPWR=1",
            Self::Gps => "AT+CGPS=1",
        }
    }

    pub const fn power_off(self) -> &'static str {
        match self {
            Self::Gnss => "AT+CGNSSPWR=0",
            Self::Gps => "AT+CGPS=0",
        }
    }

    pub const fn query(self) -> &'static str {
        match self {
            Self::Gnss => "AT+CGNSSINFO",
            Self::Gps => "AT+CGPSINFO",
        }
    }

    /// Unsolicited notice sent once the receiver is up, if any.
    pub const fn ready_notice(self) -> Option<&'static str> {
        match self {
            Self::Gnss => Some("+CGNSSPWR: READY!"),
            Self::Gps => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GnssConfig {
    pub commands: GnssCommands,
    pub ready_timeout: Duration,
    /// Minimum number of numeric fields for a reply to count as a fix
    pub min_fields: usize,
    pub query_attempts: u8,
    pub retry_delay: Duration,
}

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            commands: GnssCommands::Gnss,
            ready_timeout: Duration::from_secs(10),
            min_fields: 8,
            query_attempts: 10,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// The trailing numeric fields of a position report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnssFix<const CAP: usize> {
    pub fields: NumericSeries<CAP>,
}

/// Power the receiver up and wait for its ready notice.
///
/// A missing notice is logged but not an error; the first queries will simply
/// report no fix until the receiver is up.
pub fn power_on<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    config: &GnssConfig,
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    run_steps(
        client,
        &[Step::required(
            config.commands.power_on(),
            "Failed to power on GNSS",
        )],
    )?;

    if let Some(notice) = config.commands.ready_notice() {
        if let WaitResult::NotFound = client.wait_for_token(notice, config.ready_timeout, true)? {
            warn!("GNSS ready notice not seen");
        }
    }
    Ok(())
}

/// Query the receiver once. `None` means no fix yet.
///
/// A rejected or unanswered query is an error, not a missing fix.
pub fn query<RW, D, const N: usize, const CAP: usize>(
    client: &mut Client<RW, D, N>,
    config: &GnssConfig,
) -> Result<Option<GnssFix<CAP>>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let reply = client
        .execute(config.commands.query())?
        .into_result()
        .map_err(|e| {
            error!("Failed to query GNSS information");
            e
        })?;

    let fields = parse_numeric_series::<CAP>(&reply);
    // A fix can never hold more fields than the series keeps.
    if fields.len() < config.min_fields.min(CAP) || fields.is_empty() {
        debug!("No GNSS fix yet ({} fields)", fields.len());
        return Ok(None);
    }

    info!("GNSS fix: {:?}", fields.last());
    Ok(Some(GnssFix { fields }))
}

/// Query up to `query_attempts` times, `retry_delay` apart, until a fix is
/// reported. Stops at the first failed query.
pub fn acquire<RW, D, const N: usize, const CAP: usize>(
    client: &mut Client<RW, D, N>,
    config: &GnssConfig,
) -> Result<Option<GnssFix<CAP>>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    for attempt in 1..=config.query_attempts {
        if let Some(fix) = query::<RW, D, N, CAP>(client, config)? {
            return Ok(Some(fix));
        }
        if attempt < config.query_attempts {
            client.pause(config.retry_delay);
        }
    }

    warn!("No GNSS fix after {} queries", config.query_attempts);
    Ok(None)
}

/// Power the receiver down. Failures are only logged.
pub fn power_off<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
    config: &GnssConfig,
) -> Result<(), Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    run_steps(
        client,
        &[Step::optional(
            config.commands.power_off(),
            "Failed to power off GNSS",
        )],
    )
}
