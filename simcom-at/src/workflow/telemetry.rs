//! Housekeeping queries: module temperature, supply voltage, clock and
//! operator names.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use super::{run_step, Step};
use crate::{digit_runs, Client, Error};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub cpu_temperature_c: Option<i32>,
    pub supply_millivolts: Option<u32>,
}

/// Read temperature and supply voltage. Each reading is `None` if its
/// command failed or the reply held no value.
pub fn read_telemetry<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
) -> Result<Telemetry, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let cpu_temperature_c = run_step(
        client,
        &Step::optional("AT+CPMUTEMP", "Failed to read SIMCOM CPU temperature"),
    )?
    .and_then(|reply| temperature(&reply));
    client.cooldown();

    let supply_millivolts = run_step(
        client,
        &Step::optional("AT+CBC", "Failed to read supply voltage"),
    )?
    .and_then(|reply| millivolts(&reply));

    let telemetry = Telemetry {
        cpu_temperature_c,
        supply_millivolts,
    };
    info!("Telemetry: {:?}", telemetry);
    Ok(telemetry)
}

/// `+CPMUTEMP: -5` to -5.
fn temperature(reply: &str) -> Option<i32> {
    let index = reply.find("+CPMUTEMP:")?;
    let line = reply[index + "+CPMUTEMP:".len()..].lines().next()?.trim_start();
    let (negative, digits) = match line.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let value = i32::try_from(digit_runs(digits).next()?).ok()?;
    Some(if negative { -value } else { value })
}

/// `+CBC: 4.123V` to 4123.
fn millivolts(reply: &str) -> Option<u32> {
    let index = reply.find("+CBC:")?;
    let line = reply[index..].lines().next()?;
    let (volts, fraction) = line.split_once('.').unwrap_or((line, ""));
    let volts = digit_runs(volts).last()?;

    // Scale the fraction to three digits, whatever precision the firmware
    // reports.
    let mut digits = fraction.bytes().take_while(u8::is_ascii_digit);
    let mut millis = 0;
    for _ in 0..3 {
        millis = millis * 10 + digits.next().map_or(0, |b| u32::from(b - b'0'));
    }

    Some(volts.saturating_mul(1000).saturating_add(millis))
}

/// Real time clock of the modem, as the raw `+CCLK` reply.
pub fn query_clock<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
) -> Result<String<N>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    client.execute("AT+CCLK?")?.into_result().map_err(|e| {
        error!("Failed to read the real time clock");
        e
    })
}

/// Operator names known to the modem, as the raw `+COPN` reply.
///
/// The list is long; with a small reply capacity only its head is kept.
pub fn query_operator_names<RW, D, const N: usize>(
    client: &mut Client<RW, D, N>,
) -> Result<String<N>, Error>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    client.execute("AT+COPN")?.into_result().map_err(|e| {
        error!("Failed to read operator names");
        e
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::{client, MockChannel};

    #[test]
    fn temperature_and_supply() {
        let mut client = client(
            MockChannel::new()
                .respond("AT+CPMUTEMP", &["\r\n+CPMUTEMP: 32\r\n\r\nOK\r\n"])
                .respond("AT+CBC", &["\r\n+CBC: 4.123V\r\n\r\nOK\r\n"]),
        );

        assert_eq!(
            read_telemetry(&mut client).unwrap(),
            Telemetry {
                cpu_temperature_c: Some(32),
                supply_millivolts: Some(4123),
            }
        );
    }

    #[test]
    fn failed_reading_is_none() {
        let mut client = client(
            MockChannel::new()
                .respond("AT+CPMUTEMP", &["\r\nERROR\r\n"])
                .respond("AT+CBC", &["\r\n+CBC: 3.8V\r\n\r\nOK\r\n"]),
        );

        assert_eq!(
            read_telemetry(&mut client).unwrap(),
            Telemetry {
                cpu_temperature_c: None,
                supply_millivolts: Some(3800),
            }
        );
    }

    #[test]
    fn below_zero_temperature() {
        let mut client = client(
            MockChannel::new()
                .respond("AT+CPMUTEMP", &["\r\n+CPMUTEMP: -5\r\n\r\nOK\r\n"])
                .respond("AT+CBC", &["\r\nERROR\r\n"]),
        );

        assert_eq!(
            read_telemetry(&mut client).unwrap(),
            Telemetry {
                cpu_temperature_c: Some(-5),
                supply_millivolts: None,
            }
        );
    }

    #[test]
    fn temperature_parsing() {
        assert_eq!(temperature("+CPMUTEMP: 32"), Some(32));
        assert_eq!(temperature("AT+CPMUTEMP\r\r\n+CPMUTEMP: -12\r\nOK"), Some(-12));
        assert_eq!(temperature("+CPMUTEMP:0"), Some(0));
        assert_eq!(temperature("+CPMUTEMP: -"), None);
        assert_eq!(temperature("+CPMUTEMP:\r\n25"), None);
        assert_eq!(temperature("OK"), None);
    }

    #[test]
    fn supply_parsing() {
        assert_eq!(millivolts("+CBC: 4.123V"), Some(4123));
        assert_eq!(millivolts("AT+CBC\r\r\n+CBC: 3.70V\r\nOK"), Some(3700));
        assert_eq!(millivolts("+CBC: 4V"), Some(4000));
        assert_eq!(millivolts("+CBC: 4.12345V"), Some(4123));
        assert_eq!(millivolts("+CBC: V"), None);
        assert_eq!(millivolts("OK"), None);
    }

    #[test]
    fn clock_and_operators() {
        let mut client = client(
            MockChannel::new()
                .respond("AT+CCLK?", &["\r\n+CCLK: \"24/03/18,10:21:07+04\"\r\n\r\nOK\r\n"])
                .respond("AT+COPN", &["\r\n+COPN: \"001\",\"Test Network\"\r\n\r\nOK\r\n"]),
        );

        assert!(query_clock(&mut client).unwrap().contains("24/03/18,10:21:07+04"));
        assert!(query_operator_names(&mut client)
            .unwrap()
            .contains("Test Network"));
    }

    #[test]
    fn clock_failure() {
        let mut client = client(MockChannel::new().respond("AT+CCLK?", &["\r\nERROR\r\n"]));
        assert_eq!(query_clock(&mut client), Err(Error::ExplicitFailure));
    }
}
