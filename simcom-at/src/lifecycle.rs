use core::convert::Infallible;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_io::{Read, ReadReady, Write};

use crate::{Client, Error, Outcome, WaitResult};

/// Power-up progress of the modem.
///
/// `Off → Resetting → Booting → ProbingReady → Ready`, with `Failed` reached
/// from `ProbingReady` when the modem does not answer. `Failed` is terminal;
/// recovery is a full device restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecycleState {
    Off,
    Resetting,
    Booting,
    ProbingReady,
    Ready,
    Failed,
}

/// Command used to check that the modem answers after boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeCommand {
    /// Plain attention command
    At,
    /// Reset to user profile, loading stored settings
    Atz,
}

impl ProbeCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::At => "AT",
            Self::Atz => "ATZ",
        }
    }
}

/// Stand-in for a control line that is not wired up.
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Control lines of the modem and the timing of the power-up sequence.
///
/// The default timings match the SIMCom A7670 on the T-SIM board.
pub trait ModemPins {
    type EnablePin: OutputPin;
    type ResetPin: OutputPin;
    type PowerPin: OutputPin;

    /// Low time before each reset and power pulse
    const PULSE_LEAD: Duration = Duration::from_millis(100);
    /// High time of the reset pulse
    const RESET_HOLD: Duration = Duration::from_millis(3000);
    /// High time of the power key pulse
    const POWER_HOLD: Duration = Duration::from_millis(1000);
    /// Wait after the power pulse before listening for the boot banner
    const BOOT_SETTLE: Duration = Duration::from_millis(5000);
    /// How long to listen for the boot banner
    const BOOT_TIMEOUT: Duration = Duration::from_millis(12000);
    const BOOT_BANNER: &'static str = "PB DONE";
    const PROBE: ProbeCommand = ProbeCommand::Atz;

    fn enable_pin(&mut self) -> Option<&mut Self::EnablePin>;
    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin>;
    fn power_pin(&mut self) -> Option<&mut Self::PowerPin>;
}

/// A modem session: the AT client, the control lines and the lifecycle state.
pub struct Modem<RW, D, P, const N: usize> {
    client: Client<RW, D, N>,
    pins: P,
    state: LifecycleState,
}

impl<RW, D, P, const N: usize> Modem<RW, D, P, N>
where
    RW: Read + ReadReady + Write,
    D: DelayNs,
    P: ModemPins,
{
    pub fn new(client: Client<RW, D, N>, pins: P) -> Self {
        Self {
            client,
            pins,
            state: LifecycleState::Off,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The AT client, available once the modem is `Ready`.
    pub fn client(&mut self) -> Result<&mut Client<RW, D, N>, Error> {
        self.expect(LifecycleState::Ready)?;
        Ok(&mut self.client)
    }

    /// Give back the client and pins, e.g. to hand over to deep sleep.
    pub fn release(self) -> (Client<RW, D, N>, P) {
        (self.client, self.pins)
    }

    /// Run the full power-up sequence, ending in `Ready` or `Failed`.
    pub fn start(&mut self) -> Result<(), Error> {
        self.power_up()?;
        self.settle()?;
        self.await_boot()?;
        self.probe()
    }

    /// `Off → Resetting`: assert enable, pulse reset, then pulse power.
    pub fn power_up(&mut self) -> Result<(), Error> {
        self.expect(LifecycleState::Off)?;
        info!("Resetting modem...");

        if let Some(en) = self.pins.enable_pin() {
            en.set_high().map_err(|_| Error::Pin)?;
        }

        pulse(
            self.pins.reset_pin(),
            &mut self.client,
            P::PULSE_LEAD,
            P::RESET_HOLD,
        )?;
        pulse(
            self.pins.power_pin(),
            &mut self.client,
            P::PULSE_LEAD,
            P::POWER_HOLD,
        )?;

        info!("Modem power-up starting");
        self.transition(LifecycleState::Resetting);
        Ok(())
    }

    /// `Resetting → Booting`: give the modem time to boot.
    pub fn settle(&mut self) -> Result<(), Error> {
        self.expect(LifecycleState::Resetting)?;
        self.client.pause(P::BOOT_SETTLE);
        self.transition(LifecycleState::Booting);
        Ok(())
    }

    /// `Booting → ProbingReady`: listen for the boot banner.
    ///
    /// Some firmware variants never print the banner, so a missing banner is
    /// only logged. Returns whether it was seen.
    pub fn await_boot(&mut self) -> Result<bool, Error> {
        self.expect(LifecycleState::Booting)?;

        let seen = match self
            .client
            .wait_for_token(P::BOOT_BANNER, P::BOOT_TIMEOUT, true)?
        {
            WaitResult::Found(_) => true,
            WaitResult::NotFound => {
                warn!("** DID NOT SEE {} message **", P::BOOT_BANNER);
                false
            }
        };

        self.transition(LifecycleState::ProbingReady);
        Ok(seen)
    }

    /// `ProbingReady → Ready | Failed`: check that the modem answers.
    pub fn probe(&mut self) -> Result<(), Error> {
        self.expect(LifecycleState::ProbingReady)?;
        info!("Testing modem response...");

        let outcome = match self.client.execute(P::PROBE.as_str()) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(LifecycleState::Failed);
                return Err(e);
            }
        };

        match outcome {
            Outcome::Success(_) => {
                info!("Modem is active and ready");
                self.transition(LifecycleState::Ready);
                Ok(())
            }
            outcome => {
                error!("** Failed to connect to the modem! Check the baud and try again. **");
                self.transition(LifecycleState::Failed);
                Err(outcome.error().unwrap_or(Error::Timeout))
            }
        }
    }

    /// Ask the modem to power itself off, from any state.
    ///
    /// Best effort: failures are logged and the session is considered `Off`
    /// regardless, unless it had `Failed`, which it stays in.
    pub fn shutdown(&mut self) {
        if self.state == LifecycleState::Off {
            debug!("Modem already off");
            return;
        }

        info!("Powering off the modem");
        match self.client.execute("AT+CPOF") {
            Ok(Outcome::Success(_)) => {}
            Ok(_) => warn!("Modem did not acknowledge power off"),
            Err(_) => error!("Failed to send power off command"),
        }
        self.client.cooldown();
        if self.state == LifecycleState::Failed {
            // Leaving `Failed` takes a full device restart.
            return;
        }
        self.transition(LifecycleState::Off);
    }

    fn expect(&self, expected: LifecycleState) -> Result<(), Error> {
        if self.state != expected {
            error!(
                "Invalid lifecycle transition: expected {:?}, found {:?}",
                expected, self.state
            );
            return Err(Error::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: LifecycleState) {
        trace!("Lifecycle {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Drive `pin` low for `lead`, high for `hold`, then low again.
fn pulse<O, RW, D, const N: usize>(
    pin: Option<&mut O>,
    client: &mut Client<RW, D, N>,
    lead: Duration,
    hold: Duration,
) -> Result<(), Error>
where
    O: OutputPin,
    RW: Read + ReadReady + Write,
    D: DelayNs,
{
    let Some(pin) = pin else {
        return Ok(());
    };

    pin.set_low().map_err(|_| Error::Pin)?;
    client.pause(lead);
    pin.set_high().map_err(|_| Error::Pin)?;
    client.pause(hold);
    pin.set_low().map_err(|_| Error::Pin)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::{client, MockChannel, MockDelay, MockPin, PinLog, TEST_REPLY_LEN};

    struct TestPins {
        enable: MockPin,
        reset: MockPin,
        power: MockPin,
    }

    impl TestPins {
        fn new(log: &PinLog) -> Self {
            Self {
                enable: MockPin::new("enable", log),
                reset: MockPin::new("reset", log),
                power: MockPin::new("power", log),
            }
        }
    }

    impl ModemPins for TestPins {
        type EnablePin = MockPin;
        type ResetPin = MockPin;
        type PowerPin = MockPin;

        const PULSE_LEAD: Duration = Duration::from_millis(1);
        const RESET_HOLD: Duration = Duration::from_millis(30);
        const POWER_HOLD: Duration = Duration::from_millis(10);
        const BOOT_SETTLE: Duration = Duration::from_millis(50);
        const BOOT_TIMEOUT: Duration = Duration::from_millis(20);

        fn enable_pin(&mut self) -> Option<&mut Self::EnablePin> {
            Some(&mut self.enable)
        }

        fn reset_pin(&mut self) -> Option<&mut Self::ResetPin> {
            Some(&mut self.reset)
        }

        fn power_pin(&mut self) -> Option<&mut Self::PowerPin> {
            Some(&mut self.power)
        }
    }

    struct Unwired;

    impl ModemPins for Unwired {
        type EnablePin = NoPin;
        type ResetPin = NoPin;
        type PowerPin = NoPin;

        const PROBE: ProbeCommand = ProbeCommand::At;
        const BOOT_SETTLE: Duration = Duration::from_millis(0);
        const BOOT_TIMEOUT: Duration = Duration::from_millis(5);

        fn enable_pin(&mut self) -> Option<&mut Self::EnablePin> {
            None
        }

        fn reset_pin(&mut self) -> Option<&mut Self::ResetPin> {
            None
        }

        fn power_pin(&mut self) -> Option<&mut Self::PowerPin> {
            None
        }
    }

    type TestModem<P> = Modem<MockChannel, MockDelay, P, TEST_REPLY_LEN>;

    fn modem(channel: MockChannel, log: &PinLog) -> TestModem<TestPins> {
        Modem::new(client(channel), TestPins::new(log))
    }

    #[test]
    fn start_reaches_ready() {
        let log = PinLog::default();
        let channel = MockChannel::new()
            .deliver(&[None, Some("\r\nRDY\r\n"), Some("\r\nPB DONE\r\n")])
            .respond("ATZ", &["ATZ\r\r\nOK\r\n"]);
        let mut modem = modem(channel, &log);

        modem.start().unwrap();
        assert_eq!(modem.state(), LifecycleState::Ready);
        assert!(modem.client().is_ok());

        assert_eq!(
            *log.borrow(),
            [
                ("enable", true),
                ("reset", false),
                ("reset", true),
                ("reset", false),
                ("power", false),
                ("power", true),
                ("power", false),
            ]
        );

        let (client, _) = modem.release();
        let (channel, delay) = client.release();
        assert_eq!(channel.lines, ["ATZ"]);
        // Pulses, boot settle, two banner poll steps, then the probe's first
        // attempt settle and a single poll.
        assert_eq!(delay.elapsed_ms(), (1 + 30 + 1 + 10) + 50 + 2 + (5 + 1));
    }

    #[test]
    fn missing_banner_is_not_fatal() {
        let log = PinLog::default();
        let channel = MockChannel::new().respond("ATZ", &["OK\r\n"]);
        let mut modem = modem(channel, &log);

        modem.power_up().unwrap();
        modem.settle().unwrap();
        assert!(!modem.await_boot().unwrap());
        assert_eq!(modem.state(), LifecycleState::ProbingReady);
        modem.probe().unwrap();
        assert_eq!(modem.state(), LifecycleState::Ready);
    }

    #[test]
    fn silent_modem_fails() {
        let log = PinLog::default();
        let mut modem = modem(MockChannel::new(), &log);

        assert_eq!(modem.start(), Err(Error::Timeout));
        assert_eq!(modem.state(), LifecycleState::Failed);

        assert_eq!(
            modem.start(),
            Err(Error::InvalidState {
                expected: LifecycleState::Off,
                found: LifecycleState::Failed,
            })
        );
        assert!(modem.client().is_err());

        modem.shutdown();
        assert_eq!(modem.state(), LifecycleState::Failed);
        assert_eq!(
            modem.start(),
            Err(Error::InvalidState {
                expected: LifecycleState::Off,
                found: LifecycleState::Failed,
            })
        );

        let (client, _) = modem.release();
        let (channel, _) = client.release();
        assert_eq!(channel.lines.last().map(|l| l.as_str()), Some("AT+CPOF"));
    }

    #[test]
    fn rejected_probe_fails() {
        let log = PinLog::default();
        let channel = MockChannel::new().respond("ATZ", &["ERROR\r\n"]);
        let mut modem = modem(channel, &log);

        assert_eq!(modem.start(), Err(Error::ExplicitFailure));
        assert_eq!(modem.state(), LifecycleState::Failed);

        modem.shutdown();
        assert!(matches!(
            modem.start(),
            Err(Error::InvalidState {
                found: LifecycleState::Failed,
                ..
            })
        ));
        assert!(modem.client().is_err());
    }

    #[test]
    fn out_of_order_transition_is_rejected() {
        let log = PinLog::default();
        let mut modem = modem(MockChannel::new(), &log);

        assert_eq!(
            modem.settle(),
            Err(Error::InvalidState {
                expected: LifecycleState::Resetting,
                found: LifecycleState::Off,
            })
        );
        assert!(modem.probe().is_err());
        assert_eq!(modem.state(), LifecycleState::Off);
        assert!(log.borrow().is_empty());

        let (client, _) = modem.release();
        let (channel, delay) = client.release();
        assert!(channel.written.is_empty());
        assert_eq!(delay.elapsed_ns, 0);
    }

    #[test]
    fn pin_failure_keeps_state() {
        let log = PinLog::default();
        let mut pins = TestPins::new(&log);
        pins.reset.fail = true;
        let mut modem: TestModem<TestPins> = Modem::new(client(MockChannel::new()), pins);

        assert_eq!(modem.power_up(), Err(Error::Pin));
        assert_eq!(modem.state(), LifecycleState::Off);
        assert_eq!(*log.borrow(), [("enable", true)]);
    }

    #[test]
    fn unwired_pins_probe_with_at() {
        let channel = MockChannel::new()
            .deliver(&[Some("\r\nPB DONE\r\n")])
            .respond("AT", &["OK\r\n"]);
        let mut modem: TestModem<Unwired> = Modem::new(client(channel), Unwired);

        modem.start().unwrap();
        assert_eq!(modem.state(), LifecycleState::Ready);

        modem.shutdown();
        assert_eq!(modem.state(), LifecycleState::Off);
    }

    #[test]
    fn shutdown_when_off_sends_nothing() {
        let log = PinLog::default();
        let mut modem = modem(MockChannel::new(), &log);
        modem.shutdown();

        let (client, _) = modem.release();
        let (channel, _) = client.release();
        assert!(channel.written.is_empty());
    }
}
