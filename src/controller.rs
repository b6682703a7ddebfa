//! Bus-independent acquisition state machine.
//!
//! The blocking and async drivers do the I/O; this module decides which command goes out,
//! when a measurement can be fetched and how a transfer result moves the state along.

use crate::hw_def::{decode, encode, Command, REPLY_LEN};
use crate::types::*;

use embedded_hal::i2c::ErrorKind;

/// Next step of a fetch
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct Fetch {
    /// time to wait before reading
    pub wait_us: u32,
    /// command to send before reading, if any
    pub command: Option<Command>,
}

#[derive(Debug)]
pub(crate) struct Controller<Clk> {
    clock: Clk,
    mode: Option<AcquisitionMode>,
    pending: bool,
    periodic_running: bool,
    last_command_at: Option<u64>,
}

impl<Clk: Clock> Controller<Clk> {
    pub fn new(clock: Clk) -> Self {
        Self { clock, mode: None, pending: false, periodic_running: false, last_command_at: None }
    }

    pub fn into_clock(self) -> Clk {
        self.clock
    }

    pub fn mode(&self) -> Option<AcquisitionMode> {
        self.mode
    }

    pub fn periodic_running(&self) -> bool {
        self.periodic_running
    }

    pub fn state(&self) -> State {
        match self.mode {
            None => State::Idle,
            Some(_) if !self.pending => State::Configured,
            Some(_) if self.is_ready() => State::Ready,
            Some(_) => State::Pending,
        }
    }

    fn remaining_us(&self) -> u32 {
        let (Some(mode), Some(sent_at)) = (self.mode, self.last_command_at) else {
            return 0;
        };
        let elapsed = self.clock.now_us().saturating_sub(sent_at);
        let duration = mode.accuracy().measurement_duration_us() as u64;
        duration.saturating_sub(elapsed) as u32
    }

    pub fn is_ready(&self) -> bool {
        self.pending && self.remaining_us() == 0
    }

    /// Record a new mode; any measurement in flight is forgotten.
    pub fn configure(&mut self, mode: AcquisitionMode) {
        self.mode = Some(mode);
        self.pending = false;
        self.periodic_running = false;
        self.last_command_at = None;
    }

    /// Command that starts the next measurement, `None` when the sensor is already free-running.
    pub fn read_command<E>(&self) -> Result<Option<Command>, Error<E>> {
        let mode = self.mode.ok_or(Error::NotConfigured)?;
        if mode.is_periodic() && self.periodic_running {
            return Ok(None);
        }
        Ok(Some(encode(mode)))
    }

    pub fn read_started(&mut self) {
        self.pending = true;
        if self.mode.is_some_and(|mode| mode.is_periodic()) {
            self.periodic_running = true;
        }
        self.last_command_at = Some(self.clock.now_us());
    }

    pub fn fetch<E>(&self, blocking: bool) -> Result<Fetch, Error<E>> {
        let mode = self.mode.ok_or(Error::NotConfigured)?;
        if !self.pending {
            return Err(Error::NotReady);
        }
        let remaining = self.remaining_us();
        if !blocking && remaining > 0 {
            return Err(Error::NotReady);
        }
        Ok(Fetch {
            wait_us: remaining,
            command: mode.is_periodic().then_some(Command::FetchData),
        })
    }

    /// Turn the outcome of a fetch transfer into a sample.
    ///
    /// A NACK means the sensor has nothing to hand out yet and leaves the measurement pending.
    pub fn complete<E: embedded_hal::i2c::Error>(
        &mut self,
        result: Result<[u8; REPLY_LEN], E>,
        unit: TemperatureUnit,
    ) -> Result<Sample, Error<E>> {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) if matches!(err.kind(), ErrorKind::NoAcknowledge(_)) => {
                trace!("sht3x: read NACKed, measurement not ready");
                return Err(Error::NotReady);
            }
            Err(err) => {
                self.fetch_done();
                return Err(Error::I2c(err));
            }
        };
        self.fetch_done();
        let raw = decode(&bytes)?;
        Ok(Sample::from_raw(&raw, unit, self.clock.now_us()))
    }

    fn fetch_done(&mut self) {
        if !self.periodic_running {
            self.pending = false;
            self.last_command_at = None;
        }
    }

    /// Periodic acquisition was stopped with a break.
    pub fn stopped(&mut self) {
        self.periodic_running = false;
        self.pending = false;
        self.last_command_at = None;
    }

    /// The sensor was reset and is back in its power-up state.
    pub fn reset(&mut self) {
        self.stopped();
        self.mode = None;
    }
}
