//! Blocking driver over [`embedded_hal::i2c::I2c`] and [`embedded_hal::delay::DelayNs`].

use crate::controller::Controller;
use crate::hw_def::*;
use crate::types::*;

use embedded_hal::{delay::DelayNs, i2c::I2c};

/// SHT3x-DIS driver and acquisition state machine, blocking flavour
///
/// The driver owns the bus handle: every operation takes `&mut self`, so one driver instance is
/// one logical owner of the sensor. Share the sensor between threads by moving the driver, or by
/// wrapping it in a mutex held across a whole trigger-then-fetch cycle.
#[derive(Debug)]
pub struct Sht3x<I2C, Delay, Clk> {
    i2c: I2C,
    delay: Delay,
    i2c_addr: I2cAddr,
    core: Controller<Clk>,
}

impl<I2C, Delay, Clk, E> Sht3x<I2C, Delay, Clk>
where
    I2C: I2c<Error = E>,
    Delay: DelayNs,
    Clk: Clock,
    E: embedded_hal::i2c::Error,
{
    /// Create a new driver instance; no bus traffic until a command is issued
    pub fn new(i2c: I2C, delay: Delay, clock: Clk, i2c_addr: I2cAddr) -> Self {
        Self { i2c, delay, i2c_addr, core: Controller::new(clock) }
    }

    /// Release the bus, delay and clock
    pub fn destroy(self) -> (I2C, Delay, Clk) {
        (self.i2c, self.delay, self.core.into_clock())
    }

    fn command(&mut self, cmd: Command) -> Result<(), Error<E>> {
        trace!("sht3x: command {:?}", cmd);
        self.i2c.write(self.i2c_addr.as_u8(), &cmd.to_be_bytes()).map_err(Error::I2c)
    }

    fn break_periodic(&mut self) -> Result<(), Error<E>> {
        self.command(Command::Break)?;
        self.core.stopped();
        self.delay.delay_us(COMMAND_RECOVERY_US);
        Ok(())
    }

    /// Select the acquisition mode
    ///
    /// A running periodic acquisition is stopped first. Any measurement in flight is dropped.
    pub fn set_mode(&mut self, mode: AcquisitionMode) -> Result<(), Error<E>> {
        if self.core.periodic_running() {
            self.break_periodic()?;
        }
        debug!("sht3x: mode {:?}", mode);
        self.core.configure(mode);
        Ok(())
    }

    /// Currently selected mode
    pub fn mode(&self) -> Option<AcquisitionMode> {
        self.core.mode()
    }

    /// Current state of the acquisition state machine
    pub fn state(&self) -> State {
        self.core.state()
    }

    /// Trigger a single shot measurement, or start periodic acquisition
    ///
    /// In periodic mode only the first call talks to the sensor; afterwards it free-runs.
    pub fn init_read(&mut self) -> Result<(), Error<E>> {
        if let Some(cmd) = self.core.read_command()? {
            self.command(cmd)?;
            self.core.read_started();
        }
        Ok(())
    }

    /// Whether the conversion time of the last trigger has elapsed; no bus traffic
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    /// Fetch and convert the pending measurement
    ///
    /// With `blocking`, waits out the rest of the conversion time first. Without it, fails with
    /// [`Error::NotReady`] if the conversion time has not elapsed. A NACK from the sensor is
    /// also reported as [`Error::NotReady`]; the measurement stays pending.
    pub fn get_sample(&mut self, unit: TemperatureUnit, blocking: bool) -> Result<Sample, Error<E>> {
        let fetch = self.core.fetch(blocking)?;
        if fetch.wait_us > 0 {
            self.delay.delay_us(fetch.wait_us);
        }
        let result = self.transfer(fetch.command);
        self.core.complete(result, unit)
    }

    fn transfer(&mut self, cmd: Option<Command>) -> Result<[u8; REPLY_LEN], E> {
        let addr = self.i2c_addr.as_u8();
        if let Some(cmd) = cmd {
            self.i2c.write(addr, &cmd.to_be_bytes())?;
        }
        let mut read_buf = [0u8; REPLY_LEN];
        self.i2c.read(addr, &mut read_buf)?;
        Ok(read_buf)
    }

    /// Stop periodic acquisition; no-op otherwise
    pub fn stop(&mut self) -> Result<(), Error<E>> {
        if self.core.periodic_running() {
            self.break_periodic()?;
        }
        Ok(())
    }

    /// Soft reset; the mode has to be selected again afterwards
    pub fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.stop()?;
        self.command(Command::SoftReset)?;
        self.core.reset();
        self.delay.delay_us(SOFT_RESET_US);
        Ok(())
    }

    /// Switch the internal heater on or off
    pub fn heater(&mut self, on: bool) -> Result<(), Error<E>> {
        self.command(if on { Command::HeaterEnable } else { Command::HeaterDisable })
    }

    /// Read and optionally clear status bits
    pub fn read_status(&mut self, clear: bool) -> Result<StatusBits, Error<E>> {
        self.command(Command::ReadStatus)?;
        let mut read_buf = [0u8; WORD_REPLY_LEN];
        self.i2c.read(self.i2c_addr.as_u8(), &mut read_buf).map_err(Error::I2c)?;
        let status = decode_word(&read_buf, Field::Status)?;
        if clear {
            self.command(Command::ClearStatus)?;
        }
        Ok(StatusBits::from(status))
    }
}
