//! Async driver over [`embedded_hal_async::i2c::I2c`] and [`embedded_hal_async::delay::DelayNs`].

use crate::controller::Controller;
use crate::hw_def::*;
use crate::types::*;

use embedded_hal_async::{delay::DelayNs, i2c::I2c};

/// SHT3x-DIS driver and acquisition state machine, async flavour
///
/// Same state machine and semantics as [`crate::blocking::Sht3x`]; waiting for a conversion
/// yields to the executor instead of spinning.
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
    /// Create a new driver instance
    pub fn new(i2c: I2C, delay: Delay, clock: Clk, i2c_addr: I2cAddr) -> Self {
        Self { i2c, delay, i2c_addr, core: Controller::new(clock) }
    }

    /// Release the bus, delay and clock
    pub fn destroy(self) -> (I2C, Delay, Clk) {
        (self.i2c, self.delay, self.core.into_clock())
    }

    async fn command(&mut self, cmd: Command) -> Result<(), Error<E>> {
        trace!("sht3x: command {:?}", cmd);
        self.i2c.write(self.i2c_addr.as_u8(), &cmd.to_be_bytes()).await.map_err(Error::I2c)
    }

    async fn break_periodic(&mut self) -> Result<(), Error<E>> {
        self.command(Command::Break).await?;
        self.core.stopped();
        self.delay.delay_us(COMMAND_RECOVERY_US).await;
        Ok(())
    }

    /// Select the acquisition mode, stopping a running periodic acquisition first
    pub async fn set_mode(&mut self, mode: AcquisitionMode) -> Result<(), Error<E>> {
        if self.core.periodic_running() {
            self.break_periodic().await?;
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
    pub async fn init_read(&mut self) -> Result<(), Error<E>> {
        if let Some(cmd) = self.core.read_command()? {
            self.command(cmd).await?;
            self.core.read_started();
        }
        Ok(())
    }

    /// Whether the conversion time of the last trigger has elapsed; no bus traffic
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    /// Fetch and convert the pending measurement, see [`crate::blocking::Sht3x::get_sample`]
    pub async fn get_sample(&mut self, unit: TemperatureUnit, blocking: bool) -> Result<Sample, Error<E>> {
        let fetch = self.core.fetch(blocking)?;
        if fetch.wait_us > 0 {
            self.delay.delay_us(fetch.wait_us).await;
        }
        let result = self.transfer(fetch.command).await;
        self.core.complete(result, unit)
    }

    async fn transfer(&mut self, cmd: Option<Command>) -> Result<[u8; REPLY_LEN], E> {
        let addr = self.i2c_addr.as_u8();
        if let Some(cmd) = cmd {
            self.i2c.write(addr, &cmd.to_be_bytes()).await?;
        }
        let mut read_buf = [0u8; REPLY_LEN];
        self.i2c.read(addr, &mut read_buf).await?;
        Ok(read_buf)
    }

    /// Stop periodic acquisition; no-op otherwise
    pub async fn stop(&mut self) -> Result<(), Error<E>> {
        if self.core.periodic_running() {
            self.break_periodic().await?;
        }
        Ok(())
    }

    /// Soft reset; the mode has to be selected again afterwards
    pub async fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.stop().await?;
        self.command(Command::SoftReset).await?;
        self.core.reset();
        self.delay.delay_us(SOFT_RESET_US).await;
        Ok(())
    }

    /// Condensation heater
    pub async fn heater(&mut self, on: bool) -> Result<(), Error<E>> {
        self.command(if on { Command::HeaterEnable } else { Command::HeaterDisable }).await
    }

    /// Read and optionally clear status bits
    pub async fn read_status(&mut self, clear: bool) -> Result<StatusBits, Error<E>> {
        self.command(Command::ReadStatus).await?;
        let mut read_buf = [0u8; WORD_REPLY_LEN];
        self.i2c.read(self.i2c_addr.as_u8(), &mut read_buf).await.map_err(Error::I2c)?;
        let status = decode_word(&read_buf, Field::Status)?;
        if clear {
            self.command(Command::ClearStatus).await?;
        }
        Ok(StatusBits::from(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{reply, ManualClock};

    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};
    use pollster::block_on;

    const ADDR: u8 = 0x45;

    #[test]
    fn single_shot_round() {
        let expectations = [
            Transaction::write(ADDR, vec![0x24, 0x0B]),
            Transaction::read(ADDR, vec![0; 6])
                .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
            Transaction::read(ADDR, reply(0xFFFF, 0x0000).to_vec()),
        ];
        let clock = ManualClock::default();
        let mut sht = Sht3x::new(I2cMock::new(&expectations), NoopDelay::new(), clock.clone(), I2cAddr::AddrHigh);

        block_on(async {
            assert_eq!(sht.init_read().await, Err(Error::NotConfigured));
            sht.set_mode(AcquisitionMode::single_shot(Accuracy::Medium)).await.unwrap();
            sht.init_read().await.unwrap();
            assert_eq!(sht.get_sample(TemperatureUnit::Celsius, false).await, Err(Error::NotReady));
            clock.advance_us(7_000);
            assert_eq!(sht.get_sample(TemperatureUnit::Celsius, false).await, Err(Error::NotReady));
            let sample = sht.get_sample(TemperatureUnit::Celsius, true).await.unwrap();
            assert!((sample.centigrade - 130.0).abs() < 1e-4);
            assert_eq!(sample.humidity_percent, 0.0);
        });
        assert_eq!(sht.state(), State::Configured);

        let (mut i2c, _, _) = sht.destroy();
        i2c.done();
    }

    #[test]
    fn periodic_round() {
        let expectations = [
            Transaction::write(ADDR, vec![0x20, 0x2F]),
            Transaction::write(ADDR, vec![0xE0, 0x00]),
            Transaction::read(ADDR, reply(0x6666, 0x8000).to_vec()),
            Transaction::write(ADDR, vec![0x30, 0x93]),
        ];
        let clock = ManualClock::default();
        let mut sht = Sht3x::new(I2cMock::new(&expectations), NoopDelay::new(), clock.clone(), I2cAddr::AddrHigh);

        block_on(async {
            sht.set_mode(AcquisitionMode::periodic(Accuracy::Low, 0.5).unwrap()).await.unwrap();
            sht.init_read().await.unwrap();
            clock.advance_us(2_000_000);
            let sample = sht.get_sample(TemperatureUnit::Fahrenheit, true).await.unwrap();
            assert!((sample.temperature() - 77.0).abs() < 0.01);
            sht.stop().await.unwrap();
        });
        assert_eq!(sht.state(), State::Configured);

        let (mut i2c, _, _) = sht.destroy();
        i2c.done();
    }

    #[test]
    fn failed_break_is_returned() {
        let expectations = [
            Transaction::write(ADDR, vec![0x23, 0x34]),
            Transaction::write(ADDR, vec![0x30, 0x93]).with_error(ErrorKind::Bus),
            Transaction::write(ADDR, vec![0x30, 0x93]),
        ];
        let mut sht = Sht3x::new(I2cMock::new(&expectations), NoopDelay::new(), ManualClock::default(), I2cAddr::AddrHigh);
        let periodic = AcquisitionMode::periodic(Accuracy::High, 4.0).unwrap();

        block_on(async {
            sht.set_mode(periodic).await.unwrap();
            sht.init_read().await.unwrap();
            assert_eq!(
                sht.set_mode(AcquisitionMode::single_shot(Accuracy::High)).await,
                Err(Error::I2c(ErrorKind::Bus))
            );
            assert_eq!(sht.mode(), Some(periodic));
            sht.set_mode(AcquisitionMode::single_shot(Accuracy::High)).await.unwrap();
        });
        assert_eq!(sht.state(), State::Configured);

        let (mut i2c, _, _) = sht.destroy();
        i2c.done();
    }
}
