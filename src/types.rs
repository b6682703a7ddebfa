use crate::hw_def::*;

use core::fmt;

#[cfg(feature = "defmt")]
use defmt::Format;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All possible errors in this crate
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// I²C communication error (no ACK from the address, bus fault, transport timeout)
    I2c(E),
    /// Unsupported accuracy/rate combination
    InvalidConfiguration,
    /// No acquisition mode has been set
    NotConfigured,
    /// The measurement is still in progress, or none was requested
    NotReady,
    /// Reply of the wrong length
    MalformedReply,
    /// Failure of a checksum from the device was detected
    CrcMismatch(Field),
}
impl<E> From<ConfigError> for Error<E> {
    fn from(_: ConfigError) -> Self {
        Error::InvalidConfiguration
    }
}
impl<E> From<ReplyError> for Error<E> {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Malformed { .. } => Error::MalformedReply,
            ReplyError::CrcMismatch(field) => Error::CrcMismatch(field),
        }
    }
}
impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "bus error: {e:?}"),
            Error::InvalidConfiguration => write!(f, "unsupported acquisition configuration"),
            Error::NotConfigured => write!(f, "no acquisition mode set"),
            Error::NotReady => write!(f, "measurement not ready"),
            Error::MalformedReply => write!(f, "malformed reply"),
            Error::CrcMismatch(field) => write!(f, "checksum mismatch on {field}"),
        }
    }
}
impl<E: fmt::Debug> core::error::Error for Error<E> {}

/// Rejected configuration value
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Periodic rate other than 0.5, 1, 4 or 10 Hz
    UnsupportedSampleRate,
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedSampleRate => write!(f, "sample rate must be 0.5, 1, 4 or 10 Hz"),
        }
    }
}
impl core::error::Error for ConfigError {}

/// Reply validation failure, independent of the bus
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplyError {
    /// Reply did not have the expected number of bytes
    Malformed {
        /// bytes received
        len: usize,
    },
    /// Checksum byte does not match the data word
    CrcMismatch(Field),
}

/// Data word carried by a reply
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    /// temperature word of a measurement reply
    Temperature,
    /// humidity word of a measurement reply
    Humidity,
    /// status register word
    Status,
}
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Status => "status",
        })
    }
}

/// Measurement repeatability; trades conversion time for noise
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Accuracy {
    /// shortest conversion, most noise
    Low,
    /// default
    #[default]
    Medium,
    /// longest conversion, least noise
    High,
}
impl Accuracy {
    /// Maximum conversion time for this repeatability, in microseconds
    ///
    /// The sensor has no data-ready signal, so readiness is judged against this table.
    pub const fn measurement_duration_us(self) -> u32 {
        match self {
            Accuracy::Low => 4_500,
            Accuracy::Medium => 6_500,
            Accuracy::High => 15_500,
        }
    }
}

/// Measurement rate in periodic mode
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SampleRate {
    /// one measurement every 2 s
    Hz0_5,
    /// one measurement per second
    #[default]
    Hz1,
    /// four measurements per second
    Hz4,
    /// ten measurements per second
    Hz10,
}
impl SampleRate {
    /// Rate from measurements per second
    pub fn from_hz(hz: f32) -> Result<Self, ConfigError> {
        if hz == 0.5 {
            Ok(SampleRate::Hz0_5)
        } else if hz == 1.0 {
            Ok(SampleRate::Hz1)
        } else if hz == 4.0 {
            Ok(SampleRate::Hz4)
        } else if hz == 10.0 {
            Ok(SampleRate::Hz10)
        } else {
            Err(ConfigError::UnsupportedSampleRate)
        }
    }
    /// Measurements per second
    pub fn hz(self) -> f32 {
        match self {
            SampleRate::Hz0_5 => 0.5,
            SampleRate::Hz1 => 1.0,
            SampleRate::Hz4 => 4.0,
            SampleRate::Hz10 => 10.0,
        }
    }
}

/// How the sensor acquires measurements
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcquisitionMode {
    /// one measurement per trigger
    SingleShot {
        /// repeatability
        accuracy: Accuracy,
    },
    /// sensor free-runs at `rate` after one start command
    Periodic {
        /// repeatability
        accuracy: Accuracy,
        /// measurements per second
        rate: SampleRate,
    },
}
impl AcquisitionMode {
    /// Single shot mode
    pub fn single_shot(accuracy: Accuracy) -> Self {
        AcquisitionMode::SingleShot { accuracy }
    }
    /// Periodic mode from a rate in Hz, rejecting unsupported rates
    pub fn periodic(accuracy: Accuracy, hz: f32) -> Result<Self, ConfigError> {
        Ok(AcquisitionMode::Periodic { accuracy, rate: SampleRate::from_hz(hz)? })
    }
    /// Repeatability of either mode
    pub fn accuracy(&self) -> Accuracy {
        match self {
            AcquisitionMode::SingleShot { accuracy } => *accuracy,
            AcquisitionMode::Periodic { accuracy, .. } => *accuracy,
        }
    }
    /// Whether this is periodic mode
    pub fn is_periodic(&self) -> bool {
        matches!(self, AcquisitionMode::Periodic { .. })
    }
}

/// Observable state of the acquisition controller
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// no mode set
    Idle,
    /// mode set, no measurement in flight
    Configured,
    /// measurement requested, conversion time not yet elapsed
    Pending,
    /// conversion time elapsed, data can be fetched
    Ready,
}

/// Unit of the temperature reported by [`Sample::temperature`]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TemperatureUnit {
    /// degrees centigrade
    #[default]
    Celsius,
    /// degrees fahrenheit
    Fahrenheit,
}

/// Raw (still in u16 format) temperature and relative humidity from the device
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawReading {
    /// unprocessed temperature
    pub temperature: u16,
    /// unprocessed relative humidity
    pub humidity: u16,
}
impl RawReading {
    /// Get temperature in Fahrenheit
    pub fn fahrenheit(&self) -> f32 {
        raw_temp_to_fahrenheit(self.temperature)
    }
    /// Get temperature in Centigrade
    pub fn centigrade(&self) -> f32 {
        raw_temp_to_centigrade(self.temperature)
    }
    /// Get relative humidity in percent
    pub fn humidity_percent(&self) -> f32 {
        raw_rel_humid_to_percent(self.humidity)
    }
}

/// Converted measurement
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// degrees centigrade
    pub centigrade: f32,
    /// degrees fahrenheit
    pub fahrenheit: f32,
    /// relative humidity in percent; the device may report slightly above 100
    pub humidity_percent: f32,
    /// clock reading when the reply was decoded, in microseconds
    pub timestamp_us: u64,
    /// unit requested by the caller
    pub unit: TemperatureUnit,
}
impl Sample {
    /// Convert a raw reading
    pub fn from_raw(raw: &RawReading, unit: TemperatureUnit, timestamp_us: u64) -> Self {
        Self {
            centigrade: raw.centigrade(),
            fahrenheit: raw.fahrenheit(),
            humidity_percent: raw.humidity_percent(),
            timestamp_us,
            unit,
        }
    }
    /// Temperature in the requested unit
    pub fn temperature(&self) -> f32 {
        match self.unit {
            TemperatureUnit::Celsius => self.centigrade,
            TemperatureUnit::Fahrenheit => self.fahrenheit,
        }
    }
}

/// Status bits from the device
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusBits {
    raw: u16,
    /// at least one alert is pending
    pub alert_pending: bool,
    /// heater is on
    pub heater_on: bool,
    /// relative humidity tracking alert
    pub rh_tracking_alert: bool,
    /// temperature tracking alert
    pub t_tracking_alert: bool,
    /// reset (power-on, soft or brown-out) detected since last clear of status register
    pub reset_detected: bool,
    /// last command was not processed
    pub command_failed: bool,
    /// checksum of the last write transfer failed
    pub write_checksum_failed: bool,
}
impl From<u16> for StatusBits {
    fn from(raw: u16) -> Self {
        let bit = |lsbit: u16| (raw >> lsbit) & 1 != 0;
        Self {
            raw,
            alert_pending: bit(STATUS_FIELD_LSBIT_ALERT_PENDING),
            heater_on: bit(STATUS_FIELD_LSBIT_HEATER_ON),
            rh_tracking_alert: bit(STATUS_FIELD_LSBIT_RH_TRACKING_ALERT),
            t_tracking_alert: bit(STATUS_FIELD_LSBIT_T_TRACKING_ALERT),
            reset_detected: bit(STATUS_FIELD_LSBIT_RESET_DETECTED),
            command_failed: bit(STATUS_FIELD_LSBIT_COMMAND_FAILED),
            write_checksum_failed: bit(STATUS_FIELD_LSBIT_WRITE_CHECKSUM_FAILED),
        }
    }
}
impl StatusBits {
    /// Get the raw status bits
    pub fn raw(&self) -> u16 {
        self.raw
    }
}
impl fmt::Display for StatusBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusBits {{ 0x{:04x}; ", self.raw)?;
        if self.alert_pending {
            write!(f, "alert_pending ")?;
        }
        if self.heater_on {
            write!(f, "heater_on ")?;
        }
        if self.rh_tracking_alert {
            write!(f, "rh_tracking_alert ")?;
        }
        if self.t_tracking_alert {
            write!(f, "t_tracking_alert ")?;
        }
        if self.reset_detected {
            write!(f, "reset_detected ")?;
        }
        if self.command_failed {
            write!(f, "command_failed ")?;
        }
        if self.write_checksum_failed {
            write!(f, "write_checksum_failed ")?;
        }
        write!(f, "}}")
    }
}

/// Monotonic time source used for readiness and sample timestamps
pub trait Clock {
    /// Microseconds since an arbitrary, fixed origin
    fn now_us(&self) -> u64;
}
impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// [`Clock`] backed by [`std::time::Instant`], counting from its creation
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}
#[cfg(feature = "std")]
impl StdClock {
    /// Clock starting at zero now
    pub fn new() -> Self {
        Self { origin: std::time::Instant::now() }
    }
}
#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}
#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}
