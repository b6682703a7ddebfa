use crate::types::{AcquisitionMode, Accuracy, Field, RawReading, ReplyError, SampleRate};

use crc::{Crc, CRC_8_NRSC_5};

#[cfg(feature = "defmt")]
use defmt::Format;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// CRC-8, polynomial 0x31, init 0xFF, no reflection, no final xor
pub(crate) const CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

/// Length of a temperature + humidity reply: two words, each followed by its checksum
pub const REPLY_LEN: usize = 6;
/// Length of a single word reply (status register)
pub const WORD_REPLY_LEN: usize = 3;

/// Minimum pause after break or reset before the next command is accepted
pub(crate) const COMMAND_RECOVERY_US: u32 = 1_000;
/// Soft reset duration
pub(crate) const SOFT_RESET_US: u32 = 1_500;

pub(crate) const STATUS_FIELD_LSBIT_ALERT_PENDING: u16 = 15;
pub(crate) const STATUS_FIELD_LSBIT_HEATER_ON: u16 = 13;
pub(crate) const STATUS_FIELD_LSBIT_RH_TRACKING_ALERT: u16 = 11;
pub(crate) const STATUS_FIELD_LSBIT_T_TRACKING_ALERT: u16 = 10;
pub(crate) const STATUS_FIELD_LSBIT_RESET_DETECTED: u16 = 4;
pub(crate) const STATUS_FIELD_LSBIT_COMMAND_FAILED: u16 = 1;
pub(crate) const STATUS_FIELD_LSBIT_WRITE_CHECKSUM_FAILED: u16 = 0;

/// I²C address, selected by the level of the ADDR pin
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum I2cAddr {
    /// ADDR pin low (0x44)
    #[default]
    AddrLow,
    /// ADDR pin high (0x45)
    AddrHigh,
}
impl I2cAddr {
    /// Seven bit bus address
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AddrLow => 0x44,
            Self::AddrHigh => 0x45,
        }
    }
}

/// 16-bit command codes understood by the SHT3x-DIS, sent MSB first
///
/// Single shot commands are the variants without clock stretching: the sensor NACKs read
/// headers until the conversion is done, which the driver reports as "not ready".
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum Command {
    /// single shot, high repeatability
    SingleShotHigh = 0x2400,
    /// single shot, medium repeatability
    SingleShotMedium = 0x240B,
    /// single shot, low repeatability
    SingleShotLow = 0x2416,
    /// periodic 0.5 mps, high repeatability
    Periodic0_5High = 0x2032,
    /// periodic 0.5 mps, medium repeatability
    Periodic0_5Medium = 0x2024,
    /// periodic 0.5 mps, low repeatability
    Periodic0_5Low = 0x202F,
    /// periodic 1 mps, high repeatability
    Periodic1High = 0x2130,
    /// periodic 1 mps, medium repeatability
    Periodic1Medium = 0x2126,
    /// periodic 1 mps, low repeatability
    Periodic1Low = 0x212D,
    /// periodic 4 mps, high repeatability
    Periodic4High = 0x2334,
    /// periodic 4 mps, medium repeatability
    Periodic4Medium = 0x2322,
    /// periodic 4 mps, low repeatability
    Periodic4Low = 0x2329,
    /// periodic 10 mps, high repeatability
    Periodic10High = 0x2737,
    /// periodic 10 mps, medium repeatability
    Periodic10Medium = 0x2721,
    /// periodic 10 mps, low repeatability
    Periodic10Low = 0x272A,
    /// fetch the latest periodic result
    FetchData = 0xE000,
    /// stop periodic acquisition
    Break = 0x3093,
    /// soft reset
    SoftReset = 0x30A2,
    /// heater on
    HeaterEnable = 0x306D,
    /// heater off
    HeaterDisable = 0x3066,
    /// read the status register
    ReadStatus = 0xF32D,
    /// clear the status register alert flags
    ClearStatus = 0x3041,
}
impl Command {
    /// Raw 16-bit command code
    pub fn code(self) -> u16 {
        self as u16
    }
    /// Command bytes in transmission order
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.code().to_be_bytes()
    }
}

/// Command that starts an acquisition in the given mode
///
/// Single shot: the measurement trigger. Periodic: the periodic start command.
pub fn encode(mode: AcquisitionMode) -> Command {
    use Accuracy::*;
    use SampleRate::*;
    match mode {
        AcquisitionMode::SingleShot { accuracy } => match accuracy {
            High => Command::SingleShotHigh,
            Medium => Command::SingleShotMedium,
            Low => Command::SingleShotLow,
        },
        AcquisitionMode::Periodic { accuracy, rate } => match (rate, accuracy) {
            (Hz0_5, High) => Command::Periodic0_5High,
            (Hz0_5, Medium) => Command::Periodic0_5Medium,
            (Hz0_5, Low) => Command::Periodic0_5Low,
            (Hz1, High) => Command::Periodic1High,
            (Hz1, Medium) => Command::Periodic1Medium,
            (Hz1, Low) => Command::Periodic1Low,
            (Hz4, High) => Command::Periodic4High,
            (Hz4, Medium) => Command::Periodic4Medium,
            (Hz4, Low) => Command::Periodic4Low,
            (Hz10, High) => Command::Periodic10High,
            (Hz10, Medium) => Command::Periodic10Medium,
            (Hz10, Low) => Command::Periodic10Low,
        },
    }
}

/// Checksum of one data word as the sensor computes it
pub fn checksum(word: &[u8]) -> u8 {
    CRC.checksum(word)
}

fn checked_word(group: &[u8], field: Field) -> Result<u16, ReplyError> {
    let crc_expect = checksum(&group[0..2]);
    if group[2] != crc_expect {
        warn!("sht3x: crc mismatch on {:?}: read_crc={}, crc_expect={}", field, group[2], crc_expect);
        return Err(ReplyError::CrcMismatch(field));
    }
    Ok(u16::from_be_bytes([group[0], group[1]]))
}

/// Split and verify a temperature + humidity reply
pub fn decode(bytes: &[u8]) -> Result<RawReading, ReplyError> {
    if bytes.len() != REPLY_LEN {
        return Err(ReplyError::Malformed { len: bytes.len() });
    }
    let temperature = checked_word(&bytes[0..3], Field::Temperature)?;
    let humidity = checked_word(&bytes[3..6], Field::Humidity)?;
    Ok(RawReading { temperature, humidity })
}

/// Verify a single word reply
pub fn decode_word(bytes: &[u8], field: Field) -> Result<u16, ReplyError> {
    if bytes.len() != WORD_REPLY_LEN {
        return Err(ReplyError::Malformed { len: bytes.len() });
    }
    checked_word(bytes, field)
}

/// Raw temperature code to degrees centigrade
pub fn raw_temp_to_centigrade(raw: u16) -> f32 {
    -45.0 + 175.0 * (raw as f32 / 65535.0)
}

/// Raw temperature code to degrees fahrenheit
pub fn raw_temp_to_fahrenheit(raw: u16) -> f32 {
    -49.0 + 315.0 * (raw as f32 / 65535.0)
}

/// Raw humidity code to percent relative humidity
pub fn raw_rel_humid_to_percent(raw: u16) -> f32 {
    100.0 * (raw as f32 / 65535.0)
}
