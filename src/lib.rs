//! This is a platform-agnostic Rust driver for the Sensirion SHT30-DIS, SHT31-DIS and SHT35-DIS
//! digital humidity and temperature sensors using the [`embedded-hal`] or [`embedded-hal-async`]
//! traits, with an optional background logger that writes samples to a CSV file or an SQL table.
//!
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal/tree/master/embedded-hal
//! [`embedded-hal-async`]: https://github.com/rust-embedded/embedded-hal/tree/master/embedded-hal-async
//!
//! This driver allows you to:
//! - Select single shot or periodic acquisition, with low, medium or high repeatability and a
//!   periodic rate of 0.5, 1, 4 or 10 measurements per second.
//! - Trigger a measurement, poll for readiness and fetch the result, waiting or not.
//! - Verify the CRC of every data word and convert to °C, °F and %RH.
//! - Stop periodic acquisition.
//! - Enable/disable the heater.
//! - Trigger a software reset.
//! - Read and optionally clear the device status bits.
//! - Log samples periodically to a file or database (`std` feature).
//!
//! The sensor has no data-ready line. Readiness is judged locally from the time elapsed since the
//! trigger, using the maximum conversion time of the selected repeatability
//! ([`Accuracy::measurement_duration_us`]). The driver therefore needs a monotonic [`Clock`]
//! besides the bus and a delay; [`StdClock`] is provided with the `std` feature.
//!
//! ## Features
//!
//! - `async`: Enables async API ([`asynch::Sht3x`]).
//! - `blocking`: Enables blocking API ([`blocking::Sht3x`]).
//! - `std`: Enables [`StdClock`] and the [`logger`] module. Implies `log`.
//! - `serde`: Derives `Serialize`/`Deserialize` on configuration and sample types.
//! - `defmt`: Enables logging using the `defmt` framework.
//! - `log`: Enables logging using the `log` framework.
//!
//! ## Supported devices: SHT30-DIS, SHT31-DIS, SHT35-DIS
//!
//! Datasheet:
//!   [SHT3x-DIS](https://sensirion.com/media/documents/213E6A3B/63A5A569/Datasheet_SHT3x_DIS.pdf)
//!
//! ## Blocking Example:
//!
//! ```ignore
//! use sht3x_dis::{blocking::Sht3x, Accuracy, AcquisitionMode, I2cAddr, StdClock, TemperatureUnit};
//!
//! // Platform-specific
//! let i2c = /* embedded_hal::i2c::I2c instance */;
//! let delay = /* embedded_hal::delay::DelayNs instance */;
//!
//! let mut sht = Sht3x::new(i2c, delay, StdClock::new(), I2cAddr::AddrLow);
//!
//! // Single shot: trigger, then wait for the conversion and read
//! sht.set_mode(AcquisitionMode::single_shot(Accuracy::High)).unwrap();
//! sht.init_read().unwrap();
//! let sample = sht.get_sample(TemperatureUnit::Celsius, true).unwrap();
//! println!("{:0.1} °C, {:0.1} %RH", sample.temperature(), sample.humidity_percent);
//!
//! // Periodic: start once, then fetch whenever a result is due
//! sht.set_mode(AcquisitionMode::periodic(Accuracy::Medium, 1.0).unwrap()).unwrap();
//! sht.init_read().unwrap();
//! loop {
//!     sleep_secs(1);
//!     match sht.get_sample(TemperatureUnit::Fahrenheit, false) {
//!         Ok(sample) => println!("{:0.1} °F", sample.temperature()),
//!         Err(sht3x_dis::Error::NotReady) => continue,
//!         Err(e) => println!("read failed: {e}"),
//!     }
//! }
//! ```
//!
//! ## Logging Example:
//!
//! ```ignore
//! use sht3x_dis::logger::{FileSink, Logger, LoggerConfig};
//!
//! let handle = Logger::new(sht, FileSink::new("/var/log/climate.csv"), LoggerConfig::default())
//!     .spawn()
//!     .unwrap();
//! // ...
//! println!("{} samples skipped", handle.stats().acquisition_errors());
//! let (sht, _sink) = handle.stop().unwrap();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(not(any(feature = "async", feature = "blocking")))]
compile_error!("At least one of \"async\" and \"blocking\" features must be enabled");

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("Features \"defmt\" and \"log\" are mutually exclusive and cannot be enabled together");

#[macro_use]
mod fmt;

mod controller;
mod hw_def;
mod types;

pub use crate::{hw_def::*, types::*};

cfg_if::cfg_if! {
    if #[cfg(feature = "blocking")] {
        pub mod blocking;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "async")] {
        pub mod asynch;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        pub mod logger;
    }
}
