//! Background logging of samples to a file or an SQL table.
//!
//! A [`Logger`] owns a [`SampleSource`] (normally the blocking driver) and a [`Sink`]. Every
//! cycle it waits the configured interval, takes one sample and appends it. Acquisition errors
//! and sink errors are counted and reported but never end the loop; only the stop signal or the
//! configured cycle limit does.

mod sink;

pub use sink::*;

use crate::types::{Sample, TemperatureUnit};

use chrono::Local;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Something that produces samples on request
pub trait SampleSource {
    /// Acquisition error
    type Error: fmt::Debug;
    /// Prepare acquisition; called until it succeeds, before the first sample
    fn start(&mut self) -> Result<(), Self::Error>;
    /// Take one sample
    fn sample(&mut self, unit: TemperatureUnit) -> Result<Sample, Self::Error>;
}

/// Single shot: trigger and wait for every sample. Periodic: start once, then fetch the latest
/// result; only the first fetch after the start command waits out the conversion time.
#[cfg(feature = "blocking")]
impl<I2C, Delay, Clk, E> SampleSource for crate::blocking::Sht3x<I2C, Delay, Clk>
where
    I2C: embedded_hal::i2c::I2c<Error = E>,
    Delay: embedded_hal::delay::DelayNs,
    Clk: crate::types::Clock,
    E: embedded_hal::i2c::Error,
{
    type Error = crate::Error<E>;

    fn start(&mut self) -> Result<(), Self::Error> {
        use crate::types::AcquisitionMode;
        match self.mode() {
            None => Err(crate::Error::NotConfigured),
            Some(AcquisitionMode::SingleShot { .. }) => Ok(()),
            Some(AcquisitionMode::Periodic { .. }) => self.init_read(),
        }
    }

    fn sample(&mut self, unit: TemperatureUnit) -> Result<Sample, Self::Error> {
        match self.mode() {
            Some(crate::types::AcquisitionMode::Periodic { .. }) => self.get_sample(unit, true),
            _ => {
                self.init_read()?;
                self.get_sample(unit, true)
            }
        }
    }
}

/// Logger settings
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LoggerConfig {
    /// pause before each cycle
    pub interval: Duration,
    /// unit of the logged temperature
    pub unit: TemperatureUnit,
    /// stop after this many cycles; run until stopped when `None`
    pub max_cycles: Option<u64>,
}
impl Default for LoggerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), unit: TemperatureUnit::Fahrenheit, max_cycles: None }
    }
}

/// Counters shared between the logger thread and its handle
#[derive(Debug, Default)]
pub struct LoggerStats {
    cycles: AtomicU64,
    records: AtomicU64,
    acquisition_errors: AtomicU64,
    sink_errors: AtomicU64,
}
impl LoggerStats {
    /// Cycles run
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
    /// Records written to the sink
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
    /// Cycles skipped because no valid sample could be taken
    pub fn acquisition_errors(&self) -> u64 {
        self.acquisition_errors.load(Ordering::Relaxed)
    }
    /// Samples lost because the sink failed
    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }
}

/// Per-cycle notification
#[derive(Clone, Debug, PartialEq)]
pub enum LogEvent {
    /// a record was written
    Recorded(LogRecord),
    /// the cycle was skipped; the acquisition error, formatted
    AcquisitionFailed(String),
    /// a sample was taken but could not be written; the sink error, formatted
    SinkFailed(String),
}

/// What happened in one cycle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// record written
    Recorded,
    /// no valid sample, nothing written
    AcquisitionSkipped,
    /// sample lost to a sink failure
    SinkFailed,
}

/// Sampling loop over a source and a sink
pub struct Logger<S, K> {
    source: S,
    sink: K,
    config: LoggerConfig,
    stats: Arc<LoggerStats>,
    events: Option<Sender<LogEvent>>,
    started: bool,
}

impl<S, K> Logger<S, K>
where
    S: SampleSource,
    K: Sink,
{
    /// Logger over `source` and `sink`
    pub fn new(source: S, sink: K, config: LoggerConfig) -> Self {
        Self { source, sink, config, stats: Arc::default(), events: None, started: false }
    }

    /// Report every cycle on `events`; a disconnected receiver is ignored
    pub fn with_events(mut self, events: Sender<LogEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<LoggerStats> {
        Arc::clone(&self.stats)
    }

    /// Give back the source and the sink
    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    fn emit(&self, event: LogEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn acquisition_failed(&self, err: &S::Error) -> CycleOutcome {
        warn!("logger: skipping cycle: {:?}", err);
        self.stats.acquisition_errors.fetch_add(1, Ordering::Relaxed);
        self.emit(LogEvent::AcquisitionFailed(format!("{err:?}")));
        CycleOutcome::AcquisitionSkipped
    }

    /// Take one sample and append it
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        if !self.started {
            if let Err(err) = self.source.start() {
                return self.acquisition_failed(&err);
            }
            self.started = true;
        }
        let sample = match self.source.sample(self.config.unit) {
            Ok(sample) => sample,
            Err(err) => return self.acquisition_failed(&err),
        };
        let record = LogRecord::new(&sample, Local::now());
        match self.sink.append(&record) {
            Ok(()) => {
                debug!("logger: {}", record.to_csv());
                self.stats.records.fetch_add(1, Ordering::Relaxed);
                self.emit(LogEvent::Recorded(record));
                CycleOutcome::Recorded
            }
            Err(err) => {
                warn!("logger: sink failed: {}", err);
                self.stats.sink_errors.fetch_add(1, Ordering::Relaxed);
                self.emit(LogEvent::SinkFailed(err.to_string()));
                CycleOutcome::SinkFailed
            }
        }
    }

    /// Sleep until the next cycle is due; false if stopped meanwhile
    fn wait(&self, stop: &AtomicBool) -> bool {
        let deadline = Instant::now() + self.config.interval;
        loop {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::park_timeout(deadline - now);
        }
    }

    /// Run cycles until `stop` is set or the cycle limit is reached
    ///
    /// `stop` is checked between cycles only, never during a bus transfer.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("logger: started, interval {:?}", self.config.interval);
        let mut cycles = 0u64;
        while self.config.max_cycles.is_none_or(|max| cycles < max) {
            if !self.wait(stop) {
                break;
            }
            self.run_cycle();
            cycles += 1;
        }
        info!("logger: stopped after {} cycles", cycles);
    }
}

impl<S, K> Logger<S, K>
where
    S: SampleSource + Send + 'static,
    K: Sink + Send + 'static,
{
    /// Run the loop on its own thread
    pub fn spawn(mut self) -> io::Result<LoggerHandle<S, K>> {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = self.stats();
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new().name(String::from("sht3x-logger")).spawn(move || {
            self.run(&thread_stop);
            self
        })?;
        Ok(LoggerHandle { stop, stats, thread })
    }
}

/// Control of a logger running on its own thread
pub struct LoggerHandle<S, K> {
    stop: Arc<AtomicBool>,
    stats: Arc<LoggerStats>,
    thread: JoinHandle<Logger<S, K>>,
}

impl<S, K> LoggerHandle<S, K> {
    /// Shared counters
    pub fn stats(&self) -> &LoggerStats {
        &self.stats
    }

    /// Whether the loop has ended by itself (cycle limit reached)
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Signal the loop, wait for the current cycle to finish, and give back source and sink
    pub fn stop(self) -> thread::Result<(S, K)> {
        self.stop.store(true, Ordering::Release);
        self.thread.thread().unpark();
        let logger = self.thread.join()?;
        Ok((logger.source, logger.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Error, Field, RawReading};

    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Fails with a checksum error on the listed (1-based) sample calls
    struct ScriptedSource {
        calls: u64,
        fail_on: Vec<u64>,
        starts: u64,
        start_failures: u64,
    }
    impl ScriptedSource {
        fn failing_on(fail_on: &[u64]) -> Self {
            Self { calls: 0, fail_on: fail_on.to_vec(), starts: 0, start_failures: 0 }
        }
    }
    impl SampleSource for ScriptedSource {
        type Error = Error<()>;
        fn start(&mut self) -> Result<(), Self::Error> {
            self.starts += 1;
            if self.starts <= self.start_failures {
                return Err(Error::I2c(()));
            }
            Ok(())
        }
        fn sample(&mut self, unit: TemperatureUnit) -> Result<Sample, Self::Error> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(Error::CrcMismatch(Field::Temperature));
            }
            let raw = RawReading { temperature: 0x6666, humidity: 0x8000 };
            Ok(Sample::from_raw(&raw, unit, self.calls))
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        records: Arc<Mutex<Vec<LogRecord>>>,
        fail_on: Vec<usize>,
        appends: usize,
    }
    impl Sink for MemorySink {
        fn append(&mut self, record: &LogRecord) -> Result<(), SinkError> {
            self.appends += 1;
            if self.fail_on.contains(&self.appends) {
                return Err(SinkError::Database(String::from("disk full")));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn config(max_cycles: u64) -> LoggerConfig {
        LoggerConfig { interval: Duration::ZERO, unit: TemperatureUnit::Celsius, max_cycles: Some(max_cycles) }
    }

    #[test]
    fn one_bad_read_skips_one_cycle() {
        let sink = MemorySink::default();
        let records = Arc::clone(&sink.records);
        let mut logger = Logger::new(ScriptedSource::failing_on(&[3]), sink, config(10));

        let outcomes: Vec<_> = (0..10).map(|_| logger.run_cycle()).collect();
        assert_eq!(outcomes[2], CycleOutcome::AcquisitionSkipped);
        assert_eq!(outcomes.iter().filter(|o| **o == CycleOutcome::Recorded).count(), 9);

        let stats = logger.stats();
        assert_eq!(stats.cycles(), 10);
        assert_eq!(stats.records(), 9);
        assert_eq!(stats.acquisition_errors(), 1);
        assert_eq!(stats.sink_errors(), 0);
        assert_eq!(records.lock().unwrap().len(), 9);
        assert!(records.lock().unwrap().iter().all(|r| (r.temperature - 25.0).abs() < 0.01));
    }

    #[test]
    fn run_honours_cycle_limit() {
        let sink = MemorySink::default();
        let records = Arc::clone(&sink.records);
        let mut logger = Logger::new(ScriptedSource::failing_on(&[3]), sink, config(10));
        logger.run(&AtomicBool::new(false));
        assert_eq!(records.lock().unwrap().len(), 9);
        assert_eq!(logger.stats().acquisition_errors(), 1);
    }

    #[test]
    fn sink_errors_are_reported_separately() {
        let (tx, rx) = mpsc::channel();
        let sink = MemorySink { fail_on: vec![2], ..Default::default() };
        let mut logger = Logger::new(ScriptedSource::failing_on(&[4]), sink, config(5)).with_events(tx);
        logger.run(&AtomicBool::new(false));

        let stats = logger.stats();
        assert_eq!(stats.records(), 3);
        assert_eq!(stats.sink_errors(), 1);
        assert_eq!(stats.acquisition_errors(), 1);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[1], LogEvent::SinkFailed(ref msg) if msg.contains("disk full")));
        assert!(matches!(events[3], LogEvent::AcquisitionFailed(_)));
        assert!(matches!(events[4], LogEvent::Recorded(_)));
    }

    #[test]
    fn start_is_retried_until_it_succeeds() {
        let mut source = ScriptedSource::failing_on(&[]);
        source.start_failures = 2;
        let mut logger = Logger::new(source, MemorySink::default(), config(4));
        logger.run(&AtomicBool::new(false));
        assert_eq!(logger.stats().acquisition_errors(), 2);
        assert_eq!(logger.stats().records(), 2);
        let (source, _) = logger.into_parts();
        assert_eq!(source.starts, 3);
    }

    #[test]
    fn stop_signal_ends_a_spawned_logger() {
        let sink = MemorySink::default();
        let records = Arc::clone(&sink.records);
        let config = LoggerConfig { interval: Duration::from_millis(5), max_cycles: None, ..config(0) };
        let handle = Logger::new(ScriptedSource::failing_on(&[]), sink, config).spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().records() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.is_finished());
        let (source, _) = handle.stop().unwrap();
        assert!(source.calls >= 3);
        assert_eq!(records.lock().unwrap().len() as u64, source.calls);
    }

    #[test]
    fn stop_interrupts_a_long_interval() {
        let config = LoggerConfig { interval: Duration::from_secs(3600), ..LoggerConfig::default() };
        let handle = Logger::new(ScriptedSource::failing_on(&[]), MemorySink::default(), config).spawn().unwrap();
        let started = Instant::now();
        let (source, _) = handle.stop().unwrap();
        assert_eq!(source.calls, 0);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[cfg(feature = "blocking")]
    mod driver {
        use super::*;
        use crate::blocking::Sht3x;
        use crate::controller::tests::{reply, ManualClock};
        use crate::{Accuracy, AcquisitionMode, I2cAddr};

        use embedded_hal_mock::eh1::delay::NoopDelay;
        use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

        const ADDR: u8 = 0x44;

        type Driver = Sht3x<I2cMock, NoopDelay, ManualClock>;

        fn driver(expectations: &[Transaction], mode: AcquisitionMode) -> Driver {
            let mut sht = Sht3x::new(I2cMock::new(expectations), NoopDelay::new(), ManualClock::default(), I2cAddr::AddrLow);
            sht.set_mode(mode).unwrap();
            sht
        }

        fn done(logger: Logger<Driver, MemorySink>) {
            let (sht, _) = logger.into_parts();
            let (mut i2c, _, _) = sht.destroy();
            i2c.done();
        }

        #[test]
        fn single_shot_triggers_every_cycle() {
            let mut expectations = Vec::new();
            for _ in 0..3 {
                expectations.push(Transaction::write(ADDR, vec![0x24, 0x0B]));
                expectations.push(Transaction::read(ADDR, reply(0x6666, 0x8000).to_vec()));
            }
            let sht = driver(&expectations, AcquisitionMode::single_shot(Accuracy::Medium));
            let sink = MemorySink::default();
            let records = Arc::clone(&sink.records);
            let mut logger = Logger::new(sht, sink, config(3));
            logger.run(&AtomicBool::new(false));

            assert_eq!(logger.stats().records(), 3);
            assert_eq!(logger.stats().acquisition_errors(), 0);
            assert!(records.lock().unwrap().iter().all(|r| (r.humidity - 50.0).abs() < 0.01));
            done(logger);
        }

        #[test]
        fn periodic_starts_once_and_records_every_cycle() {
            let mut expectations = vec![Transaction::write(ADDR, vec![0x21, 0x26])];
            for _ in 0..3 {
                expectations.push(Transaction::write(ADDR, vec![0xE0, 0x00]));
                expectations.push(Transaction::read(ADDR, reply(0x6666, 0x8000).to_vec()));
            }
            let mode = AcquisitionMode::periodic(Accuracy::Medium, 1.0).unwrap();
            let mut logger = Logger::new(driver(&expectations, mode), MemorySink::default(), config(3));
            logger.run(&AtomicBool::new(false));

            assert_eq!(logger.stats().records(), 3);
            assert_eq!(logger.stats().acquisition_errors(), 0);
            done(logger);
        }

        #[test]
        fn corrupted_reply_skips_one_cycle() {
            let mut expectations = Vec::new();
            for cycle in 1..=5 {
                let mut bytes = reply(0x6666, 0x8000);
                if cycle == 3 {
                    bytes[2] ^= 0x01;
                }
                expectations.push(Transaction::write(ADDR, vec![0x24, 0x16]));
                expectations.push(Transaction::read(ADDR, bytes.to_vec()));
            }
            let sht = driver(&expectations, AcquisitionMode::single_shot(Accuracy::Low));
            let mut logger = Logger::new(sht, MemorySink::default(), config(5));

            let outcomes: Vec<_> = (0..5).map(|_| logger.run_cycle()).collect();
            assert_eq!(outcomes[2], CycleOutcome::AcquisitionSkipped);
            assert_eq!(logger.stats().records(), 4);
            assert_eq!(logger.stats().acquisition_errors(), 1);
            done(logger);
        }
    }
}
