//! A `log::Log` implementation writing to a 16550 serial port behind a
//! spinlock, exactly as the architectural template does it.

use core::fmt::Write;

use macros::init;
use sync::{Lazy, Spinlock};

use crate::serial::{Port, Serial};

static SERIAL: Lazy<Spinlock<Serial>> = Lazy::new(|| Spinlock::new(Serial::new(Port::COM1)));

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let level = match record.level() {
                log::Level::Error => "\x1b[1m\x1b[31m[!]\x1b[0m",
                log::Level::Warn => "\x1b[1m\x1b[33m[-]\x1b[0m",
                log::Level::Info => "\x1b[1m\x1b[32m[*]\x1b[0m",
                log::Level::Debug => "\x1b[1m\x1b[34m[#]\x1b[0m",
                log::Level::Trace => "\x1b[1m[~]\x1b[0m",
            };

            SERIAL
                .lock()
                .write_fmt(format_args!("{level} {}\n", record.args()))
                .unwrap();
        }
    }

    fn flush(&self) {}
}

/// Initializes the logger. Must be called before any other logging
/// function.
///
/// # Panics
/// Panics if the logger is already set.
#[init]
pub fn setup() {
    log::set_logger(&Logger).unwrap();
    log::set_max_level(log::LevelFilter::Trace);
}

/// Called when the kernel panics. Force-unlocks the serial port
/// because the panic handler can run while the serial port is locked,
/// which would otherwise deadlock and swallow the panic message.
#[cold]
pub fn on_panic() {
    unsafe {
        SERIAL.force_unlock();
    }
}
