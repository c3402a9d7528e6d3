use std::io::{BufRead, BufReader};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use crate::drivers::{AcquireError, SampleSource, TickFault};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_owned(),
            baud_rate: 9600,
            read_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Exclusively owned serial connection to the sensing device.
///
/// The port is closed when the device is dropped.
pub struct SerialDevice {
    config: SerialConfig,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    pending: Vec<u8>,
}

impl SerialDevice {
    pub fn open(config: &SerialConfig) -> Result<Self, AcquireError> {
        let mut device = Self {
            config: config.clone(),
            reader: None,
            pending: Vec::new(),
        };
        device.reopen()?;
        log::info!(
            "Opened {} at {} baud (read timeout {} ms)",
            device.config.port,
            device.config.baud_rate,
            device.config.read_timeout_ms
        );
        Ok(device)
    }

    fn reopen(&mut self) -> Result<(), AcquireError> {
        // Close first: most platforms refuse a second handle on the same port.
        self.reader = None;
        self.pending.clear();
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(self.config.read_timeout())
            .open()?;
        port.clear(ClearBuffer::All)?;
        self.reader = Some(BufReader::new(port));
        Ok(())
    }
}

impl SampleSource for SerialDevice {
    fn reset(&mut self) -> Result<(), AcquireError> {
        log::debug!("Resetting {}", self.config.port);
        self.reopen()
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TickFault> {
        let reader = self.reader.as_mut().ok_or(TickFault::Disconnected)?;
        read_terminated_line(reader, &mut self.pending)
    }
}

impl Drop for SerialDevice {
    fn drop(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("Released {}", self.config.port);
        }
    }
}

/// Reads up to and including `\n`, returning the line without it.
///
/// Bytes of a line cut short by a timeout stay in `pending` and are completed
/// by the next call, so a slow line is never split into two readings.
pub fn read_terminated_line<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> Result<Vec<u8>, TickFault> {
    match reader.read_until(b'\n', pending) {
        Ok(0) if pending.is_empty() => Err(TickFault::Disconnected),
        Ok(_) => {
            if pending.last() == Some(&b'\n') {
                pending.pop();
            }
            Ok(std::mem::take(pending))
        }
        Err(e) => Err(e.into()),
    }
}
