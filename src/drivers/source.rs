use std::collections::VecDeque;
use std::f64::consts::TAU;
use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::drivers::{AcquireError, TickFault};

/// Something that yields one text line per read, e.g. a serial device.
pub trait SampleSource {
    /// Closes and reopens the source, dropping anything buffered from a previous run.
    fn reset(&mut self) -> Result<(), AcquireError>;
    /// Reads one raw line, without its terminator.
    fn read_line(&mut self) -> Result<Vec<u8>, TickFault>;

    fn next_reading(&mut self) -> Result<f64, TickFault> {
        parse_reading(self.read_line()?)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn reset(&mut self) -> Result<(), AcquireError> {
        (**self).reset()
    }
    fn read_line(&mut self) -> Result<Vec<u8>, TickFault> {
        (**self).read_line()
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn reset(&mut self) -> Result<(), AcquireError> {
        (**self).reset()
    }
    fn read_line(&mut self) -> Result<Vec<u8>, TickFault> {
        (**self).read_line()
    }
}

/// UTF-8 decode, trim, parse.
pub fn parse_reading(raw: Vec<u8>) -> Result<f64, TickFault> {
    let text = String::from_utf8(raw)?;
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|_| TickFault::Parse {
        line: trimmed.to_owned(),
    })
}

/// One scripted read for [`ManualSource`].
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    Line(Vec<u8>),
    #[cfg_attr(not(test), allow(dead_code))]
    TimedOut,
    #[cfg_attr(not(test), allow(dead_code))]
    Closed,
}

impl From<&str> for ScriptedRead {
    fn from(value: &str) -> Self {
        ScriptedRead::Line(value.as_bytes().to_vec())
    }
}

impl From<String> for ScriptedRead {
    fn from(value: String) -> Self {
        ScriptedRead::Line(value.into_bytes())
    }
}

/// In-memory source useful for tests and deterministic playback.
///
/// Reads queued with [`ManualSource::with_stale`] play the role of bytes left
/// over from an earlier trial and are dropped by `reset`. Once the script runs
/// out every read times out.
pub struct ManualSource {
    stale: VecDeque<ScriptedRead>,
    queue: VecDeque<ScriptedRead>,
    resets: usize,
}

impl ManualSource {
    pub fn new<I, R>(reads: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedRead>,
    {
        Self {
            stale: VecDeque::new(),
            queue: reads.into_iter().map(Into::into).collect(),
            resets: 0,
        }
    }

    #[cfg(test)]
    pub fn with_stale<I, R>(mut self, reads: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedRead>,
    {
        self.stale = reads.into_iter().map(Into::into).collect();
        self
    }

    /// Replays a capture file, one reading per line.
    pub fn from_capture(text: &str) -> Self {
        Self::new(text.lines().map(str::to_owned))
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn remaining(&self) -> usize {
        self.stale.len() + self.queue.len()
    }
}

impl SampleSource for ManualSource {
    fn reset(&mut self) -> Result<(), AcquireError> {
        self.stale.clear();
        self.resets += 1;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TickFault> {
        let next = self.stale.pop_front().or_else(|| self.queue.pop_front());
        match next {
            Some(ScriptedRead::Line(bytes)) => Ok(bytes),
            Some(ScriptedRead::Closed) => Err(TickFault::Disconnected),
            Some(ScriptedRead::TimedOut) | None => Err(TickFault::Timeout),
        }
    }
}

/// Synthetic sensor: a slow sine with noise, printed the way the firmware
/// prints readings, with an occasional corrupt line.
pub struct SimulatedSource {
    rng: StdRng,
    phase: f64,
    step: f64,
    reads: u64,
    glitch_every: u64,
}

impl SimulatedSource {
    pub const OFFSET_V: f64 = 2.5;
    pub const AMPLITUDE_V: f64 = 1.5;
    pub const NOISE_V: f64 = 0.1;

    /// `cycles_per_read` sets the sine frequency relative to the read rate.
    pub fn new(cycles_per_read: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            phase: 0.0,
            step: TAU * cycles_per_read,
            reads: 0,
            glitch_every: 40,
        }
    }

    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Every `n`th read yields a corrupt line; `0` disables glitches.
    #[cfg(test)]
    pub fn with_glitch_every(mut self, n: u64) -> Self {
        self.glitch_every = n;
        self
    }
}

impl SampleSource for SimulatedSource {
    fn reset(&mut self) -> Result<(), AcquireError> {
        self.phase = 0.0;
        self.reads = 0;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TickFault> {
        self.reads += 1;
        if self.glitch_every > 0 && self.reads % self.glitch_every == 0 {
            return Ok(b"\xff\xfe1.2".to_vec());
        }
        let noise = self.rng.gen_range(-Self::NOISE_V..Self::NOISE_V);
        let value = Self::OFFSET_V + Self::AMPLITUDE_V * self.phase.sin() + noise;
        self.phase = (self.phase + self.step) % TAU;
        Ok(format!("{value:.2}\r").into_bytes())
    }
}
