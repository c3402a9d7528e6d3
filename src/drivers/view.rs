use crate::types::SampleSequence;

/// What a live view sees after every tick.
#[derive(Clone, Copy, Debug)]
pub struct LiveFrame<'a> {
    pub samples: &'a SampleSequence,
    /// Ticks elapsed so far, including skipped ones.
    pub ticks_run: usize,
    pub tick_count: usize,
}

/// Receiver of the accumulated sequence, called once per tick.
pub trait Publish {
    fn publish(&mut self, frame: &LiveFrame<'_>);

    /// Returning `false` ends the run after the current tick.
    fn keep_running(&self) -> bool {
        true
    }
}

/// Headless progress reporting through the `log` facade.
pub struct LogView {
    every: usize,
}

impl LogView {
    /// Logs one progress line every `every` ticks.
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Publish for LogView {
    fn publish(&mut self, frame: &LiveFrame<'_>) {
        if frame.ticks_run % self.every != 0 && frame.ticks_run != frame.tick_count {
            return;
        }
        match frame.samples.last() {
            Some(last) => log::info!(
                "tick {}/{}: {} samples, latest {:.3} V",
                frame.ticks_run,
                frame.tick_count,
                frame.samples.len(),
                last.value
            ),
            None => log::info!(
                "tick {}/{}: no samples yet",
                frame.ticks_run,
                frame.tick_count
            ),
        }
    }
}
