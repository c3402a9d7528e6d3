use std::thread;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use crate::drivers::{AcquireError, FaultKind, LiveFrame, Publish, SampleSource};
use crate::types::SampleSequence;

// 长时间试验不一次性预分配
const PREALLOC_TICKS: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultAction {
    /// Drop the tick and keep sampling.
    Skip,
    /// End the run with an error.
    Abort,
}

/// Per-kind reaction to a failed tick. Everything is skipped by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPolicy {
    pub timeout: FaultAction,
    pub io: FaultAction,
    pub decode: FaultAction,
    pub parse: FaultAction,
    pub disconnected: FaultAction,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            timeout: FaultAction::Skip,
            io: FaultAction::Skip,
            decode: FaultAction::Skip,
            parse: FaultAction::Skip,
            disconnected: FaultAction::Skip,
        }
    }
}

impl FaultPolicy {
    pub fn action(&self, kind: FaultKind) -> FaultAction {
        match kind {
            FaultKind::Timeout => self.timeout,
            FaultKind::Io => self.io,
            FaultKind::Decode => self.decode,
            FaultKind::Parse => self.parse,
            FaultKind::Disconnected => self.disconnected,
        }
    }
}

/// Count of skipped ticks per fault kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultTally {
    pub timeout: usize,
    pub io: usize,
    pub decode: usize,
    pub parse: usize,
    pub disconnected: usize,
}

impl FaultTally {
    fn record(&mut self, kind: FaultKind) {
        let slot = match kind {
            FaultKind::Timeout => &mut self.timeout,
            FaultKind::Io => &mut self.io,
            FaultKind::Decode => &mut self.decode,
            FaultKind::Parse => &mut self.parse,
            FaultKind::Disconnected => &mut self.disconnected,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.timeout + self.io + self.decode + self.parse + self.disconnected
    }
}

#[derive(Clone, Debug)]
pub struct AcquisitionReport {
    pub samples: SampleSequence,
    pub ticks_run: usize,
    pub tick_count: usize,
    pub faults: FaultTally,
    /// False when the view stopped the run before the tick budget was spent.
    pub completed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Sampled(f64),
    Skipped(FaultKind),
    Finished,
}

/// One run in progress, advanced a tick at a time.
///
/// `Sampler::run` drives it from a fixed-rate loop; a UI can drive it from
/// its own frame callback instead.
pub struct Acquisition<S: SampleSource> {
    source: S,
    policy: FaultPolicy,
    tick_count: usize,
    next_tick: usize,
    samples: SampleSequence,
    faults: FaultTally,
    stopped: bool,
}

impl<S: SampleSource> Acquisition<S> {
    pub fn step(&mut self, view: &mut dyn Publish) -> Result<TickOutcome, AcquireError> {
        if self.is_finished() {
            return Ok(TickOutcome::Finished);
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        let outcome = match self.source.next_reading() {
            Ok(value) => {
                self.samples.push(tick, value);
                TickOutcome::Sampled(value)
            }
            Err(fault) => {
                let kind = fault.kind();
                self.faults.record(kind);
                match self.policy.action(kind) {
                    FaultAction::Skip => {
                        log::trace!("tick {tick} skipped: {fault}");
                        TickOutcome::Skipped(kind)
                    }
                    FaultAction::Abort => {
                        self.stopped = true;
                        return Err(AcquireError::Aborted { tick, fault });
                    }
                }
            }
        };
        view.publish(&LiveFrame {
            samples: &self.samples,
            ticks_run: self.next_tick,
            tick_count: self.tick_count,
        });
        if !view.keep_running() {
            log::debug!("view stopped the run at tick {}", self.next_tick);
            self.stopped = true;
        }
        Ok(outcome)
    }

    pub fn is_finished(&self) -> bool {
        self.stopped || self.next_tick >= self.tick_count
    }

    /// Hands back the source together with what was acquired.
    pub fn finish(self) -> (S, AcquisitionReport) {
        let completed = self.next_tick >= self.tick_count;
        let report = AcquisitionReport {
            samples: self.samples,
            ticks_run: self.next_tick,
            tick_count: self.tick_count,
            faults: self.faults,
            completed,
        };
        (self.source, report)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerConfig {
    ticks_per_second: u32,
    fault_policy: FaultPolicy,
}

impl SamplerConfig {
    pub fn new(ticks_per_second: u32, fault_policy: FaultPolicy) -> Result<Self, AcquireError> {
        if ticks_per_second == 0 {
            return Err(AcquireError::InvalidTickRate);
        }
        Ok(Self {
            ticks_per_second,
            fault_policy,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second
    }

    pub fn tick_count(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.ticks_per_second as f64).round() as usize
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }
}

/// Fixed-rate, bounded acquisition over any [`SampleSource`].
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Resets `source` and prepares a run of `duration`. On a failed reset the
    /// source is handed back with the error.
    pub fn begin<S: SampleSource>(
        &self,
        duration: Duration,
        mut source: S,
    ) -> Result<Acquisition<S>, (S, AcquireError)> {
        if let Err(e) = source.reset() {
            return Err((source, e));
        }
        let tick_count = self.config.tick_count(duration);
        log::debug!(
            "starting run: {} ticks at {:?}",
            tick_count,
            self.config.tick_interval()
        );
        Ok(Acquisition {
            source,
            policy: self.config.fault_policy,
            tick_count,
            next_tick: 0,
            samples: SampleSequence::with_capacity(tick_count.min(PREALLOC_TICKS)),
            faults: FaultTally::default(),
            stopped: false,
        })
    }

    /// Runs `duration` worth of ticks, publishing the sequence to `view` after each one.
    pub fn run<S: SampleSource + ?Sized>(
        &self,
        duration: Duration,
        source: &mut S,
        view: &mut dyn Publish,
    ) -> Result<AcquisitionReport, AcquireError> {
        let mut acquisition = self.begin(duration, source).map_err(|(_, e)| e)?;
        let interval = self.config.tick_interval();
        let silent_limit = self.config.ticks_per_second as usize;
        let mut silent = 0usize;
        let mut deadline = Instant::now();
        while !acquisition.is_finished() {
            match acquisition.step(view)? {
                TickOutcome::Sampled(value) => {
                    log::trace!("read {value}");
                    silent = 0;
                }
                TickOutcome::Skipped(kind) => {
                    silent += 1;
                    if silent == silent_limit {
                        log::warn!("no reading for {silent} ticks (last fault: {kind:?})");
                    }
                }
                TickOutcome::Finished => break,
            }
            if acquisition.is_finished() {
                break;
            }
            deadline += interval;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                // Overran the slot; realign instead of bursting to catch up.
                deadline = now;
            }
        }
        let (_, report) = acquisition.finish();
        log::debug!(
            "run finished: {}/{} ticks, {} samples, {} skipped",
            report.ticks_run,
            report.tick_count,
            report.samples.len(),
            report.faults.total()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::ScriptedRead;
    use crate::drivers::{LiveFrame, ManualSource, TickFault};

    struct NullView;

    impl Publish for NullView {
        fn publish(&mut self, _frame: &LiveFrame<'_>) {}
    }

    fn fast_sampler(policy: FaultPolicy) -> Sampler {
        Sampler::new(SamplerConfig::new(1000, policy).unwrap())
    }

    /// Records every frame and optionally stops after `stop_after` ticks.
    struct Recorder {
        frames: Vec<(usize, usize)>,
        stop_after: Option<usize>,
    }

    impl Publish for Recorder {
        fn publish(&mut self, frame: &LiveFrame<'_>) {
            self.frames.push((frame.ticks_run, frame.samples.len()));
        }
        fn keep_running(&self) -> bool {
            match self.stop_after {
                Some(n) => self.frames.len() < n,
                None => true,
            }
        }
    }

    #[test]
    fn tick_budget_follows_duration_and_rate() {
        let config = SamplerConfig::new(10, FaultPolicy::default()).unwrap();
        assert_eq!(config.tick_count(Duration::from_secs(45)), 450);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert!(matches!(
            SamplerConfig::new(0, FaultPolicy::default()),
            Err(AcquireError::InvalidTickRate)
        ));
    }

    #[test]
    fn all_valid_ticks_fill_the_budget() {
        let mut source = ManualSource::new(["1", "2", "3", "4", "5"]);
        let report = fast_sampler(FaultPolicy::default())
            .run(Duration::from_millis(5), &mut source, &mut NullView)
            .unwrap();
        assert_eq!(report.tick_count, 5);
        assert_eq!(report.samples.values(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(report.completed);
        assert_eq!(source.resets(), 1);
    }

    #[test]
    fn malformed_line_skips_exactly_one_tick() {
        let mut source = ManualSource::new(["1.0", "abc", "3.0", "4.0"]);
        let report = fast_sampler(FaultPolicy::default())
            .run(Duration::from_millis(4), &mut source, &mut NullView)
            .unwrap();
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.faults.parse, 1);
        assert!(report.completed);
        // The skipped tick leaves a gap on the tick axis.
        let ticks: Vec<usize> = report.samples.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![0, 2, 3]);
    }

    #[test]
    fn silent_device_yields_empty_sequence() {
        let mut source = ManualSource::new(Vec::<ScriptedRead>::new());
        let report = fast_sampler(FaultPolicy::default())
            .run(Duration::from_millis(3), &mut source, &mut NullView)
            .unwrap();
        assert!(report.samples.is_empty());
        assert_eq!(report.ticks_run, 3);
        assert_eq!(report.faults.timeout, 3);
    }

    #[test]
    fn stale_bytes_are_discarded_before_the_first_tick() {
        let mut source = ManualSource::new(["1.0", "2.0"]).with_stale(["99", "99"]);
        let report = fast_sampler(FaultPolicy::default())
            .run(Duration::from_millis(2), &mut source, &mut NullView)
            .unwrap();
        assert_eq!(report.samples.values(), vec![1.0, 2.0]);
    }

    #[test]
    fn view_is_published_every_tick_and_can_stop_the_run() {
        let mut source = ManualSource::new(["1", "x", "3", "4", "5"]);
        let mut view = Recorder {
            frames: Vec::new(),
            stop_after: Some(3),
        };
        let report = fast_sampler(FaultPolicy::default())
            .run(Duration::from_millis(5), &mut source, &mut view)
            .unwrap();
        assert_eq!(view.frames, vec![(1, 1), (2, 1), (3, 2)]);
        assert_eq!(report.ticks_run, 3);
        assert!(!report.completed);
        assert!(report.samples.len() <= report.tick_count);
    }

    #[test]
    fn abort_policy_ends_the_run() {
        let policy = FaultPolicy {
            disconnected: FaultAction::Abort,
            ..FaultPolicy::default()
        };
        let mut source = ManualSource::new(vec![
            ScriptedRead::from("1.0"),
            ScriptedRead::TimedOut,
            ScriptedRead::Closed,
            ScriptedRead::from("4.0"),
        ]);
        let err = fast_sampler(policy)
            .run(Duration::from_millis(4), &mut source, &mut NullView)
            .unwrap_err();
        match err {
            AcquireError::Aborted { tick, fault } => {
                assert_eq!(tick, 2);
                assert!(matches!(fault, TickFault::Disconnected));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn long_runs_do_not_reserve_the_whole_budget() {
        let sampler = Sampler::new(SamplerConfig::new(10, FaultPolicy::default()).unwrap());
        let acquisition = sampler
            .begin(Duration::from_secs(86_400), ManualSource::new(["1"]))
            .map_err(|(_, e)| e)
            .unwrap();
        let (_, report) = acquisition.finish();
        assert_eq!(report.tick_count, 864_000);
        assert!(report.samples.capacity() < report.tick_count);
    }

    #[test]
    fn stepping_by_hand_matches_the_loop() {
        let sampler = fast_sampler(FaultPolicy::default());
        let mut acquisition = sampler
            .begin(Duration::from_millis(3), ManualSource::new(["0.5", "bad", "1.5"]))
            .map_err(|(_, e)| e)
            .unwrap();
        let mut view = NullView;
        assert_eq!(acquisition.step(&mut view).unwrap(), TickOutcome::Sampled(0.5));
        assert_eq!(
            acquisition.step(&mut view).unwrap(),
            TickOutcome::Skipped(FaultKind::Parse)
        );
        assert_eq!(acquisition.step(&mut view).unwrap(), TickOutcome::Sampled(1.5));
        assert!(acquisition.is_finished());
        assert_eq!(acquisition.step(&mut view).unwrap(), TickOutcome::Finished);
        let (source, report) = acquisition.finish();
        assert_eq!(source.resets(), 1);
        assert_eq!(report.samples.values(), vec![0.5, 1.5]);
    }
}
