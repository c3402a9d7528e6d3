// src/types.rs

/// One parsed reading and the tick at which it arrived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub tick: usize,
    pub value: f64,
}

/// Append-only series of readings, in acquisition order.
///
/// Tick indices are strictly increasing but may have gaps where a tick
/// produced no reading; `values()` is always gap-free.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleSequence {
    samples: Vec<Sample>,
}

impl SampleSequence {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, tick: usize, value: f64) {
        debug_assert!(
            self.samples.last().map_or(true, |s| s.tick < tick),
            "ticks must increase"
        );
        self.samples.push(Sample { tick, value });
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Points split wherever a tick was skipped, so a plot shows the gap.
    pub fn runs(&self) -> Vec<Vec<[f64; 2]>> {
        let mut runs: Vec<Vec<[f64; 2]>> = Vec::new();
        let mut prev_tick: Option<usize> = None;
        for s in &self.samples {
            let contiguous = prev_tick.map_or(false, |p| p + 1 == s.tick);
            match runs.last_mut() {
                Some(run) if contiguous => run.push([s.tick as f64, s.value]),
                _ => runs.push(vec![[s.tick as f64, s.value]]),
            }
            prev_tick = Some(s.tick);
        }
        runs
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

// 操作员输入的试验标识
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialId {
    pub person: String,
    pub trial_number: String,
    pub activity: String,
}

impl TrialId {
    pub fn new(
        person: impl Into<String>,
        trial_number: impl Into<String>,
        activity: impl Into<String>,
    ) -> Self {
        Self {
            person: person.into(),
            trial_number: trial_number.into(),
            activity: activity.into(),
        }
    }

    /// `{trial_number}-{person}-{activity}`, used for the plot file name and the log header.
    pub fn header(&self) -> String {
        format!("{}-{}-{}", self.trial_number, self.person, self.activity)
    }
}

/// One bounded acquisition tied to an operator-supplied identity.
#[derive(Clone, Debug)]
pub struct Trial {
    pub id: TrialId,
    pub samples: SampleSequence,
    pub rms: Option<f64>,
    pub am: Option<f64>,
    /// PNG snapshot of the final view.
    pub plot: Option<Vec<u8>>,
}

impl Trial {
    pub fn new(id: TrialId) -> Self {
        Self {
            id,
            samples: SampleSequence::default(),
            rms: None,
            am: None,
            plot: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rms.is_some() && self.am.is_some()
    }

    pub fn is_saveable(&self) -> bool {
        !self.samples.is_empty() && self.is_complete() && self.plot.is_some()
    }
}
