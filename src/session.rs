// src/session.rs
use std::io::{BufRead, Write};
use std::time::Duration;
use anyhow::{anyhow, bail, Context, Result};
use crate::config::AppConfig;
use crate::drivers::{
    render_trial_png, summarize, Acquisition, AcquisitionReport, LogView, PlotStyle,
    SampleSource, Sampler,
};
use crate::gui::{self, WatchError};
use crate::recorder::{RecordError, TrialRecorder};
use crate::types::{Trial, TrialId};

type Device = Box<dyn SampleSource>;

/// Shows a run and hands the acquisition back; `gui::watch` outside tests.
type Watch = fn(
    Acquisition<Device>,
    Duration,
    &str,
) -> (Option<Acquisition<Device>>, Result<(), WatchError>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveMode {
    Window,
    Headless,
}

/// Operator-paced loop: prompt, acquire, summarize, optionally save.
pub struct Session<R: BufRead, W: Write> {
    input: R,
    output: W,
    device: Option<Device>,
    sampler: Sampler,
    duration: Duration,
    recorder: TrialRecorder,
    style: PlotStyle,
    live: LiveMode,
    watch: Watch,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(
        config: &AppConfig,
        device: Box<dyn SampleSource>,
        input: R,
        output: W,
    ) -> Result<Self> {
        let live = if config.live_window {
            LiveMode::Window
        } else {
            LiveMode::Headless
        };
        Ok(Self {
            input,
            output,
            device: Some(device),
            sampler: Sampler::new(config.sampler_config()?),
            duration: config.trial_duration(),
            recorder: TrialRecorder::new(&config.data_file, &config.graphs_dir),
            style: PlotStyle::default(),
            live,
            watch: gui::watch::<Device>,
        })
    }

    /// Serves trials until the operator's input ends.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let Some(id) = self.prompt_trial()? else {
                log::info!("Input closed, ending session");
                return Ok(());
            };
            if let Err(e) = self.run_trial(id) {
                if self.device.is_none() {
                    return Err(e.context("serial device is no longer available"));
                }
                log::error!("{e:#}");
                writeln!(self.output, "Trial abandoned: {e:#}")?;
            }
        }
    }

    // 每次试验前的三个问题
    fn prompt_trial(&mut self) -> Result<Option<TrialId>> {
        let Some(person) = self.prompt("\n\nPerson's name: ")? else {
            return Ok(None);
        };
        let Some(activity) = self.prompt("Activity: ")? else {
            return Ok(None);
        };
        let Some(trial_number) = self.prompt("Trial number: ")? else {
            return Ok(None);
        };
        if self.prompt("Press enter to begin")?.is_none() {
            return Ok(None);
        }
        Ok(Some(TrialId::new(person, trial_number, activity)))
    }

    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_owned()))
    }

    fn run_trial(&mut self, id: TrialId) -> Result<()> {
        let header = id.header();
        log::info!("Starting trial {header}");
        let mut trial = Trial::new(id);

        let report = self.acquire(&header)?;
        log::info!(
            "Trial {header}: {} samples over {}/{} ticks",
            report.samples.len(),
            report.ticks_run,
            report.tick_count
        );
        if report.faults.total() > 0 {
            log::debug!("Trial {header}: skipped ticks {:?}", report.faults);
        }
        if !report.completed {
            log::info!("Trial {header} ended early");
        }
        trial.samples = report.samples;

        match render_trial_png(&trial.samples, report.tick_count, &header, &self.style) {
            Ok(png) => trial.plot = Some(png),
            Err(e) => log::warn!("Trial {header}: {e}"),
        }

        let summary = summarize(&trial.samples.values())
            .with_context(|| format!("summarizing trial {header}"))?;
        log::debug!("Trial {header}: statistics over {} samples", summary.count);
        trial.rms = Some(summary.rms);
        trial.am = Some(summary.am);
        writeln!(self.output, "\nRMS:{:?}", summary.rms)?;
        writeln!(self.output, "AM:{:?}", summary.am)?;

        let answer = self.prompt("Save data? (y/n) ")?;
        if answer.as_deref() == Some("y") {
            match self.recorder.save(&trial) {
                Ok(saved) => {
                    log::info!(
                        "Saved {header} to {} and {}",
                        saved.plot_path.display(),
                        saved.data_file.display()
                    );
                    writeln!(self.output, "saved")?;
                }
                Err(RecordError::Incomplete(_)) => writeln!(self.output, "not saved")?,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn acquire(&mut self, title: &str) -> Result<AcquisitionReport> {
        match self.live {
            LiveMode::Headless => {
                let device = self
                    .device
                    .as_mut()
                    .ok_or_else(|| anyhow!("no device handle"))?;
                let every = self.sampler.config().ticks_per_second() as usize;
                let report = self
                    .sampler
                    .run(self.duration, device, &mut LogView::new(every))?;
                Ok(report)
            }
            LiveMode::Window => {
                let device = self
                    .device
                    .take()
                    .ok_or_else(|| anyhow!("no device handle"))?;
                let acquisition = match self.sampler.begin(self.duration, device) {
                    Ok(acquisition) => acquisition,
                    Err((device, e)) => {
                        self.device = Some(device);
                        return Err(e.into());
                    }
                };
                let interval = self.sampler.config().tick_interval();
                let (acquisition, outcome) = (self.watch)(acquisition, interval, title);
                let Some(acquisition) = acquisition else {
                    bail!("live window did not hand back the device");
                };
                let (device, report) = acquisition.finish();
                self.device = Some(device);
                match outcome {
                    Ok(()) => Ok(report),
                    Err(WatchError::Window(reason)) => {
                        log::warn!("{reason}; falling back to headless mode");
                        self.live = LiveMode::Headless;
                        if report.ticks_run > 0 {
                            bail!("live window closed unexpectedly: {reason}");
                        }
                        self.acquire(title)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
