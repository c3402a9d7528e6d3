// src/gui.rs
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use eframe::egui;
use egui::Color32;
use egui_plot::{Line, Plot, PlotPoints};
use crate::drivers::plot::{X_LABEL, Y_LABEL};
use crate::drivers::{AcquireError, Acquisition, LiveFrame, Publish, SampleSource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The window could not be created, e.g. no display is available.
    #[error("live window failed: {0}")]
    Window(String),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
}

// 采集状态在窗口关闭后要交还给会话
struct LiveRun<S: SampleSource> {
    acquisition: Option<Acquisition<S>>,
    failure: Option<AcquireError>,
}

/// Plot data, refreshed by the sampler after every tick.
#[derive(Default)]
struct PlotBuffer {
    runs: Vec<Vec<[f64; 2]>>,
    ticks_run: usize,
    tick_count: usize,
    samples: usize,
    latest: Option<f64>,
}

impl Publish for PlotBuffer {
    fn publish(&mut self, frame: &LiveFrame<'_>) {
        self.runs = frame.samples.runs();
        self.ticks_run = frame.ticks_run;
        self.tick_count = frame.tick_count;
        self.samples = frame.samples.len();
        self.latest = frame.samples.last().map(|s| s.value);
    }
}

struct LiveWindow<S: SampleSource> {
    shared: Rc<RefCell<LiveRun<S>>>,
    interval: Duration,
    next_tick: Instant,
    plot: PlotBuffer,
    title: String,
}

impl<S: SampleSource> LiveWindow<S> {
    fn status_line(&self, finished: bool, failed: Option<&str>) -> String {
        if let Some(reason) = failed {
            return format!("Stopped: {reason}. Close the window to continue.");
        }
        let latest = self
            .plot
            .latest
            .map_or_else(|| "-".to_owned(), |v| format!("{v:.3} V"));
        let head = format!(
            "Tick {}/{} | {} samples | latest {}",
            self.plot.ticks_run, self.plot.tick_count, self.plot.samples, latest
        );
        if finished {
            format!("{head} | done, close the window to continue")
        } else {
            head
        }
    }
}

impl<S: SampleSource> eframe::App for LiveWindow<S> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 到点就采一个样
        let (finished, failed) = {
            let mut run = self.shared.borrow_mut();
            let LiveRun {
                acquisition,
                failure,
            } = &mut *run;
            let now = Instant::now();
            if let Some(acquisition) = acquisition.as_mut() {
                if failure.is_none() && !acquisition.is_finished() && now >= self.next_tick {
                    if let Err(e) = acquisition.step(&mut self.plot) {
                        log::error!("{e}");
                        *failure = Some(e);
                    }
                    self.next_tick += self.interval;
                    if self.next_tick < now {
                        self.next_tick = now;
                    }
                }
            }
            (
                acquisition.as_ref().map_or(true, Acquisition::is_finished),
                failure.as_ref().map(|e| e.to_string()),
            )
        };

        // 2. 重画整条曲线
        let status = self.status_line(finished, failed.as_deref());
        let x_max = self.plot.tick_count.max(1) as f64;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(&self.title);
            ui.label(status);
            Plot::new("live-trial")
                .allow_drag(false)
                .allow_zoom(false)
                .allow_scroll(false)
                .x_axis_label(X_LABEL)
                .y_axis_label(Y_LABEL)
                .include_x(0.0)
                .include_x(x_max)
                .show(ui, |plot_ui| {
                    for run in &self.plot.runs {
                        plot_ui.line(
                            Line::new(PlotPoints::from(run.clone()))
                                .color(Color32::from_rgb(0x00, 0x8f, 0xd5))
                                .width(1.5),
                        );
                    }
                });
        });

        if !finished && failed.is_none() {
            ctx.request_repaint_after(self.next_tick.saturating_duration_since(Instant::now()));
        }
    }
}

/// Shows the run in a window, sampling from the UI loop once per `interval`.
///
/// Blocks until the operator closes the window; closing it early leaves the
/// run unfinished. The acquisition is handed back alongside the outcome so the
/// source survives a failed window.
pub fn watch<S: SampleSource + 'static>(
    acquisition: Acquisition<S>,
    interval: Duration,
    title: &str,
) -> (Option<Acquisition<S>>, Result<(), WatchError>) {
    let shared = Rc::new(RefCell::new(LiveRun {
        acquisition: Some(acquisition),
        failure: None,
    }));
    let app_state = Rc::clone(&shared);
    let app_title = title.to_owned();

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([960.0, 540.0])
        .with_min_inner_size([480.0, 320.0])
        .with_title(title);
    let options = eframe::NativeOptions {
        viewport,
        run_and_return: true,
        ..Default::default()
    };
    let outcome = eframe::run_native(
        "trialscope",
        options,
        Box::new(move |_cc| {
            Box::new(LiveWindow {
                shared: app_state,
                interval,
                next_tick: Instant::now(),
                plot: PlotBuffer::default(),
                title: app_title,
            })
        }),
    )
    .map_err(|e| WatchError::Window(e.to_string()));

    let mut run = shared.borrow_mut();
    let result = match (outcome, run.failure.take()) {
        (Err(e), _) => Err(e),
        (Ok(()), Some(failure)) => Err(WatchError::Acquire(failure)),
        (Ok(()), None) => Ok(()),
    };
    let acquisition = run.acquisition.take();
    (acquisition, result)
}
