// src/drivers/mod.rs
// 采集核心：信号源、采样器、统计、绘图
pub mod error;
pub mod plot;
pub mod sampler;
pub mod serial;
pub mod source;
pub mod summary;
pub mod view;
// 公开导出常用类型，方便外部调用
pub use error::{AcquireError, FaultKind, SummaryError, TickFault};
pub use plot::{render_trial_png, PlotStyle};
pub use sampler::{Acquisition, AcquisitionReport, FaultPolicy, Sampler, SamplerConfig};
pub use serial::{SerialConfig, SerialDevice};
pub use source::{ManualSource, SampleSource, SimulatedSource};
pub use summary::summarize;
pub use view::{LiveFrame, LogView, Publish};
