use std::io;
use thiserror::Error;

/// Coarse classification of a failed tick, used to pick a [`crate::drivers::sampler::FaultAction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Timeout,
    Io,
    Decode,
    Parse,
    Disconnected,
}

/// Why a single tick produced no reading.
#[derive(Debug, Error)]
pub enum TickFault {
    #[error("no complete line within the read timeout")]
    Timeout,
    #[error("serial read failed: {0}")]
    Io(#[source] io::Error),
    #[error("line is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    #[error("`{line}` is not a number")]
    Parse { line: String },
    #[error("device closed the stream")]
    Disconnected,
}

impl TickFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            TickFault::Timeout => FaultKind::Timeout,
            TickFault::Io(_) => FaultKind::Io,
            TickFault::Decode(_) => FaultKind::Decode,
            TickFault::Parse { .. } => FaultKind::Parse,
            TickFault::Disconnected => FaultKind::Disconnected,
        }
    }
}

impl From<io::Error> for TickFault {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TickFault::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => TickFault::Disconnected,
            _ => TickFault::Io(value),
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("tick rate must be greater than zero")]
    InvalidTickRate,
    #[error("serial device error: {0}")]
    Device(#[from] serialport::Error),
    #[error("tick {tick} aborted the run: {fault}")]
    Aborted { tick: usize, fault: TickFault },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("cannot summarize an empty sample sequence")]
    EmptySequence,
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to render plot: {0}")]
    Render(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PlotError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(format!("{value:?}"))
    }
}

impl From<image::ImageError> for PlotError {
    fn from(value: image::ImageError) -> Self {
        PlotError::Render(value.to_string())
    }
}
