// src/main.rs
mod config;
mod drivers;
mod gui;
mod recorder;
mod session;
mod types;
use std::fs;
use std::io;
use anyhow::Context;
use clap::Parser;
use config::{AppConfig, Args};
use drivers::{ManualSource, SampleSource, SerialDevice, SimulatedSource};
use session::Session;

// 模拟信号的频率 (Hz)
const SIMULATED_SIGNAL_HZ: f64 = 0.5;

// 入口函数
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = AppConfig::from_args(&args)?;

    // 整个进程只持有一个设备句柄，逐次试验传给采样器
    let device: Box<dyn SampleSource> = if config.simulate {
        log::info!("Using simulated signal at {SIMULATED_SIGNAL_HZ} Hz");
        Box::new(SimulatedSource::new(
            SIMULATED_SIGNAL_HZ / config.ticks_per_second as f64,
        ))
    } else if let Some(path) = &config.replay {
        let capture = fs::read_to_string(path)
            .with_context(|| format!("reading capture {}", path.display()))?;
        let source = ManualSource::from_capture(&capture);
        log::info!("Replaying {} readings from {}", source.remaining(), path.display());
        Box::new(source)
    } else {
        Box::new(
            SerialDevice::open(&config.serial)
                .with_context(|| format!("opening serial port {}", config.serial.port))?,
        )
    };

    let stdin = io::stdin();
    let mut session = Session::new(&config, device, stdin.lock(), io::stdout())?;
    session.run()
}
