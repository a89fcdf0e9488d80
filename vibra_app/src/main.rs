mod cli;
mod commands;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vibra_backend::audio_device::{CpalHost, DeviceLifecycleController, print_device_list};
use vibra_backend::rt_processing::WaveformGenerator;
use vibra_core::HarnessConfig;

use cli::Cli;
use commands::{Command, MENU};

type Controller = DeviceLifecycleController<CpalHost, WaveformGenerator>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    if cli.list_devices {
        let devices = CpalHost::output_devices().context("enumerate output devices")?;
        print_device_list(&devices);
        return Ok(());
    }

    let config = load_config(&cli)?;
    tracing::info!(
        tone_hz = config.tone.signal_frequency_hz,
        format = %config.output,
        reinit_policy = %config.lifecycle.reinit_policy,
        "starting tone harness"
    );

    let host = CpalHost::new(config.output.device.clone());
    let mut controller = DeviceLifecycleController::from_config(host, &config);
    controller.start().context("start audio output")?;
    if let Some(device) = controller.host().device_info() {
        tracing::info!(
            %device,
            reinit_policy = %controller.reinit_policy(),
            "playing"
        );
    }

    let loop_result = run_command_loop(&mut controller);

    tracing::info!(
        stats = %controller.slot().stats(),
        playback_secs = controller.slot().playback_time(),
        silent_frames = controller.slot().with_adapter(|adapter| adapter.silent_frames()),
        "fill callback counters"
    );
    if let Err(err) = controller.shutdown() {
        tracing::warn!(%err, "audio shutdown incomplete");
    }
    println!("Bye");
    loop_result
}

fn init_tracing(directives: Option<&str>) {
    let filter = match directives {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(device) = &cli.device {
        config.output.device = Some(device.clone());
    }
    if let Some(policy) = cli.reinit_policy {
        config.lifecycle.reinit_policy = policy.into();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_command_loop(controller: &mut Controller) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{MENU}> ");
        io::stdout().flush().context("write prompt")?;

        // End of input quits like `q`.
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("read command")?;

        report_stream_faults(controller);

        let Some(command) = Command::parse(&line) else {
            continue;
        };

        let outcome = match command {
            Command::Quit => return Ok(()),
            Command::Reinit => controller.reinitialize().map(|stream| {
                println!("Reinitialized: now playing on {stream}");
            }),
            Command::FullRestart => controller.full_restart().map(|stream| {
                println!("Audio subsystem restarted: now playing on {stream}");
            }),
            Command::Breakpoint => {
                tracing::info!("breakpoint requested");
                debug_break();
                Ok(())
            }
        };

        if let Err(err) = outcome {
            tracing::error!(?command, state = %controller.state(), %err, "transition failed");
            println!("Error: {err}");
        }
    }
}

fn report_stream_faults(controller: &Controller) {
    for fault in controller.host().drain_faults() {
        tracing::warn!(stream = %fault.stream, message = %fault.message, "audio stream fault");
    }
}

/// Stop point for the `d` command. Set a debugger breakpoint on
/// `debug_break`; without one the command only logs.
#[inline(never)]
fn debug_break() {
    std::hint::black_box(());
}
