use anyhow::{anyhow, bail, Context};
use crabcapture::capture::{CaptureContext, CaptureSupervisor};
use crabcapture::config::{CaptureConfig, DEFAULT_CODEC};
use crabcapture::events::{ChannelEventSink, FrameEvent};
use crabcapture::platform::{DeviceBackend, NokhwaBackend};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

const USAGE: &str = "Usage: crabcapture-cli <command> [args]

Commands:
  list-devices [--alternate] [--json]
  init-config <path>
  check-config <path>
  record <config> [--runs N] [--seconds S] [--events]";

fn main() -> anyhow::Result<()> {
    crabcapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "init-config" => cmd_init_config(&args),
        "check-config" => cmd_check_config(&args),
        "record" => cmd_record(&args),
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn cmd_list_devices(args: &[String]) -> anyhow::Result<()> {
    let alternate = args.iter().any(|a| a == "--alternate");
    let devices = NokhwaBackend::new().enumerate(alternate)?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string(&devices)?);
    } else if devices.is_empty() {
        println!("No cameras detected");
    } else {
        for d in devices {
            println!("{}: {}", d.id, d.name);
        }
    }
    Ok(())
}

fn cmd_init_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: crabcapture-cli init-config <path>"))?;
    if Path::new(path).exists() {
        bail!("{} already exists", path);
    }

    CaptureConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path);
    if !cfg!(feature = "recording") {
        println!(
            "Columns default to {}; build with --features recording for H.264 output",
            DEFAULT_CODEC
        );
    }
    Ok(())
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: crabcapture-cli check-config <path>"))?;

    let config = CaptureConfig::load_layered(path)
        .with_context(|| format!("Failed to load {}", path))?;
    config.validate()?;

    println!(
        "enabled: {}  timestamp: {:?}  output: {}",
        config.enabled,
        config.timestamp_position,
        config.output.run_prefix(1).display()
    );
    println!("index  width  height  decimation  display  codec");
    for c in &config.connections {
        println!(
            "{:>5}  {:>5}  {:>6}  {:>10}  {:>7}  {}",
            c.device_index, c.width, c.height, c.decimation, c.display, c.codec
        );
    }
    Ok(())
}

fn cmd_record(args: &[String]) -> anyhow::Result<()> {
    // record <config> [--runs N] [--seconds S] [--events]
    let mut config_path = None;
    let mut runs: u32 = 1;
    let mut seconds: f64 = 10.0;
    let mut print_events = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                runs = args.get(i).ok_or_else(|| anyhow!("--runs needs a value"))?.parse()?;
            }
            "--seconds" => {
                i += 1;
                seconds = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--seconds needs a value"))?
                    .parse()?;
            }
            "--events" => print_events = true,
            other => {
                if config_path.is_none() {
                    config_path = Some(other.to_string());
                }
            }
        }
        i += 1;
    }

    let config_path = config_path.ok_or_else(|| anyhow!("config path required"))?;
    let config = CaptureConfig::load_layered(&config_path)
        .with_context(|| format!("Failed to load {}", config_path))?;
    std::fs::create_dir_all(&config.output.directory)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    let (events, receiver) = ChannelEventSink::new();
    let ctx = CaptureContext::native().with_events(Arc::new(events));
    let mut supervisor = CaptureSupervisor::new(ctx);

    let connected = supervisor.configure_from(&config)?;
    if connected == 0 {
        println!("No cameras connected");
    }

    let run_length = run_length(seconds)?;
    for run in 1..=runs {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }

        let prefix = config.output.run_prefix(run);
        for (index, result) in supervisor.begin_recording(&prefix) {
            match result {
                Ok(path) => println!("Camera {} -> {}", index, path.display()),
                Err(e) => println!("Camera {} not recording: {}", index, e),
            }
        }

        let samples = pump_events(&receiver, run_length, &interrupted, |event| {
            if print_events {
                println!("{}", serde_json::to_string(event)?);
            }
            Ok(())
        })?;

        for (index, stats) in supervisor.end_recording() {
            println!(
                "Camera {}: {} frames, {:.1}s -> {}",
                index, stats.video_frames, stats.duration_secs, stats.output_path
            );
        }
        // Samples emitted between the deadline and end_recording belong to this run
        let late = receiver.try_iter().count();
        println!("Run {} finished with {} frame events", run, samples + late as u64);
    }

    supervisor.shutdown_all();
    Ok(())
}

fn run_length(seconds: f64) -> anyhow::Result<Duration> {
    if seconds <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| anyhow!("--seconds {} is not a usable run length: {}", seconds, e))
}

/// Count events until the run length elapses or the user interrupts
fn pump_events<F>(
    receiver: &Receiver<FrameEvent>,
    run_length: Duration,
    interrupted: &AtomicBool,
    mut on_event: F,
) -> anyhow::Result<u64>
where
    F: FnMut(&FrameEvent) -> anyhow::Result<()>,
{
    let started = Instant::now();
    let mut samples = 0u64;
    while started.elapsed() < run_length && !interrupted.load(Ordering::SeqCst) {
        while let Ok(event) = receiver.recv_timeout(Duration::from_millis(50)) {
            samples += 1;
            on_event(&event)?;
            if started.elapsed() >= run_length || interrupted.load(Ordering::SeqCst) {
                break;
            }
        }
    }
    Ok(samples)
}
