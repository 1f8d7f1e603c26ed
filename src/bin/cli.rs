//! BeamCam Calibrate - interactive camera calibration driver
//!
//! Talks to a Mr Beam machine and walks the operator through the four
//! corner clicks.
//! Run with: cargo run --bin beamcam-calibrate

use beamcam_calibration::{
    CalibrationCommand, CalibrationRunner, CalibrationSettings, CalibrationStateMachine,
    HttpBackend, PluginMessage, RunnerConfig,
};
use std::env;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  start                     begin a calibration session
  next | prev               move between steps
  click <xrel> <yrel>       click at a fraction of the picture
  clickimg <x> <y>          click at an image pixel
  zoom in|out, pan <dx> <dy>, resetpan
  picture raw|lens|cropped  switch the displayed picture
  capture                   request a new lens-corrected picture
  continue                  capture and move to the next setup page
  submit                    upload the four corners
  abort                     cancel the session
  generate                  generate the marker SVG
  engrave <intensity> <feedrate>
  settings                  the calibration page was opened
  event <json>              feed a raw push message
  status                    print the session as JSON
  save                      write the current settings file
  quit | exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = CalibrationSettings::load().apply_env(|key| env::var(key).ok());

    let startup_capture = env::var("BEAMCAM_STARTUP_CAPTURE")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(settings.initial_calibration);
    let command_buffer: usize = env::var("BEAMCAM_COMMAND_BUFFER")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(32);

    println!("📷 BeamCam Calibration");
    println!("================================================");
    println!("Machine: {}", settings.base_url);
    println!(
        "Mode: {}",
        if settings.initial_calibration {
            "first-run setup"
        } else {
            "settings"
        }
    );
    println!("Lid gating: {}", settings.require_lid_open);
    println!("Retries: {} (delay {}s)", settings.max_retries, settings.retry_delay);
    if let Some(path) = CalibrationSettings::settings_path() {
        println!("Settings: {}", path.display());
    }
    println!("================================================\n");

    let machine = CalibrationStateMachine::new(settings.to_session_config());
    let backend = HttpBackend::new(settings.to_backend_config());
    let config = RunnerConfig::default()
        .with_command_buffer(command_buffer)
        .with_startup_capture(startup_capture);

    let handle = CalibrationRunner::new(machine, backend, config)
        .with_notice_callback(|notice| println!("{}", notice.format_display()))
        .run();

    println!("Type 'help' for commands, 'quit' or 'exit' to stop.\n");

    let stdin = io::stdin();
    loop {
        print!("🎯 Command: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => break,
            "help" => {
                println!("{}", HELP);
                continue;
            }
            "status" => {
                println!("{}", serde_json::to_string_pretty(&handle.snapshot())?);
                continue;
            }
            "save" => {
                match settings.save() {
                    Ok(()) => println!("💾 Settings saved"),
                    Err(e) => eprintln!("❌ {}", e),
                }
                continue;
            }
            _ => {}
        }

        if let Some(json) = input.strip_prefix("event ") {
            match PluginMessage::from_json(json) {
                Ok(message) => handle.send_message(message).await?,
                Err(e) => eprintln!("❌ Invalid event: {}", e),
            }
            continue;
        }

        match input.parse::<CalibrationCommand>() {
            Ok(command) => handle.send_command(command).await?,
            Err(e) => eprintln!("❌ {}", e),
        }
    }

    handle.stop().await?;
    println!("Goodbye! 👋");

    Ok(())
}
