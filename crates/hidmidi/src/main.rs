//! hidmidi - Map a joystick or gamepad control to MIDI
//!
//! Walks through device, control and port selection (or loads a saved
//! mapping), calibrates axes, then monitors the control until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

use hidmidi::{
    calibration::{Calibrator, ConsoleObserver},
    config::{self, MappingConfig, MessageKind},
    detector::ChangeDetector,
    engine::Engine,
    platform::{default_enumerator, DeviceEnumerator, DeviceInfo},
    prompt::Prompter,
    shutdown::QuitSignal,
    source::ProducerHandle,
    status::ConsoleStatus,
    transport::{list_output_ports, DummyTransport, MidiTransport, MidirTransport},
};

#[derive(Parser)]
#[command(name = "hidmidi")]
#[command(author, version, about = "Map a joystick or gamepad control to MIDI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Mapping file to load (skips the selection menu)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding mapping files (default: platform config directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Log MIDI messages instead of opening a port
    #[arg(long)]
    dry_run: bool,

    /// Minimum interval between MIDI sends in milliseconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Calibrate the axis again even if the mapping is calibrated
    #[arg(long)]
    recalibrate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List input devices with buttons or axes
    ListDevices,
    /// List the controls of a device (path or name)
    ListControls { device: String },
    /// List available MIDI output ports
    ListPorts,
    /// Show the mapping directory
    ConfigDir,
}

type ConsolePrompter = Prompter<io::StdinLock<'static>, io::Stdout>;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::ListDevices) => {
            let devices = default_enumerator()?.list_devices()?;
            if devices.is_empty() {
                println!("No input devices with buttons or axes found");
            }
            for device in devices {
                println!("  {}", device);
            }
            return Ok(());
        }
        Some(Commands::ListControls { device }) => {
            let enumerator = default_enumerator()?;
            let info = enumerator.find_device(device, device)?;
            println!("Controls of {}:", info);
            for control in enumerator.list_controls(&info)? {
                println!("  {}", control);
            }
            return Ok(());
        }
        Some(Commands::ListPorts) => {
            let ports = list_output_ports()?;
            if ports.is_empty() {
                println!("No MIDI output ports found");
            } else {
                println!("Available MIDI output ports:");
                for port in ports {
                    println!("  {}", port);
                }
            }
            return Ok(());
        }
        Some(Commands::ConfigDir) => {
            println!("{}", mapping_dir(&cli).display());
            return Ok(());
        }
        None => {}
    }

    run(cli)
}

fn mapping_dir(cli: &Cli) -> PathBuf {
    cli.dir.clone().unwrap_or_else(config::config_dir)
}

fn run(cli: Cli) -> Result<()> {
    // Handlers go in after the last prompt so Ctrl-C still terminates the wizard
    let quit = QuitSignal::new();
    let enumerator = default_enumerator()?;
    let mut prompter = Prompter::new(io::stdin().lock(), io::stdout()).with_quit(quit.clone());
    let dir = mapping_dir(&cli);

    // Step 1: load or create a mapping
    let (mut config, loaded_from) = match select_configuration(&cli, &dir, &mut prompter)? {
        Some((config, path)) => (config, Some(path)),
        None => (create_configuration(enumerator.as_ref(), cli.dry_run, &mut prompter)?, None),
    };

    let device = enumerator
        .find_device(&config.hid_device_path, &config.hid_device_name)
        .context("Reconnect the device or create a new mapping")?;
    config.hid_device_path = device.path.to_string_lossy().into_owned();

    if let Some(interval) = cli.interval {
        config.midi_send_interval_ms = interval.max(1);
    }

    if loaded_from.is_some() && !cli.dry_run {
        ensure_port(&mut config, &mut prompter)?;
    }

    let save_to = match &loaded_from {
        Some(path) => path.clone(),
        None => {
            let name = prompter.text(&format!(
                "\nEnter filename to save configuration (e.g., my_joystick_mapping{}):",
                config::CONFIG_EXTENSION
            ))?;
            save_path(&dir, &name)
        }
    };

    quit.register_handlers()?;

    // Step 2: MIDI output
    let transport: Box<dyn MidiTransport> = if cli.dry_run {
        Box::new(DummyTransport)
    } else {
        Box::new(MidirTransport::open(&config.midi_device_name)?)
    };

    // Step 3: start reading the control
    let producer = enumerator.open(&device, &config.control)?;
    let (producer_handle, stream) = ProducerHandle::spawn(producer, &quit)?;
    let mut detector = ChangeDetector::new();

    // Step 4: calibrate axes
    let needs_calibration = config.control.is_axis()
        && config.is_active()
        && (loaded_from.is_none() || cli.recalibrate || !config.calibration_done);
    if needs_calibration {
        println!("\n--- Calibrate Axis ---");
        println!("Calibrating: {}", config.control.name);
        println!(
            "Axis Hardware Logical Range: {} to {}",
            config.control.logical_min, config.control.logical_max
        );
        let mut observer = ConsoleObserver::new(io::stdout());
        Calibrator::new(&stream, &mut detector, &quit)
            .run(&mut config, &mut observer)
            .context("Calibration failed or was aborted")?;
    }

    // Step 5: save
    if loaded_from.is_none() {
        let written = config.save(&save_to)?;
        println!("Configuration saved to {}", written.display());
    } else if needs_calibration {
        config.save(&save_to)?;
        println!("Calibration saved to {}", save_to.display());
    }

    // Step 6: monitor
    println!("\n--- Monitoring ---");
    println!("{}", config.summary());
    if !config.is_active() {
        log::warn!("No active mapping, nothing will be sent");
    }
    println!("\nPress Ctrl+C to exit.\n");

    let mut engine = Engine::with_detector(config, transport, stream, quit.clone(), detector);
    let result = {
        let mut status = ConsoleStatus::new()?;
        engine.run(&mut status)
    };
    println!("\nExiting monitoring loop...");
    producer_handle.stop()?;

    let stats = result?;
    log::info!("Sent {} MIDI messages", stats.sent);
    Ok(())
}

/// Load the mapping named on the command line, or let the user pick one.
/// Returns `None` when a new mapping should be created.
fn select_configuration(
    cli: &Cli,
    dir: &Path,
    prompter: &mut ConsolePrompter,
) -> Result<Option<(MappingConfig, PathBuf)>> {
    if let Some(path) = &cli.config {
        let config = MappingConfig::load(path)?;
        println!("Loaded configuration: {}", path.display());
        return Ok(Some((config, path.clone())));
    }

    let files = config::list_configurations(dir);
    if files.is_empty() {
        return Ok(None);
    }

    let mut items = vec!["Create New Configuration".to_string()];
    items.extend(files.iter().map(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }));
    let choice = prompter.choose("--- Load Configuration ---", &items)?;
    if choice == 0 {
        return Ok(None);
    }

    let path = &files[choice - 1];
    match MappingConfig::load(path) {
        Ok(config) => Ok(Some((config, path.clone()))),
        Err(e) => {
            log::warn!("Failed to load {}: {}", path.display(), e);
            println!("Could not load that configuration, creating a new one.");
            Ok(None)
        }
    }
}

/// Interactive creation of a new mapping
fn create_configuration(
    enumerator: &dyn DeviceEnumerator,
    dry_run: bool,
    prompter: &mut ConsolePrompter,
) -> Result<MappingConfig> {
    let devices = enumerator.list_devices()?;
    if devices.is_empty() {
        anyhow::bail!("No input devices with buttons or axes found");
    }
    let device: &DeviceInfo = &devices[prompter.choose("--- Select Input Device ---", &display(&devices))?];

    let controls = enumerator.list_controls(device)?;
    if controls.is_empty() {
        anyhow::bail!("{} has no usable buttons or axes", device.name);
    }
    let control = controls[prompter.choose("--- Select Control ---", &display(&controls))?].clone();

    let port = if dry_run {
        "dry-run".to_string()
    } else {
        select_port(prompter)?
    };

    let mut config = MappingConfig::new(
        device.path.to_string_lossy(),
        device.name.clone(),
        control,
        port,
    );
    configure_mapping(&mut config, prompter)?;
    Ok(config)
}

fn display<T: std::fmt::Display>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn select_port(prompter: &mut ConsolePrompter) -> Result<String> {
    let ports = list_output_ports()?;
    if ports.is_empty() {
        anyhow::bail!("No MIDI output ports found");
    }
    let index = prompter.choose("--- Select MIDI Output Port ---", &ports)?;
    Ok(ports[index].clone())
}

/// Make sure the configured port exists, asking for another one if not
fn ensure_port(config: &mut MappingConfig, prompter: &mut ConsolePrompter) -> Result<()> {
    let ports = list_output_ports()?;
    if ports.iter().any(|port| *port == config.midi_device_name) {
        return Ok(());
    }
    log::warn!("Configured MIDI output port '{}' not found", config.midi_device_name);
    prompter.say(&format!(
        "Configured MIDI Output port '{}' not found. Please select an available port.",
        config.midi_device_name
    ))?;
    config.midi_device_name = select_port(prompter)?;
    println!("Using newly selected MIDI port: {}", config.midi_device_name);
    Ok(())
}

/// Ask for the message kind and its parameters
fn configure_mapping(config: &mut MappingConfig, prompter: &mut ConsolePrompter) -> Result<()> {
    println!("\n--- Configure MIDI Mapping ---");
    println!("Mapping Control: {}", config.control.name);

    let kind = if config.control.is_button() {
        let items = ["Note On/Off", "CC (Control Change)"];
        match prompter.choose("Select MIDI message type for Button:", &items)? {
            0 => MessageKind::NoteOnOff,
            _ => MessageKind::ControlChange,
        }
    } else {
        println!("Mapping Axis/Value to MIDI CC.");
        MessageKind::ControlChange
    };
    config.midi_message_type = Some(kind);
    config.midi_channel = (prompter.number("Enter MIDI Channel (1-16):", 1, 16)? - 1) as u8;

    match kind {
        MessageKind::NoteOnOff => {
            config.midi_note_or_cc_number = prompter.midi_value("Enter MIDI Note Number (0-127):", 0)?;
            config.midi_value_note_on_velocity = prompter.midi_value("Enter Note On Velocity (1-127):", 1)?;
        }
        MessageKind::ControlChange => {
            config.midi_note_or_cc_number = prompter.midi_value("Enter MIDI CC Number (0-127):", 0)?;
            if config.control.is_button() {
                config.midi_value_cc_on = prompter.midi_value("Enter CC Value when Button Pressed (0-127):", 0)?;
                config.midi_value_cc_off = prompter.midi_value("Enter CC Value when Button Released (0-127):", 0)?;
            } else {
                config.reverse_axis = prompter.yes_no("Reverse MIDI output? (0=No: Min->0, Max->127 / 1=Yes):")?;
            }
        }
    }
    Ok(())
}

/// Resolve a filename typed by the user against the mapping directory
fn save_path(dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

