use std::path::PathBuf;

use midirec_lib::config::{default_config_path, Config};
use midirec_lib::devices::enumerate_midi_devices;

const USAGE: &str = "\
Usage: midirec [OPTIONS]

Options:
  --config <path>    Config file (default: <config dir>/midirec/config.toml)
  --storage <dir>    Directory for recordings (overrides config)
  --bind <addr>      Listen address, e.g. 0.0.0.0:5000 (overrides config)
  --list-devices     Print MIDI input devices and exit
  --write-config     Write the effective config to the config path and exit
  --help             Show this message";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    midirec_lib::init_logging();

    let config_path = value_of("--config")
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let mut config = Config::load_or_default(&config_path);

    if let Some(storage) = value_of("--storage") {
        config.storage_path = PathBuf::from(storage);
    }
    if let Some(bind) = value_of("--bind") {
        config.bind_address = bind;
    }

    if args.iter().any(|a| a == "--list-devices") {
        let devices = enumerate_midi_devices(&config.client_name);
        if devices.is_empty() {
            println!("No MIDI input devices found");
        }
        for device in devices {
            println!("{}\t{}", device.id, device.name);
        }
        return Ok(());
    }

    if args.iter().any(|a| a == "--write-config") {
        config.save(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    midirec_lib::run(config).await
}
