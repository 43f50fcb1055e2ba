use clap::{Args, Parser, Subcommand};
use serial_registry::config::{ConfigLoader, LogFormat};
use serial_registry::{
    discovery, filter_ports, logging, FormatSpec, OpenRequest, OwnerTag, Payload, PortFilter,
    ReadSpec, Registry, Reply,
};
use std::path::PathBuf;
use std::time::Duration;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial_registry",
    version,
    about = "Inspect serial ports and exchange framed data with them."
)]
struct Cli {
    /// Configuration file to load instead of the default search path.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "serial_registry=trace".
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the ports present on this machine.
    List {
        #[arg(long)]
        json: bool,
    },
    /// List ports whose attributes match every NAME=VALUE constraint.
    ///
    /// Numeric values (decimal or 0x-prefixed) must match exactly; anything
    /// else is a regular expression.
    Find {
        #[arg(value_name = "NAME=VALUE")]
        constraints: Vec<String>,
    },
    /// Map a serial number to its port, or a port to its serial number.
    Resolve(Target),
    /// Write a payload and read the reply.
    Query(QueryArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Target {
    /// Port path or alias.
    #[arg(long)]
    port: Option<String>,

    /// USB serial number.
    #[arg(long)]
    serial: Option<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    target: Target,

    /// Baud rate; defaults to the configured value.
    #[arg(long)]
    baud: Option<u32>,

    /// Read timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Text to send.
    #[arg(long, conflicts_with_all = ["hex", "pack"])]
    text: Option<String>,

    /// Bytes to send, as hex digits.
    #[arg(long, conflicts_with = "pack")]
    hex: Option<String>,

    /// Format string to pack `--values` with.
    #[arg(long, requires = "values")]
    pack: Option<String>,

    /// Comma-separated values for `--pack`.
    #[arg(long, value_delimiter = ',', requires = "pack")]
    values: Vec<String>,

    /// Byte count or format string describing the reply.
    #[arg(long, default_value = "64")]
    read: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    }
    .into_config();
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    logging::init(&config.logging);

    let registry = Registry::from_config(&config);

    match cli.command {
        Command::List { json } => list_ports(&registry, json)?,
        Command::Find { constraints } => {
            let filter = constraints
                .iter()
                .try_fold(PortFilter::new(), |filter, expr| filter.parse_constraint(expr))?;
            for device in filter_ports(registry.discovery(), &filter)? {
                println!("{device}");
            }
        }
        Command::Resolve(target) => resolve(&registry, &target)?,
        Command::Query(args) => query(&registry, args)?,
    }

    registry.shutdown();
    Ok(())
}

fn list_ports(registry: &Registry, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ports = registry.discovery().list_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!(
            "{:<24} {:<20} {}",
            port.device,
            port.serial_number.as_deref().unwrap_or("-"),
            port.description.as_deref().unwrap_or(port.kind.as_str()),
        );
    }
    Ok(())
}

fn resolve(registry: &Registry, target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    let found = match (&target.port, &target.serial) {
        (Some(port), _) => {
            let port = registry.settings().resolve_port(port);
            discovery::resolve_serial_from_port(registry.discovery(), &port)?
        }
        (None, Some(serial)) => discovery::resolve_port_from_serial(registry.discovery(), serial)?,
        (None, None) => None,
    };

    match found {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err("no matching port".into()),
    }
}

fn query(registry: &Registry, args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut line = registry.settings().default_config.clone();
    if let Some(baud) = args.baud {
        line.baud_rate = baud;
    }
    if let Some(ms) = args.timeout_ms {
        line.timeout = Duration::from_millis(ms);
    }

    let request = match (args.target.port, args.target.serial) {
        (Some(port), _) => OpenRequest::port(port),
        (None, Some(serial)) => OpenRequest::serial_number(serial),
        (None, None) => OpenRequest::unbound(),
    }
    .config(line);

    let payload = if let Some(text) = args.text {
        Payload::from(text)
    } else if let Some(hex) = args.hex {
        Payload::from(decode_hex(&hex)?)
    } else if let Some(format) = args.pack {
        let spec = FormatSpec::new(&format)?;
        let values = spec.parse_values(&args.values)?;
        Payload::Packed {
            values,
            format: spec,
        }
    } else {
        Payload::Bytes(Vec::new())
    };
    let spec: ReadSpec = args.read.parse()?;

    let handle = registry.acquire(OwnerTag::new("serial_registry"), request)?;
    if handle.port().is_none() {
        return Err("no port matches the given serial number".into());
    }

    match handle.query(payload, spec)? {
        Reply::Bytes(bytes) => {
            println!("{}", encode_hex(&bytes));
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Reply::Values(values) => {
            for value in values {
                println!("{value}");
            }
        }
    }
    handle.finalize();
    Ok(())
}

fn decode_hex(input: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(format!("'{input}' is not an even number of hex digits").into());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(Into::into))
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
