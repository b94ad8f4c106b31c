//! rawmeta - inspect and edit camera metadata from the command line.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rawmeta::{
    config::{Cli, Command, EngineConfig},
    error::{MetadataError, ValueError},
    format::tiff::tag,
    metadata::StaticLabels,
    CrwParser, EncodeOutcome, ExifKey, FieldType, Group, MetadataBundle, TiffParser, Value,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.engine_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Dump { file, crw, json } => run_dump(&config, &file, crw, json),
        Command::Set {
            file,
            key,
            value,
            output,
            crw,
        } => run_set(&config, &file, &key, &value, &output, crw),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem. Logs go to stderr so that dumps
/// stay machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "rawmeta=debug" } else { "rawmeta=warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

fn decode(config: &EngineConfig, data: &[u8], crw: bool) -> Result<MetadataBundle, MetadataError> {
    if crw {
        Ok(CrwParser::new(*config).decode(data)?)
    } else {
        Ok(TiffParser::new(*config).decode(data)?)
    }
}

fn encode(
    config: &EngineConfig,
    original: &[u8],
    bundle: &MetadataBundle,
    crw: bool,
) -> Result<EncodeOutcome, MetadataError> {
    if crw {
        Ok(CrwParser::new(*config).encode(Some(original), bundle)?)
    } else {
        Ok(TiffParser::new(*config).encode(Some(original), bundle)?)
    }
}

// =============================================================================
// Dump Command
// =============================================================================

fn run_dump(config: &EngineConfig, file: &Path, crw: bool, json: bool) -> Result<(), String> {
    let data = read_file(file)?;
    let bundle = decode(config, &data, crw).map_err(|e| e.to_string())?;
    debug!(file = %file.display(), entries = bundle.exif.len(), "Decoded file");

    if json {
        let text = serde_json::to_string_pretty(&bundle).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    let labels = display_labels();
    let vendor = bundle.exif.make().unwrap_or_default();
    for datum in bundle.exif.iter() {
        let mut line = format!(
            "{:<44} {:<10} {}",
            datum.key.to_string(),
            format!("{:?}", datum.value.field_type()),
            datum.display(vendor, &labels)
        );
        if let Some(area) = &datum.data_area {
            line.push_str(&format!(" [+{} bytes]", area.len()));
        }
        println!("{}", line);
    }
    for dataset in bundle.iptc.iter() {
        println!(
            "Iptc.{}.{:<37} {}",
            dataset.record,
            dataset.dataset,
            String::from_utf8_lossy(&dataset.data)
        );
    }
    if !bundle.xmp.is_empty() {
        println!("Xmp packet: {} bytes", bundle.xmp.packet.len());
    }
    Ok(())
}

fn display_labels() -> StaticLabels {
    const ORIENTATIONS: [&str; 8] = [
        "top, left",
        "top, right",
        "bottom, right",
        "bottom, left",
        "left, top",
        "right, top",
        "right, bottom",
        "left, bottom",
    ];

    let mut labels = StaticLabels::new();
    let key = ExifKey::new(tag::ORIENTATION, Group::Ifd0);
    for (code, label) in (1i64..).zip(ORIENTATIONS) {
        labels.insert("*", key, code, label);
    }
    labels
}

// =============================================================================
// Set Command
// =============================================================================

fn run_set(
    config: &EngineConfig,
    file: &Path,
    key: &str,
    text: &str,
    output: &Path,
    crw: bool,
) -> Result<(), String> {
    let original = read_file(file)?;
    let mut bundle = decode(config, &original, crw).map_err(|e| e.to_string())?;

    let key: ExifKey = key.parse().map_err(|e: ValueError| e.to_string())?;
    let field_type = bundle
        .exif
        .find(&key)
        .map_or(FieldType::Ascii, |d| d.value.field_type());
    let value = Value::parse(field_type, text).map_err(|message| {
        ValueError::InvalidValue {
            key: key.to_string(),
            message,
        }
        .to_string()
    })?;
    bundle.exif.set(key, value);

    let outcome = encode(config, &original, &bundle, crw).map_err(|e| e.to_string())?;
    fs::write(output, &outcome.bytes)
        .map_err(|e| format!("Failed to write {}: {}", output.display(), e))?;

    info!(
        key = %key,
        strategy = ?outcome.strategy,
        bytes = outcome.bytes.len(),
        "Wrote {}",
        output.display()
    );
    Ok(())
}
