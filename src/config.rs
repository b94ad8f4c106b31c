//! Configuration for the metadata engine and the `rawmeta` binary.
//!
//! The engine is tuned through [`EngineConfig`], which can be built in code,
//! deserialized with serde, or derived from the command line:
//!
//! ```ignore
//! use clap::Parser;
//! use rawmeta::config::Cli;
//!
//! let cli = Cli::parse();
//! let engine = cli.engine_config();
//! engine.validate()?;
//! ```
//!
//! # Environment Variables
//!
//! - `RAWMETA_MAX_DEPTH` - Maximum directory nesting (default: 64)
//! - `RAWMETA_LENIENT` - Skip out-of-range entries instead of failing (default: false)

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

// =============================================================================
// Default Values
// =============================================================================

/// Default maximum nesting of directories.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default number of image sub-IFDs followed from one SubIFDs tag.
pub const DEFAULT_MAX_SUB_IFDS: usize = 4;

/// Largest accepted nesting; deeper trees are never legitimate.
const MAX_DEPTH_LIMIT: usize = 1024;

// =============================================================================
// EngineConfig
// =============================================================================

/// Limits and policies of the parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of directories, in addition to the offset checks.
    pub max_depth: usize,

    /// Abort the parse on an out-of-range or self-overlapping value.
    ///
    /// When disabled the offending entry is skipped with a warning.
    pub strict_offsets: bool,

    /// Number of image sub-IFDs followed from one SubIFDs tag.
    pub max_sub_ifds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            strict_offsets: true,
            max_sub_ifds: DEFAULT_MAX_SUB_IFDS,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_LIMIT {
            return Err(format!(
                "max_depth must be between 1 and {MAX_DEPTH_LIMIT}"
            ));
        }
        if self.max_sub_ifds == 0 || self.max_sub_ifds > 4 {
            return Err("max_sub_ifds must be between 1 and 4".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// rawmeta - inspect and edit camera metadata in TIFF and CRW files.
#[derive(Parser, Debug, Clone)]
#[command(name = "rawmeta")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum directory nesting.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH, env = "RAWMETA_MAX_DEPTH")]
    pub max_depth: usize,

    /// Skip entries with out-of-range offsets instead of failing.
    #[arg(long, global = true, default_value_t = false, env = "RAWMETA_LENIENT")]
    pub lenient: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the metadata of a file.
    Dump {
        file: PathBuf,

        /// Treat the file as Canon CRW instead of TIFF.
        #[arg(long)]
        crw: bool,

        /// Print JSON instead of one line per entry.
        #[arg(long)]
        json: bool,
    },

    /// Set one Exif value and write the result to a new file.
    Set {
        file: PathBuf,

        /// Key such as `Exif.Image.Model`.
        key: String,

        /// New value, parsed according to the type of the existing entry.
        value: String,

        /// Where to write the modified file.
        #[arg(short, long)]
        output: PathBuf,

        /// Treat the file as Canon CRW instead of TIFF.
        #[arg(long)]
        crw: bool,
    },
}

impl Cli {
    /// Engine settings selected on the command line.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_depth: self.max_depth,
            strict_offsets: !self.lenient,
            ..EngineConfig::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
