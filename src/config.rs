//! Codec configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (tablegraph.toml)
//! - Environment variables (TABLEGRAPH_*)
//!
//! ## Example config file (tablegraph.toml):
//! ```toml
//! list_delimiter = ", "
//! block_marker = "== "
//! write_help_row = true
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options shared by every codec backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Separator used when a to-many relationship or list-of-scalars value
    /// is written into a single cell. Cells split on the bare separator
    /// character with whitespace trimmed, so "a,b" and "a, b" read back the
    /// same.
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: String,

    /// Prefix of the block-boundary marker line in the multi-block
    /// delimited format
    #[serde(default = "default_block_marker")]
    pub block_marker: String,

    /// Emit the optional second header row carrying attribute help text
    #[serde(default = "default_true")]
    pub write_help_row: bool,
}

fn default_list_delimiter() -> String {
    ", ".to_string()
}

fn default_block_marker() -> String {
    "== ".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            list_delimiter: default_list_delimiter(),
            block_marker: default_block_marker(),
            write_help_row: default_true(),
        }
    }
}

impl CodecConfig {
    /// Load configuration from tablegraph.toml (if present) and
    /// TABLEGRAPH_* environment variables, on top of the defaults
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("tablegraph").required(false))
            .add_source(Environment::with_prefix("TABLEGRAPH"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// The character cells are split on when reading joined lists back
    pub(crate) fn split_char(&self) -> char {
        self.list_delimiter.trim().chars().next().unwrap_or(',')
    }
}
