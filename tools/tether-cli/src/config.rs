//! `tether.toml` loading.
//!
//! Everything in the file is optional; CLI flags override it field by
//! field. A missing file is an empty configuration, but a named
//! `--config` that does not exist is an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// The configuration file contents.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Target ELF image.
    pub elf: Option<PathBuf>,
    /// How to reach the target.
    pub link: Option<LinkConfig>,
    /// Scratch heap symbol name.
    pub heap_symbol: Option<String>,
    /// Companion generation defaults.
    pub companion: Option<CompanionConfig>,
}

/// Link endpoint settings.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// TCP endpoint, `host:port`.
    pub tcp: Option<String>,
    /// Serial device path.
    pub serial: Option<PathBuf>,
    /// Serial baud rate.
    pub baud: Option<u32>,
}

/// Companion generation settings.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompanionConfig {
    /// Header/source files to scan.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Include paths.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Defines, as `NAME` or `NAME=VALUE`.
    #[serde(default)]
    pub defines: Vec<String>,
    /// Preprocessor command.
    pub compiler: Option<String>,
    /// Output file.
    pub output: Option<PathBuf>,
}

/// Default configuration file name.
pub const DEFAULT_CONFIG: &str = "tether.toml";

/// Loads the configuration.
///
/// # Errors
///
/// An explicitly named file must exist and parse; the implicit default
/// may be absent.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    if !path.exists() {
        if required {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            elf = "firmware.elf"
            heap_symbol = "gti2_memory"

            [link]
            serial = "/dev/ttyUSB0"
            baud = 115200

            [companion]
            sources = ["api.h"]
            include_paths = ["include"]
            defines = ["CONFIG_FOO=1"]
            compiler = "arm-none-eabi-gcc"
            "#,
        )
        .unwrap();
        assert_eq!(config.elf.as_deref(), Some(Path::new("firmware.elf")));
        let link = config.link.unwrap();
        assert_eq!(link.baud, Some(115_200));
        assert!(link.tcp.is_none());
        assert_eq!(config.companion.unwrap().sources.len(), 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("elff = \"x\"\n").is_err());
    }
}
