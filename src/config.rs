// This module holds the runtime configuration consulted while compiling a module. DebugOptions
// gathers the switches that change orchestration: which colorer the buffer assigner receives,
// whether runtime-managed constants are pruned from the generated module, and where and what
// to dump. Options are read with clap from a flag string of `--key=value` tokens, normally
// taken from the THUNKC_FLAGS environment variable, and bundled with the replica and
// partition counts into a ModuleConfig that travels with each program.

//! Compilation configuration and debug flags.

use std::env;
use std::iter;
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::error::ErrorKind;
use clap::Parser;
use thiserror::Error;

/// Environment variable holding the debug flags.
pub const FLAGS_ENV_VAR: &str = "THUNKC_FLAGS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid debug flags: {message}")]
    Invalid { kind: ErrorKind, message: String },
}

impl From<clap::Error> for ConfigError {
    fn from(err: clap::Error) -> Self {
        let rendered = err.to_string();
        let message = rendered
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches("error: ")
            .to_string();
        ConfigError::Invalid { kind: err.kind(), message }
    }
}

/// Debug switches for a compilation.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "thunkc", disable_help_flag = true, disable_version_flag = true)]
pub struct DebugOptions {
    /// Use the collective-aware colorer during buffer assignment.
    #[arg(
        long = "enable_collective_user_buffers",
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub enable_collective_user_buffers: bool,

    /// Let the runtime allocate and initialize constants with external content.
    #[arg(
        long = "enable_shared_constants",
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub enable_shared_constants: bool,

    /// Directory for dump files; dumping is off when unset.
    #[arg(long = "dump_to", require_equals = true)]
    pub dump_to: Option<PathBuf>,

    /// Passes whose output is dumped; `all` matches every pass.
    #[arg(long = "dump_passes", require_equals = true, value_delimiter = ',')]
    pub dump_passes: Vec<String>,

    #[arg(
        long = "dump_buffer_assignment",
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub dump_buffer_assignment: bool,
}

impl DebugOptions {
    /// Parse a whitespace separated list of `--name[=value]` flags.
    pub fn from_flags(flags: &str) -> Result<Self, ConfigError> {
        let args = iter::once("thunkc").chain(flags.split_whitespace());
        Ok(Self::try_parse_from(args)?)
    }

    /// Read flags from [`FLAGS_ENV_VAR`]; an unset variable yields the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(FLAGS_ENV_VAR) {
            Ok(flags) => Self::from_flags(&flags),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn dumping_enabled(&self) -> bool {
        self.dump_to.is_some()
    }

    pub fn dumping_enabled_for_pass(&self, pass: &str) -> bool {
        self.dumping_enabled() && self.dump_passes.iter().any(|p| p == "all" || p == pass)
    }
}

/// Per-program configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub debug_options: DebugOptions,
    pub replica_count: u32,
    pub num_partitions: u32,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            debug_options: DebugOptions::default(),
            replica_count: 1,
            num_partitions: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let options = DebugOptions::from_flags(
            "--enable_shared_constants --enable_collective_user_buffers=false \
             --dump_to=/tmp/dumps --dump_passes=ir-emission,prune-globals",
        )
        .unwrap();

        assert!(options.enable_shared_constants);
        assert!(!options.enable_collective_user_buffers);
        assert_eq!(options.dump_to, Some(PathBuf::from("/tmp/dumps")));
        assert!(options.dumping_enabled_for_pass("prune-globals"));
        assert!(!options.dumping_enabled_for_pass("clear-compile-time-info"));
    }

    #[test]
    fn test_dump_all_passes() {
        let options = DebugOptions::from_flags("--dump_to=out --dump_passes=all").unwrap();
        assert!(options.dumping_enabled_for_pass("anything"));

        let no_dir = DebugOptions::from_flags("--dump_passes=all").unwrap();
        assert!(!no_dir.dumping_enabled_for_pass("anything"));
    }

    #[test]
    fn test_boolean_spellings() {
        let options = DebugOptions::from_flags("--enable_shared_constants=1 --dump_buffer_assignment=0").unwrap();
        assert!(options.enable_shared_constants);
        assert!(!options.dump_buffer_assignment);
    }

    #[test]
    fn test_invalid_flags() {
        let kind = |flags: &str| match DebugOptions::from_flags(flags) {
            Err(ConfigError::Invalid { kind, .. }) => Some(kind),
            Ok(_) => None,
        };
        assert_eq!(kind("--no_such_flag"), Some(ErrorKind::UnknownArgument));
        assert_eq!(kind("dump_to=x"), Some(ErrorKind::UnknownArgument));
        assert!(matches!(
            kind("--enable_shared_constants=maybe"),
            Some(ErrorKind::ValueValidation | ErrorKind::InvalidValue)
        ));
        assert!(kind("--dump_to=").is_some());

        let err = DebugOptions::from_flags("--no_such_flag").unwrap_err();
        assert!(err.to_string().contains("--no_such_flag"), "{}", err);
    }

    #[test]
    fn test_empty_flags_are_default() {
        assert_eq!(DebugOptions::from_flags("  ").unwrap(), DebugOptions::default());
    }
}
