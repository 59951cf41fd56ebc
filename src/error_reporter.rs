use crate::cli::VerbosityLevel;
use crate::error::{ConfigError, FleurError};
use crate::logger::Logger;

/// Error reporter with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
}

impl ErrorReporter {
    /// Create a new error reporter with specified verbosity
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    /// Report a library error with appropriate verbosity
    pub fn report_error(&self, error: &FleurError) {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                if self.is_critical_error(error) {
                    eprintln!("{}", self.format_error_brief(error));
                }
            }
            VerbosityLevel::Normal => {
                eprintln!("{}", self.format_error_normal(error));
            }
            VerbosityLevel::Verbose => {
                eprintln!("{}", self.format_error_verbose(error));
            }
            VerbosityLevel::Debug => {
                eprintln!("{}", self.format_error_debug(error));
            }
        }
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        let formatted = match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!(
                    "Configuration Error: {}\n{}",
                    error,
                    self.get_config_help(error)
                )
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    self.get_config_help(error)
                )
            }
        };
        eprintln!("{}", formatted);
    }

    /// Report the warnings collected in lenient mode
    pub fn report_warnings(&self, logger: &Logger) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }
        for record in logger.records() {
            eprintln!("{}", record);
        }
    }

    /// Check if an error is considered critical
    fn is_critical_error(&self, error: &FleurError) -> bool {
        matches!(
            error,
            FleurError::Config(_)
                | FleurError::Io(_)
                | FleurError::SchemaParsing { .. }
                | FleurError::SchemaVersion { .. }
                | FleurError::Hdf5(_)
        )
    }

    /// Format error for brief output (quiet mode)
    fn format_error_brief(&self, error: &FleurError) -> String {
        match error {
            FleurError::ValidationFailed { source_name, .. } => {
                format!("INVALID: {}", source_name)
            }
            FleurError::SchemaVersion { details } => format!("UNSUPPORTED VERSION: {}", details),
            _ => format!("ERROR: {}", error),
        }
    }

    /// Format error for normal output
    fn format_error_normal(&self, error: &FleurError) -> String {
        format!("{}", error)
    }

    /// Format error for verbose output
    fn format_error_verbose(&self, error: &FleurError) -> String {
        let mut output = self.format_error_normal(error);

        match error {
            FleurError::NoPathFound { .. } => {
                output.push_str(
                    "\nSuggestion: Check the spelling of the name or relax the --contains/--not-contains phrases",
                );
            }
            FleurError::NoUniquePathFound { candidates, .. } => {
                output.push_str("\nCandidates:");
                for candidate in candidates {
                    output.push_str(&format!("\n  {}", candidate));
                }
                output.push_str("\nSuggestion: Add --contains or --not-contains phrases to select one");
            }
            FleurError::SchemaVersion { .. } => {
                output.push_str(
                    "\nSuggestion: Point --schema-dir to a directory holding the schema of this version",
                );
            }
            FleurError::ValidationFailed { errors, .. } => {
                for error in errors {
                    output.push_str(&format!("\n  {}", error));
                }
            }
            FleurError::Recipe(_) | FleurError::Transformation { .. } => {
                output.push_str("\nSuggestion: Check that the file was written by a matching Fleur run");
            }
            _ => {}
        }

        output
    }

    /// Format error for debug output
    fn format_error_debug(&self, error: &FleurError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }

    /// Get helpful suggestions for configuration errors
    fn get_config_help(&self, error: &ConfigError) -> String {
        match error {
            ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)".to_string()
            }
            ConfigError::Validation(_) => {
                "Fix the reported value in the configuration file, environment or command line"
                    .to_string()
            }
            ConfigError::Environment(_) => {
                "Fix or unset the FLEURIO_* environment variable".to_string()
            }
            ConfigError::UnsupportedFormat(_) => {
                "Use a configuration file ending in .toml or .json".to_string()
            }
        }
    }
}
