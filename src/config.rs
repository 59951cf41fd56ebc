use crate::cli::{Cli, OutputFormat};
use crate::error::{ConfigError, ConfigResult as Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Schema directory shipped with the crate
pub fn bundled_schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas")
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub schemas: SchemaConfig,
    pub xml: XmlConfig,
    pub output: OutputConfig,
}

/// Where schema files are found and how many dictionaries stay cached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Directory holding `inp/<version>/FleurInputSchema.xsd` and `out/<version>/FleurOutputSchema.xsd`
    pub directory: PathBuf,
    /// Maximum number of schema dictionaries kept in memory
    pub cache_capacity: u64,
}

/// Settings applied when writing XML values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct XmlConfig {
    /// Number of digits written after the decimal point for floats
    pub float_precision: usize,
    /// Reorder siblings that violate the schema order instead of failing
    pub correct_order: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            directory: bundled_schema_dir(),
            cache_capacity: 32,
        }
    }
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            float_precision: 10,
            correct_order: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "fleurio.toml",
            "fleurio.json",
            ".fleurio.toml",
            ".fleurio.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("fleurio");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(schema_dir) = env.get("FLEURIO_SCHEMA_DIR") {
            config.schemas.directory = PathBuf::from(schema_dir);
        }

        if let Some(capacity) = env.get("FLEURIO_CACHE_CAPACITY") {
            config.schemas.cache_capacity = capacity.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid FLEURIO_CACHE_CAPACITY value: {}",
                    capacity
                ))
            })?;
        }

        if let Some(precision) = env.get("FLEURIO_FLOAT_PRECISION") {
            config.xml.float_precision = precision.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid FLEURIO_FLOAT_PRECISION value: {}",
                    precision
                ))
            })?;
        }

        if let Some(correct_order) = env.get("FLEURIO_CORRECT_ORDER") {
            config.xml.correct_order = correct_order.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid FLEURIO_CORRECT_ORDER value: {}",
                    correct_order
                ))
            })?;
        }

        if let Some(verbose) = env.get("FLEURIO_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid FLEURIO_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("FLEURIO_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid FLEURIO_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("FLEURIO_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid FLEURIO_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(schema_dir) = &cli.schema_dir {
            config.schemas.directory = schema_dir.clone();
        }
        if let Some(precision) = cli.float_precision {
            config.xml.float_precision = precision;
        }
        if cli.no_correct_order {
            config.xml.correct_order = false;
        }
        if let Some(format) = &cli.output_format {
            config.output.format = format.clone().into();
        }
        if cli.verbose {
            config.output.verbose = true;
        }
        if cli.quiet {
            config.output.quiet = true;
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.schemas.directory = override_config.schemas.directory;
        base.schemas.cache_capacity = override_config.schemas.cache_capacity;

        base.xml.float_precision = override_config.xml.float_precision;
        base.xml.correct_order = override_config.xml.correct_order;

        base.output.format = override_config.output.format;
        base.output.verbose = override_config.output.verbose;
        base.output.quiet = override_config.output.quiet;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.schemas.cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "Schema cache capacity must be greater than 0".to_string(),
            ));
        }

        if config.xml.float_precision == 0 || config.xml.float_precision > 17 {
            return Err(ConfigError::Validation(format!(
                "Float precision must be between 1 and 17, got {}",
                config.xml.float_precision
            )));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration from defaults and the environment only (no CLI, no files)
    pub fn from_environment() -> Result<Config> {
        let config = Self::apply_environment_overrides(Config::default())?;
        Self::validate_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.schemas.directory.ends_with("schemas"));
        assert_eq!(config.schemas.cache_capacity, 32);
        assert_eq!(config.xml.float_precision, 10);
        assert!(config.xml.correct_order);
        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert!(!config.output.verbose);
        assert!(!config.output.quiet);
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[schemas]
directory = "/opt/fleur/schemas"
cache_capacity = 4

[xml]
float_precision = 8
correct_order = false

[output]
format = "json"
verbose = true
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert_eq!(config.schemas.directory, PathBuf::from("/opt/fleur/schemas"));
        assert_eq!(config.schemas.cache_capacity, 4);
        assert_eq!(config.xml.float_precision, 8);
        assert!(!config.xml.correct_order);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert!(config.output.verbose);
        assert!(!config.output.quiet);
    }

    #[test]
    fn test_load_json_config_partial() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"xml": {"float_precision": 6}}"#).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert_eq!(config.xml.float_precision, 6);
        assert!(config.xml.correct_order);
        assert_eq!(config.schemas.cache_capacity, 32);
    }

    #[test]
    fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "xml: {}").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"));
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("FLEURIO_SCHEMA_DIR", "/env/schemas");
        env.set("FLEURIO_FLOAT_PRECISION", "12");
        env.set("FLEURIO_CORRECT_ORDER", "false");
        env.set("FLEURIO_FORMAT", "json");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();
        assert_eq!(config.schemas.directory, PathBuf::from("/env/schemas"));
        assert_eq!(config.xml.float_precision, 12);
        assert!(!config.xml.correct_order);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
    }

    #[test]
    fn test_invalid_environment_value() {
        let mut env = MockEnvProvider::new();
        env.set("FLEURIO_FLOAT_PRECISION", "many");

        let result = ConfigManager::apply_environment_overrides_with(&env, Config::default());
        assert!(matches!(result, Err(ConfigError::Environment(_))));
    }

    #[test]
    fn test_file_then_environment_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fleurio.toml");
        fs::write(&config_path, "[xml]\nfloat_precision = 6\n").unwrap();

        let file_config = ConfigManager::load_from_file(&config_path).unwrap();
        let merged = ConfigManager::merge_configs(Config::default(), file_config);
        assert_eq!(merged.xml.float_precision, 6);

        let mut env = MockEnvProvider::new();
        env.set("FLEURIO_FLOAT_PRECISION", "14");
        let config = ConfigManager::apply_environment_overrides_with(&env, merged).unwrap();
        assert_eq!(config.xml.float_precision, 14);
    }

    #[test]
    fn test_cli_takes_precedence() {
        let cli = Cli::parse_from([
            "fleurio",
            "--float-precision",
            "5",
            "--schema-dir",
            "/cli/schemas",
            "inpxml",
            "validate",
            "inp.xml",
        ]);
        let config = ConfigManager::merge_with_cli(Config::default(), &cli);
        assert_eq!(config.xml.float_precision, 5);
        assert_eq!(config.schemas.directory, PathBuf::from("/cli/schemas"));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::default();
        config.xml.float_precision = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.schemas.cache_capacity = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        assert!(ConfigManager::validate_config(&Config::default()).is_ok());
    }
}
