use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

impl VerbosityLevel {
    pub fn from_config(config: &Config) -> Self {
        if config.output.quiet {
            VerbosityLevel::Quiet
        } else if config.output.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Read, modify and validate Fleur XML files and read Fleur HDF5 results
#[derive(Parser, Debug, Clone)]
#[command(name = "fleurio")]
#[command(about = "Schema-aware access to Fleur input/output files and HDF5 results")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory holding the Fleur schema files
    #[arg(long = "schema-dir")]
    pub schema_dir: Option<PathBuf>,

    /// Digits after the decimal point when writing floats
    #[arg(long = "float-precision")]
    pub float_precision: Option<usize>,

    /// Fail instead of reordering tags that violate the schema order
    #[arg(long = "no-correct-order")]
    pub no_correct_order: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Work with Fleur input files (inp.xml)
    #[command(subcommand)]
    Inpxml(InpxmlCommand),
    /// Work with Fleur output files (out.xml)
    #[command(subcommand)]
    Outxml(OutxmlCommand),
    /// Work with Fleur HDF5 result files
    #[command(subcommand)]
    Hdf5(Hdf5Command),
}

#[derive(Subcommand, Debug, Clone)]
pub enum InpxmlCommand {
    /// Print the value of an attribute or tag text
    Get(GetArgs),
    /// Change an attribute or tag text
    Set(SetArgs),
    /// Validate input files against the schema of their version
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Convert an input file to another file version
    Convert(ConvertArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum OutxmlCommand {
    /// Print the value of an attribute or tag text
    Get {
        #[command(flatten)]
        get: GetArgs,
        /// Read from the last SCF iteration instead of the whole file
        #[arg(long = "last-iteration")]
        last_iteration: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum Hdf5Command {
    /// Read a file with a shipped recipe
    Read {
        file: PathBuf,
        /// Recipe name
        #[arg(short = 'r', long = "recipe", default_value = "FleurBands")]
        recipe: String,
    },
    /// List the shipped recipes
    Recipes,
}

/// Name and narrowing of a value to read
#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    pub file: PathBuf,
    /// Attribute or tag name
    pub name: String,
    /// Read the text of the tag `name` instead of an attribute
    #[arg(long = "text")]
    pub text: bool,
    /// Only paths containing this phrase
    #[arg(long = "contains", action = clap::ArgAction::Append)]
    pub contains: Vec<String>,
    /// Only paths not containing this phrase
    #[arg(long = "not-contains", action = clap::ArgAction::Append)]
    pub not_contains: Vec<String>,
    /// Filters as JSON, e.g. '{"species": {"name": "Fe-1"}}'
    #[arg(long = "filters")]
    pub filters: Option<String>,
    /// Report recoverable problems as warnings
    #[arg(long = "lenient")]
    pub lenient: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    pub file: PathBuf,
    /// Attribute or tag name
    pub name: String,
    /// New value as JSON (a plain word is taken as a string)
    pub value: String,
    /// Set the text of the tag `name` instead of an attribute
    #[arg(long = "text")]
    pub text: bool,
    /// Only paths containing this phrase
    #[arg(long = "contains", action = clap::ArgAction::Append)]
    pub contains: Vec<String>,
    /// Only paths not containing this phrase
    #[arg(long = "not-contains", action = clap::ArgAction::Append)]
    pub not_contains: Vec<String>,
    /// Filters as JSON
    #[arg(long = "filters")]
    pub filters: Option<String>,
    /// Create missing tags
    #[arg(long = "create")]
    pub create: bool,
    /// Write the result here instead of replacing the input
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    pub file: PathBuf,
    /// Target file version
    pub to_version: String,
    /// Conversion description (JSON)
    #[arg(long = "conversion", conflicts_with = "conversion_dir")]
    pub conversion: Option<PathBuf>,
    /// Directory with `conversion_<from>_to_<to>.json` files
    #[arg(long = "conversion-dir")]
    pub conversion_dir: Option<PathBuf>,
    /// Write the result here instead of replacing the input
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        let files: Vec<&PathBuf> = match &self.command {
            Command::Inpxml(InpxmlCommand::Get(args)) => vec![&args.file],
            Command::Inpxml(InpxmlCommand::Set(args)) => vec![&args.file],
            Command::Inpxml(InpxmlCommand::Validate { files }) => files.iter().collect(),
            Command::Inpxml(InpxmlCommand::Convert(args)) => vec![&args.file],
            Command::Outxml(OutxmlCommand::Get { get, .. }) => vec![&get.file],
            Command::Hdf5(Hdf5Command::Read { file, .. }) => vec![file],
            Command::Hdf5(Hdf5Command::Recipes) => vec![],
        };
        if let Some(missing) = files.iter().find(|file| !file.exists()) {
            return Err(format!("Path does not exist: {}", missing.display()));
        }
        if let Some(precision) = self.float_precision
            && precision == 0
        {
            return Err("Float precision must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inpxml_get_parsing() {
        let cli = Cli::try_parse_from([
            "fleurio",
            "inpxml",
            "get",
            "inp.xml",
            "radius",
            "--contains",
            "species",
        ])
        .unwrap();
        match cli.command {
            Command::Inpxml(InpxmlCommand::Get(args)) => {
                assert_eq!(args.file, PathBuf::from("inp.xml"));
                assert_eq!(args.name, "radius");
                assert_eq!(args.contains, vec!["species".to_string()]);
                assert!(!args.text);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_options_and_hdf5() {
        let cli = Cli::try_parse_from([
            "fleurio",
            "--format",
            "json",
            "-q",
            "hdf5",
            "read",
            "banddos.hdf",
            "--recipe",
            "FleurDOS",
        ])
        .unwrap();
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Command::Hdf5(Hdf5Command::Read { ref recipe, .. }) if recipe == "FleurDOS"
        ));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["fleurio", "-v", "-q", "hdf5", "recipes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_sources_conflict() {
        let result = Cli::try_parse_from([
            "fleurio",
            "inpxml",
            "convert",
            "inp.xml",
            "0.34",
            "--conversion",
            "a.json",
            "--conversion-dir",
            "conversions",
        ]);
        assert!(result.is_err());
    }
}
