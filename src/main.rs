use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};

use fleurio::cli::{
    Cli, Command, ConvertArgs, GetArgs, Hdf5Command, InpxmlCommand, OutxmlCommand, SetArgs,
    VerbosityLevel,
};
use fleurio::config::{Config, ConfigManager};
use fleurio::context::FleurXmlContext;
use fleurio::conversion::{ConversionDescription, conversion_file, convert_inpxml};
use fleurio::converters::Value;
use fleurio::error::FleurError;
use fleurio::error_reporter::ErrorReporter;
use fleurio::hdf5::{Hdf5Reader, RECIPE_NAMES, recipe_by_name};
use fleurio::libxml2::{ValidationResult, XPathVariables};
use fleurio::loader::{load_inpxml, load_outxml};
use fleurio::logger::Logger;
use fleurio::output::Output;
use fleurio::query::{EvalOptions, read_constants};
use fleurio::schema_dict::{SchemaCache, SchemaDictionary, SchemaVersion};
use fleurio::setters::{SetOptions, WriteOptions, names};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(2);
    }

    let config = match ConfigManager::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            ErrorReporter::new(VerbosityLevel::Normal).report_config_error(&e);
            return ExitCode::from(2);
        }
    };

    let verbosity = VerbosityLevel::from_config(&config);
    let reporter = ErrorReporter::new(verbosity);
    match run(&cli, &config, verbosity) {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<FleurError>() {
                Some(error) => reporter.report_error(error),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config, verbosity: VerbosityLevel) -> Result<ExitCode> {
    let output = Output::new(config.output.format.clone().into(), verbosity);
    let cache = SchemaCache::new(&config.schemas.directory, config.schemas.cache_capacity);
    let write = WriteOptions {
        correct_order: config.xml.correct_order,
        float_precision: config.xml.float_precision,
    };
    let reporter = ErrorReporter::new(verbosity);

    match &cli.command {
        Command::Inpxml(InpxmlCommand::Get(args)) => {
            let loaded = load_inpxml(args.file.as_path(), &cache)?;
            let logger = Logger::new();
            let value = get_value(
                args,
                &loaded.document,
                loaded.schema.as_ref(),
                false,
                &logger,
            )?;
            reporter.report_warnings(&logger);
            println!("{}", output.format_value(&args.name, &value));
            Ok(ExitCode::SUCCESS)
        }
        Command::Inpxml(InpxmlCommand::Set(args)) => set_value(args, &cache, write, &output),
        Command::Inpxml(InpxmlCommand::Validate { files }) => {
            let mut failures = 0;
            for file in files {
                match validate_file(file, &cache) {
                    Ok(result) => {
                        if !result.is_valid() {
                            failures += 1;
                        }
                        println!("{}", output.format_validation(&file.display().to_string(), &result));
                    }
                    Err(e) => {
                        failures += 1;
                        reporter.report_error(&e);
                    }
                }
            }
            Ok(if failures == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Inpxml(InpxmlCommand::Convert(args)) => convert(args, &cache, write, &output),
        Command::Outxml(OutxmlCommand::Get {
            get,
            last_iteration,
        }) => {
            let logger = Logger::new();
            let loaded = load_outxml(get.file.as_path(), &cache, Some(&logger))?;
            let value = get_value(
                get,
                &loaded.document,
                loaded.schema.as_ref(),
                *last_iteration,
                &logger,
            )?;
            reporter.report_warnings(&logger);
            println!("{}", output.format_value(&get.name, &value));
            Ok(ExitCode::SUCCESS)
        }
        Command::Hdf5(Hdf5Command::Read { file, recipe }) => {
            let recipe = recipe_by_name(recipe).ok_or_else(|| {
                anyhow!(
                    "Unknown recipe '{}', expected one of: {}",
                    recipe,
                    RECIPE_NAMES.join(", ")
                )
            })?;
            let reader = Hdf5Reader::open(file)?;
            let result = reader.read(&recipe, true)?;
            println!("{}", output.format_recipe_output(&recipe.name, &result));
            Ok(ExitCode::SUCCESS)
        }
        Command::Hdf5(Hdf5Command::Recipes) => {
            for name in RECIPE_NAMES {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn filters(text: &Option<String>) -> Result<Option<serde_json::Value>> {
    text.as_deref()
        .map(|text| serde_json::from_str(text).context("--filters must be valid JSON"))
        .transpose()
}

fn get_value(
    args: &GetArgs,
    document: &fleurio::libxml2::XmlDocument,
    schema: &dyn SchemaDictionary,
    last_iteration: bool,
    logger: &Logger,
) -> Result<Value> {
    let root = document.root();
    let constants = read_constants(root, schema, args.lenient.then_some(logger))?;

    let node = if last_iteration {
        let iteration = schema
            .iteration()
            .ok_or_else(|| anyhow!("{} has no iterations", document.source_name()))?;
        root.xpath_nodes(iteration.iteration_path(), &XPathVariables::new())?
            .pop()
            .ok_or_else(|| anyhow!("{} contains no iteration", document.source_name()))?
    } else {
        root
    };

    let mut context = FleurXmlContext::new(node, schema, &constants).with_iteration_path(last_iteration);
    if args.lenient {
        context = context.with_logger(logger);
    }
    let mut options: EvalOptions<'_> = context.options();
    for phrase in &args.contains {
        options = options.contains(phrase.as_str());
    }
    for phrase in &args.not_contains {
        options = options.not_contains(phrase.as_str());
    }
    if let Some(filters) = filters(&args.filters)? {
        options = options.filters(filters);
    }

    let value = if args.text {
        context.text_with(&args.name, options)?
    } else {
        context.attribute_with(&args.name, options)?
    };
    Ok(value)
}

/// A JSON literal, or the raw argument as string
fn parse_value(text: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .unwrap_or_else(|_| Value::Str(text.to_string()))
}

fn set_value(args: &SetArgs, cache: &SchemaCache, write: WriteOptions, output: &Output) -> Result<ExitCode> {
    let mut loaded = load_inpxml(args.file.as_path(), cache)?;
    let schema = loaded.schema.clone();

    let mut options = SetOptions::new()
        .create(args.create)
        .correct_order(write.correct_order)
        .float_precision(write.float_precision);
    for phrase in &args.contains {
        options = options.contains(phrase.as_str());
    }
    for phrase in &args.not_contains {
        options = options.not_contains(phrase.as_str());
    }
    if let Some(filters) = filters(&args.filters)? {
        options = options.filters(filters);
    }

    let value = parse_value(&args.value);
    let root = loaded.document.root_mut();
    let changed = if args.text {
        names::set_text(root, schema.as_ref(), &args.name, &value, &options)?
    } else {
        names::set_attrib_value(root, schema.as_ref(), &args.name, &value, &options)?
    };
    if changed == 0 {
        bail!("Nothing matched '{}' in {}", args.name, args.file.display());
    }

    if let Some(xml_schema) = schema.xml_schema() {
        let result = loaded.document.validate(xml_schema)?;
        if !result.is_valid() {
            eprintln!(
                "{}",
                output.format_validation(&args.file.display().to_string(), &result)
            );
        }
    }

    let target = args.output.as_deref().unwrap_or(&args.file);
    loaded
        .document
        .write_to_file(target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!("{}", output.format_value(&args.name, &value));
    Ok(ExitCode::SUCCESS)
}

fn validate_file(file: &Path, cache: &SchemaCache) -> fleurio::Result<ValidationResult> {
    let loaded = load_inpxml(file, cache)?;
    let xml_schema = loaded.schema.xml_schema().ok_or_else(|| FleurError::SchemaVersion {
        details: format!(
            "no compiled schema for version {}",
            loaded.schema.input_version()
        ),
    })?;
    Ok(loaded.document.validate(xml_schema)?)
}

fn convert(args: &ConvertArgs, cache: &SchemaCache, write: WriteOptions, output: &Output) -> Result<ExitCode> {
    let mut loaded = load_inpxml(args.file.as_path(), cache)?;
    let to: SchemaVersion = args.to_version.parse()?;
    let from = loaded.schema.input_version();

    let description = match (&args.conversion, &args.conversion_dir) {
        (Some(file), _) => ConversionDescription::from_file(file)?,
        (None, Some(directory)) => conversion_file(directory, from, to)?,
        (None, None) => conversion_file(&cache.schema_dir().join("conversions"), from, to)?,
    };
    if description.to != to {
        bail!(
            "Conversion description leads to {}, not to the requested {}",
            description.to,
            to
        );
    }

    let report = convert_inpxml(&mut loaded.document, &description, cache, write)?;
    let target = args.output.as_deref().unwrap_or(&args.file);
    loaded
        .document
        .write_to_file(target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!(
        "{}",
        output.format_conversion(&target.display().to_string(), &report)
    );

    match report.validation {
        ValidationResult::Valid => Ok(ExitCode::SUCCESS),
        ValidationResult::Invalid { errors, .. } => Err(FleurError::ValidationFailed {
            source_name: target.display().to_string(),
            errors,
        }
        .into()),
        ValidationResult::InternalError { code } => {
            bail!("libxml2 failed to validate {} (code {})", target.display(), code)
        }
    }
}
