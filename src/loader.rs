//! Loading Fleur XML files together with the schema dictionary of their version.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{FleurError, LibXml2Error, Result};
use crate::libxml2::{ParseOptions, XPathVariables, XmlDocument, XmlNode};
use crate::logger::Logger;
use crate::schema_dict::{InputSchemaDict, OutputSchemaDict, SchemaCache, SchemaVersion};

/// Where a document comes from
pub enum XmlSource<'a> {
    Path(&'a Path),
    /// An already parsed document, used as is
    Document(XmlDocument),
    /// Raw bytes; `base_url` resolves relative XIncludes
    Bytes {
        data: &'a [u8],
        base_url: Option<&'a str>,
    },
}

impl<'a> From<&'a Path> for XmlSource<'a> {
    fn from(path: &'a Path) -> Self {
        XmlSource::Path(path)
    }
}

impl From<XmlDocument> for XmlSource<'_> {
    fn from(document: XmlDocument) -> Self {
        XmlSource::Document(document)
    }
}

impl<'a> From<&'a [u8]> for XmlSource<'a> {
    fn from(data: &'a [u8]) -> Self {
        XmlSource::Bytes {
            data,
            base_url: None,
        }
    }
}

/// An input file and the dictionary of its version
#[derive(Debug)]
pub struct LoadedInput {
    pub document: XmlDocument,
    pub schema: Arc<InputSchemaDict>,
}

/// An output file and the dictionary of its output and input versions
#[derive(Debug)]
pub struct LoadedOutput {
    pub document: XmlDocument,
    pub schema: Arc<OutputSchemaDict>,
}

fn parse(source: XmlSource<'_>, options: ParseOptions) -> std::result::Result<XmlDocument, LibXml2Error> {
    match source {
        XmlSource::Path(path) => XmlDocument::parse_file(path, options),
        XmlSource::Document(document) => Ok(document),
        XmlSource::Bytes { data, base_url } => XmlDocument::parse_bytes(data, base_url, options),
    }
}

fn root_attribute(root: XmlNode<'_>, name: &str) -> Result<String> {
    root.attribute(name).ok_or_else(|| FleurError::SchemaVersion {
        details: format!(
            "<{}> in {} has no '{}' attribute",
            root.name(),
            root.node_path(),
            name
        ),
    })
}

/// Load an input file; the schema is chosen by `@fleurInputVersion`
pub fn load_inpxml<'a>(source: impl Into<XmlSource<'a>>, cache: &SchemaCache) -> Result<LoadedInput> {
    let document = parse(source.into(), ParseOptions::default())?;
    let version = root_attribute(document.root(), "fleurInputVersion")?;
    log::debug!(
        "Loaded input file {} with version {}",
        document.source_name(),
        version
    );
    let schema = cache.input(&version)?;
    check_root(&document, schema.root_tag())?;
    Ok(LoadedInput { document, schema })
}

/// Load an output file; broken (e.g. truncated) files are parsed in recovery mode
///
/// Files declaring output version `0.27` were written by several Fleur releases; their
/// real version is derived from `programVersion/@version`.
pub fn load_outxml<'a>(
    source: impl Into<XmlSource<'a>>,
    cache: &SchemaCache,
    logger: Option<&Logger>,
) -> Result<LoadedOutput> {
    let document = match source.into() {
        XmlSource::Document(document) => document,
        XmlSource::Path(path) => {
            parse_recovering(|options| XmlDocument::parse_file(path, options), logger)?
        }
        XmlSource::Bytes { data, base_url } => parse_recovering(
            |options| XmlDocument::parse_bytes(data, base_url, options),
            logger,
        )?,
    };

    let root = document.root();
    let declared = root_attribute(root, "fleurOutputVersion")?;
    let out_version = if declared.trim() == "0.27" {
        let program = first_value(root, "./programVersion/@version")?.ok_or_else(|| {
            FleurError::SchemaVersion {
                details: "output version 0.27 without programVersion/@version".to_string(),
            }
        })?;
        remap_program_version(&program)?.to_string()
    } else {
        declared
    };
    let inp_version =
        first_value(root, "//fleurInput/@fleurInputVersion")?.unwrap_or_else(|| out_version.clone());
    log::debug!(
        "Loaded output file {} with output version {} (input {})",
        document.source_name(),
        out_version,
        inp_version
    );

    let schema = cache.output(&out_version, Some(&inp_version))?;
    check_root(&document, schema.root_tag())?;
    Ok(LoadedOutput { document, schema })
}

fn parse_recovering(
    read: impl Fn(ParseOptions) -> std::result::Result<XmlDocument, LibXml2Error>,
    logger: Option<&Logger>,
) -> Result<XmlDocument> {
    match read(ParseOptions::default()) {
        Ok(document) => Ok(document),
        Err(LibXml2Error::DocumentParseFailed {
            source_name,
            errors,
        }) => {
            let message = format!(
                "Output file {} is broken, parsing in recovery mode: {}",
                source_name,
                errors.join("; ")
            );
            match logger {
                Some(logger) => logger.warning(message),
                None => log::warn!("{}", message),
            }
            Ok(read(ParseOptions::default().with_recover(true))?)
        }
        Err(e) => Err(e.into()),
    }
}

fn first_value(root: XmlNode<'_>, xpath: &str) -> Result<Option<String>> {
    Ok(root
        .xpath_nodes(xpath, &XPathVariables::new())?
        .first()
        .map(|node| node.content()))
}

fn check_root(document: &XmlDocument, root_tag: &str) -> Result<()> {
    let name = document.root().name();
    if name != root_tag {
        return Err(FleurError::invalid(format!(
            "{} has root element <{}>, expected <{}>",
            document.source_name(),
            name,
            root_tag
        )));
    }
    Ok(())
}

fn program_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*fleur\s+(\d+)\b").expect("valid program version regex"))
}

/// Actual output version of a file declaring `0.27`
pub fn remap_program_version(program_version: &str) -> Result<SchemaVersion> {
    let release = program_version_regex()
        .captures(program_version)
        .and_then(|captures| captures[1].parse::<u32>().ok());
    match release {
        Some(32) => Ok(SchemaVersion::new(0, 33)),
        Some(31) => Ok(SchemaVersion::new(0, 31)),
        Some(30) => Ok(SchemaVersion::new(0, 30)),
        Some(27) => Ok(SchemaVersion::new(0, 29)),
        _ => Err(FleurError::SchemaVersion {
            details: format!(
                "cannot determine the output version of program version '{}'",
                program_version
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_program_version() {
        assert_eq!(remap_program_version("fleur 32").unwrap(), SchemaVersion::new(0, 33));
        assert_eq!(remap_program_version("fleur 31").unwrap(), SchemaVersion::new(0, 31));
        assert_eq!(remap_program_version("fleur 30").unwrap(), SchemaVersion::new(0, 30));
        assert_eq!(remap_program_version("fleur 27").unwrap(), SchemaVersion::new(0, 29));
        assert!(matches!(
            remap_program_version("fleur 26"),
            Err(FleurError::SchemaVersion { .. })
        ));
        assert!(remap_program_version("MaX 4").is_err());
    }

    #[test]
    fn test_missing_version_attribute() {
        let document = XmlDocument::parse_str("<fleurInput/>").unwrap();
        let cache = SchemaCache::new(crate::config::bundled_schema_dir(), 4);
        let error = load_inpxml(document, &cache).unwrap_err();
        assert!(matches!(error, FleurError::SchemaVersion { .. }));
    }
}
