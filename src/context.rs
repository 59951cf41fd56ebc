//! Evaluation context binding a node to its schema dictionary, constants and logger.
//!
//! ```ignore
//! let context = FleurXmlContext::new(document.root(), schema.as_ref(), &constants);
//! let radii = context.child("atomSpecies", |species| species.attribute("radius"))?;
//! ```

use crate::constants::Constants;
use crate::converters::Value;
use crate::error::{FleurError, Result};
use crate::libxml2::XmlNode;
use crate::logger::Logger;
use crate::query::{self, EvalOptions, TagOptions};
use crate::schema_dict::SchemaDictionary;

#[derive(Debug, Clone, Copy)]
pub struct FleurXmlContext<'a, 'd> {
    node: XmlNode<'d>,
    schema: &'a dyn SchemaDictionary,
    constants: &'a Constants,
    logger: Option<&'a Logger>,
    iteration_path: bool,
}

impl<'a, 'd> FleurXmlContext<'a, 'd> {
    pub fn new(
        node: XmlNode<'d>,
        schema: &'a dyn SchemaDictionary,
        constants: &'a Constants,
    ) -> Self {
        FleurXmlContext {
            node,
            schema,
            constants,
            logger: None,
            iteration_path: false,
        }
    }

    /// Evaluate leniently, recording failures in `logger`
    pub fn with_logger(mut self, logger: &'a Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve names below the `iteration` element (output files)
    pub fn with_iteration_path(mut self, iteration_path: bool) -> Self {
        self.iteration_path = iteration_path;
        self
    }

    pub fn node(&self) -> XmlNode<'d> {
        self.node
    }

    pub fn schema(&self) -> &'a dyn SchemaDictionary {
        self.schema
    }

    pub fn constants(&self) -> &'a Constants {
        self.constants
    }

    pub fn logger(&self) -> Option<&'a Logger> {
        self.logger
    }

    /// Options pre-filled with the bound constants and logger
    pub fn options(&self) -> EvalOptions<'a> {
        EvalOptions {
            constants: Some(self.constants),
            logger: self.logger,
            iteration_path: self.iteration_path,
            ..EvalOptions::default()
        }
    }

    fn complete(&self, mut options: EvalOptions<'a>) -> EvalOptions<'a> {
        options.constants = options.constants.or(Some(self.constants));
        options.logger = options.logger.or(self.logger);
        options.iteration_path |= self.iteration_path;
        options
    }

    fn nested(&self, node: XmlNode<'d>) -> Self {
        let enters_iteration = self.schema.iteration().is_some_and(|iteration| {
            iteration
                .iteration_path()
                .ends_with(&format!("/{}", node.name()))
        });
        FleurXmlContext {
            node,
            iteration_path: self.iteration_path || enters_iteration,
            ..*self
        }
    }

    pub fn attribute(&self, name: &str) -> Result<Value> {
        self.attribute_with(name, self.options())
    }

    pub fn attribute_with(&self, name: &str, options: EvalOptions<'a>) -> Result<Value> {
        query::evaluate_attribute(self.node, self.schema, name, &self.complete(options))
    }

    pub fn text(&self, name: &str) -> Result<Value> {
        self.text_with(name, self.options())
    }

    pub fn text_with(&self, name: &str, options: EvalOptions<'a>) -> Result<Value> {
        query::evaluate_text(self.node, self.schema, name, &self.complete(options))
    }

    pub fn tag(&self, name: &str, tag_options: &TagOptions) -> Result<Value> {
        self.tag_with(name, self.options(), tag_options)
    }

    pub fn tag_with(
        &self,
        name: &str,
        options: EvalOptions<'a>,
        tag_options: &TagOptions,
    ) -> Result<Value> {
        query::evaluate_tag(self.node, self.schema, name, &self.complete(options), tag_options)
    }

    pub fn single_value_tag(&self, name: &str, options: EvalOptions<'a>) -> Result<Value> {
        query::evaluate_single_value_tag(
            self.node,
            self.schema,
            name,
            &self.complete(options),
            &TagOptions::default(),
        )
    }

    pub fn parent_tag(
        &self,
        name: &str,
        options: EvalOptions<'a>,
        tag_options: &TagOptions,
    ) -> Result<Value> {
        query::evaluate_parent_tag(self.node, self.schema, name, &self.complete(options), tag_options)
    }

    pub fn tag_exists(&self, name: &str, options: EvalOptions<'a>) -> Result<bool> {
        query::tag_exists(self.node, self.schema, name, &self.complete(options))
    }

    pub fn attrib_exists(&self, name: &str, options: EvalOptions<'a>) -> Result<bool> {
        query::attrib_exists(self.node, self.schema, name, &self.complete(options))
    }

    pub fn number_of_nodes(&self, name: &str, options: EvalOptions<'a>) -> Result<usize> {
        query::get_number_of_nodes(self.node, self.schema, name, &self.complete(options))
    }

    pub fn simple_xpath(&self, name: &str, options: EvalOptions<'a>) -> Result<Vec<XmlNode<'d>>> {
        query::eval_simple_xpath(self.node, self.schema, name, &self.complete(options))
    }

    /// Run `f` in the context of the single tag `name`
    pub fn child<R>(&self, name: &str, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        self.child_with(name, self.options(), f)
    }

    pub fn child_with<R>(
        &self,
        name: &str,
        options: EvalOptions<'a>,
        f: impl FnOnce(&Self) -> Result<R>,
    ) -> Result<R> {
        let strict = EvalOptions {
            logger: None,
            optional: false,
            ..self.complete(options)
        };
        match query::eval_simple_xpath(self.node, self.schema, name, &strict)?.as_slice() {
            [node] => f(&self.nested(*node)),
            found => Err(FleurError::invalid(format!(
                "expected exactly one '{}' below {}, found {}",
                name,
                self.node.node_path(),
                found.len()
            ))),
        }
    }

    /// Like [`child`](Self::child), but a missing tag yields `None`
    pub fn optional_child<R>(
        &self,
        name: &str,
        f: impl FnOnce(&Self) -> Result<R>,
    ) -> Result<Option<R>> {
        let options = EvalOptions {
            logger: None,
            optional: true,
            ..self.options()
        };
        match query::eval_simple_xpath(self.node, self.schema, name, &options)?.as_slice() {
            [] => Ok(None),
            [node] => f(&self.nested(*node)).map(Some),
            found => Err(FleurError::invalid(format!(
                "expected at most one '{}' below {}, found {}",
                name,
                self.node.node_path(),
                found.len()
            ))),
        }
    }

    /// Run `f` in the context of every tag `name`, in document order
    pub fn children<R>(&self, name: &str, mut f: impl FnMut(&Self) -> Result<R>) -> Result<Vec<R>> {
        let options = EvalOptions {
            logger: None,
            optional: true,
            ..self.options()
        };
        query::eval_simple_xpath(self.node, self.schema, name, &options)?
            .into_iter()
            .map(|node| f(&self.nested(node)))
            .collect()
    }
}
