//! LibXML2 FFI Wrapper Module
//!
//! This module provides a safe wrapper around the libxml2 calls needed to work with Fleur
//! XML files: document parsing (with default attributes, XInclude expansion and recovery),
//! XPath evaluation with bound variables, in-place tree mutation and XML Schema validation.
//!
//! ## Why libxml2
//!
//! Fleur documents rely on XInclude, DTD default attributes and XPath 1.0 predicates with
//! variables. libxml2 provides all of them with exactly the semantics the Fleur tooling has
//! always relied on, so the document model and the XPath engine are taken from there rather
//! than reimplemented.
//!
//! ## Ownership model
//!
//! - [`XmlDocument`] owns the `xmlDoc` and frees it on drop.
//! - [`XmlNode`] is a copyable read-only handle borrowing the document immutably.
//! - [`XmlNodeMut`] is a copyable handle that can mutate the tree. It can only be obtained
//!   from `&mut XmlDocument`, so no read-only handle can observe a node being removed.
//!   Removed nodes are unlinked and parked on the document; they are freed together with
//!   it, so stale copies of a handle never point at freed memory.
//! - [`XmlSchemaPtr`] wraps a compiled `xmlSchema` in an `Arc` and frees it once.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Once};

use libc::{c_char, c_int, c_uchar, c_ushort, c_void};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are not thread-safe, so they run exactly once.
static LIBXML2_INIT: Once = Once::new();

fn init_libxml2() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
    });
}

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDocRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathContextRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathCompExprRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBufferRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxtRaw {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxtRaw {
    _private: [u8; 0],
}

/// Layout of `struct _xmlNode`
#[repr(C)]
pub struct XmlNodeRaw {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_uchar,
    pub children: *mut XmlNodeRaw,
    pub last: *mut XmlNodeRaw,
    pub parent: *mut XmlNodeRaw,
    pub next: *mut XmlNodeRaw,
    pub prev: *mut XmlNodeRaw,
    pub doc: *mut XmlDocRaw,
    pub ns: *mut c_void,
    pub content: *mut c_uchar,
    pub properties: *mut XmlAttrRaw,
    pub ns_def: *mut c_void,
    pub psvi: *mut c_void,
    pub line: c_ushort,
    pub extra: c_ushort,
}

/// Leading fields of `struct _xmlAttr` (shared with `_xmlNode`)
#[repr(C)]
pub struct XmlAttrRaw {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_uchar,
    pub children: *mut XmlNodeRaw,
    pub last: *mut XmlNodeRaw,
    pub parent: *mut XmlNodeRaw,
    pub next: *mut XmlAttrRaw,
    pub prev: *mut XmlAttrRaw,
    pub doc: *mut XmlDocRaw,
}

/// Layout of `struct _xmlNodeSet`
#[repr(C)]
pub struct XmlNodeSetRaw {
    pub node_nr: c_int,
    pub node_max: c_int,
    pub node_tab: *mut *mut XmlNodeRaw,
}

/// Layout of `struct _xmlXPathObject`
#[repr(C)]
pub struct XmlXPathObjectRaw {
    pub object_type: c_int,
    pub nodesetval: *mut XmlNodeSetRaw,
    pub boolval: c_int,
    pub floatval: f64,
    pub stringval: *mut c_uchar,
    pub user: *mut c_void,
    pub index: c_int,
    pub user2: *mut c_void,
    pub index2: c_int,
}

#[repr(C)]
pub struct XmlErrorRaw {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut XmlErrorRaw)>;

pub type XmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

// Parser options (xmlParserOption)
const XML_PARSE_RECOVER: c_int = 1 << 0;
const XML_PARSE_DTDATTR: c_int = 1 << 3;
const XML_PARSE_NOBLANKS: c_int = 1 << 8;
const XML_PARSE_XINCLUDE: c_int = 1 << 10;
const XML_PARSE_NONET: c_int = 1 << 11;
const XML_PARSE_NOXINCNODE: c_int = 1 << 15;
const XML_PARSE_NOBASEFIX: c_int = 1 << 18;
const XML_PARSE_HUGE: c_int = 1 << 19;

// xmlElementType values
const XML_ELEMENT_NODE: c_int = 1;
const XML_ATTRIBUTE_NODE: c_int = 2;
const XML_TEXT_NODE: c_int = 3;
const XML_CDATA_SECTION_NODE: c_int = 4;
const XML_COMMENT_NODE: c_int = 8;
const XML_DOCUMENT_NODE: c_int = 9;

// xmlXPathObjectType values
const XPATH_NODESET: c_int = 1;
const XPATH_BOOLEAN: c_int = 2;
const XPATH_NUMBER: c_int = 3;
const XPATH_STRING: c_int = 4;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub static xmlFree: XmlFreeFunc;

    pub fn xmlInitParser();

    // Documents
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDocRaw;
    pub fn xmlReadFile(
        filename: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDocRaw;
    pub fn xmlFreeDoc(doc: *mut XmlDocRaw);
    pub fn xmlCopyDoc(doc: *mut XmlDocRaw, recursive: c_int) -> *mut XmlDocRaw;
    pub fn xmlDocGetRootElement(doc: *const XmlDocRaw) -> *mut XmlNodeRaw;
    pub fn xmlDocDumpFormatMemory(
        doc: *mut XmlDocRaw,
        mem: *mut *mut c_uchar,
        size: *mut c_int,
        format: c_int,
    );
    pub fn xmlXIncludeProcessFlags(doc: *mut XmlDocRaw, flags: c_int) -> c_int;

    // Tree manipulation
    pub fn xmlNewDocNode(
        doc: *mut XmlDocRaw,
        ns: *mut c_void,
        name: *const c_uchar,
        content: *const c_uchar,
    ) -> *mut XmlNodeRaw;
    pub fn xmlNewDocText(doc: *const XmlDocRaw, content: *const c_uchar) -> *mut XmlNodeRaw;
    pub fn xmlAddChild(parent: *mut XmlNodeRaw, cur: *mut XmlNodeRaw) -> *mut XmlNodeRaw;
    pub fn xmlAddPrevSibling(cur: *mut XmlNodeRaw, elem: *mut XmlNodeRaw) -> *mut XmlNodeRaw;
    pub fn xmlAddNextSibling(cur: *mut XmlNodeRaw, elem: *mut XmlNodeRaw) -> *mut XmlNodeRaw;
    pub fn xmlUnlinkNode(cur: *mut XmlNodeRaw);
    pub fn xmlFreeNode(cur: *mut XmlNodeRaw);
    pub fn xmlReplaceNode(old: *mut XmlNodeRaw, cur: *mut XmlNodeRaw) -> *mut XmlNodeRaw;
    pub fn xmlDocCopyNode(
        node: *mut XmlNodeRaw,
        doc: *mut XmlDocRaw,
        extended: c_int,
    ) -> *mut XmlNodeRaw;
    pub fn xmlSetProp(
        node: *mut XmlNodeRaw,
        name: *const c_uchar,
        value: *const c_uchar,
    ) -> *mut XmlAttrRaw;
    pub fn xmlUnsetProp(node: *mut XmlNodeRaw, name: *const c_uchar) -> c_int;
    pub fn xmlGetProp(node: *const XmlNodeRaw, name: *const c_uchar) -> *mut c_uchar;
    pub fn xmlHasProp(node: *const XmlNodeRaw, name: *const c_uchar) -> *mut XmlAttrRaw;
    pub fn xmlNodeGetContent(cur: *const XmlNodeRaw) -> *mut c_uchar;
    pub fn xmlGetNodePath(node: *const XmlNodeRaw) -> *mut c_uchar;

    // Serialization of single nodes
    pub fn xmlBufferCreate() -> *mut XmlBufferRaw;
    pub fn xmlBufferFree(buf: *mut XmlBufferRaw);
    pub fn xmlBufferContent(buf: *const XmlBufferRaw) -> *const c_uchar;
    pub fn xmlNodeDump(
        buf: *mut XmlBufferRaw,
        doc: *mut XmlDocRaw,
        cur: *mut XmlNodeRaw,
        level: c_int,
        format: c_int,
    ) -> c_int;

    // XPath
    pub fn xmlXPathNewContext(doc: *mut XmlDocRaw) -> *mut XmlXPathContextRaw;
    pub fn xmlXPathFreeContext(ctxt: *mut XmlXPathContextRaw);
    pub fn xmlXPathSetContextNode(node: *mut XmlNodeRaw, ctx: *mut XmlXPathContextRaw) -> c_int;
    pub fn xmlXPathRegisterVariable(
        ctxt: *mut XmlXPathContextRaw,
        name: *const c_uchar,
        value: *mut XmlXPathObjectRaw,
    ) -> c_int;
    pub fn xmlXPathNewString(val: *const c_uchar) -> *mut XmlXPathObjectRaw;
    pub fn xmlXPathNewFloat(val: f64) -> *mut XmlXPathObjectRaw;
    pub fn xmlXPathEval(
        expr: *const c_uchar,
        ctxt: *mut XmlXPathContextRaw,
    ) -> *mut XmlXPathObjectRaw;
    pub fn xmlXPathFreeObject(obj: *mut XmlXPathObjectRaw);
    pub fn xmlXPathCompile(expr: *const c_uchar) -> *mut XmlXPathCompExprRaw;
    pub fn xmlXPathFreeCompExpr(comp: *mut XmlXPathCompExprRaw);

    // Error handling
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Schema parsing functions
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxtRaw;
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxtRaw;
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxtRaw) -> *mut XmlSchemaRaw;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxtRaw);
    pub fn xmlSchemaFree(schema: *mut XmlSchemaRaw);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchemaRaw) -> *mut XmlSchemaValidCtxtRaw;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxtRaw);
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxtRaw, doc: *mut XmlDocRaw) -> c_int;
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxtRaw,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut XmlErrorRaw) {
    let errors = unsafe { &mut *(user_data as *mut Vec<String>) };

    if !error.is_null() {
        let msg_ptr = unsafe { (*error).message };
        if !msg_ptr.is_null() {
            let c_str = unsafe { CStr::from_ptr(msg_ptr) };
            if let Ok(s) = c_str.to_str() {
                errors.push(s.trim().to_string());
            }
        }
    }
}

/// Routes libxml2 error reports of the current thread into a vector while alive
struct ErrorCapture {
    errors: Box<Vec<String>>,
}

impl ErrorCapture {
    fn start() -> Self {
        let mut errors = Box::new(Vec::new());
        let errors_ptr = &mut *errors as *mut Vec<String> as *mut c_void;
        unsafe {
            xmlSetStructuredErrorFunc(errors_ptr, Some(structured_error_callback));
        }
        ErrorCapture { errors }
    }

    fn finish(mut self) -> Vec<String> {
        std::mem::take(&mut *self.errors)
    }
}

impl Drop for ErrorCapture {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
        }
    }
}

unsafe fn free_xml(mem: *mut c_void) {
    if mem.is_null() {
        return;
    }
    if let Some(free) = unsafe { xmlFree } {
        unsafe { free(mem) };
    }
}

/// Copy a libxml2-allocated string and release the original
unsafe fn take_xml_string(value: *mut c_uchar) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let owned = unsafe { CStr::from_ptr(value as *const c_char) }
        .to_string_lossy()
        .into_owned();
    unsafe { free_xml(value as *mut c_void) };
    Some(owned)
}

unsafe fn borrowed_xml_string(value: *const c_uchar) -> String {
    if value.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(value as *const c_char) }
        .to_string_lossy()
        .into_owned()
}

fn c_string(value: &str) -> LibXml2Result<CString> {
    CString::new(value).map_err(|_| LibXml2Error::InteriorNul(value.to_string()))
}

/// Options applied when parsing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Expand DTD default attributes into the tree
    pub default_attributes: bool,
    /// Keep going on well-formedness errors
    pub recover: bool,
    /// Drop whitespace-only text nodes between elements
    pub remove_blank_text: bool,
    /// Expand `xi:include` elements after parsing
    pub xinclude: bool,
    /// Remove comment nodes after parsing
    pub strip_comments: bool,
    /// Forbid network access while resolving external resources
    pub no_network: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_attributes: true,
            recover: false,
            remove_blank_text: true,
            xinclude: true,
            strip_comments: true,
            no_network: true,
        }
    }
}

impl ParseOptions {
    /// Options for plain documents such as schema files
    pub fn plain() -> Self {
        Self {
            default_attributes: false,
            recover: false,
            remove_blank_text: true,
            xinclude: false,
            strip_comments: true,
            no_network: true,
        }
    }

    pub fn with_recover(mut self, recover: bool) -> Self {
        self.recover = recover;
        self
    }

    fn flags(&self) -> c_int {
        let mut flags = XML_PARSE_HUGE;
        if self.default_attributes {
            flags |= XML_PARSE_DTDATTR;
        }
        if self.recover {
            flags |= XML_PARSE_RECOVER;
        }
        if self.remove_blank_text {
            flags |= XML_PARSE_NOBLANKS;
        }
        if self.xinclude {
            flags |= XML_PARSE_XINCLUDE | XML_PARSE_NOXINCNODE | XML_PARSE_NOBASEFIX;
        }
        if self.no_network {
            flags |= XML_PARSE_NONET;
        }
        flags
    }
}

/// Literal values bound to XPath variables
#[derive(Debug, Clone, PartialEq)]
pub enum XPathLiteral {
    String(String),
    Number(f64),
}

impl XPathLiteral {
    /// Render the literal as it would appear inline in an XPath expression
    pub fn to_xpath_text(&self) -> String {
        match self {
            XPathLiteral::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    format!("{}", value)
                }
            }
            XPathLiteral::String(value) => {
                if value.contains('\'') {
                    format!("\"{}\"", value)
                } else {
                    format!("'{}'", value)
                }
            }
        }
    }
}

/// Variable bindings for an XPath evaluation
pub type XPathVariables = BTreeMap<String, XPathLiteral>;

/// Result of an XPath evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<N> {
    Nodes(Vec<N>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl<N> XPathValue<N> {
    /// Node results, empty for non node-set results
    pub fn into_nodes(self) -> Vec<N> {
        match self {
            XPathValue::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }

    fn map_nodes<M>(self, f: impl Fn(N) -> M) -> XPathValue<M> {
        match self {
            XPathValue::Nodes(nodes) => XPathValue::Nodes(nodes.into_iter().map(f).collect()),
            XPathValue::Boolean(value) => XPathValue::Boolean(value),
            XPathValue::Number(value) => XPathValue::Number(value),
            XPathValue::String(value) => XPathValue::String(value),
        }
    }
}

/// Frees the XPath context on all exit paths
struct XPathContextGuard(*mut XmlXPathContextRaw);

impl Drop for XPathContextGuard {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlXPathFreeContext(self.0) };
        }
    }
}

/// Check that an expression compiles as XPath 1.0
pub fn compile_check(expression: &str) -> LibXml2Result<()> {
    init_libxml2();
    let c_expr = c_string(expression)?;
    let capture = ErrorCapture::start();
    let compiled = unsafe { xmlXPathCompile(c_expr.as_ptr() as *const c_uchar) };
    let errors = capture.finish();
    if compiled.is_null() {
        return Err(LibXml2Error::XPathFailed {
            expression: expression.to_string(),
            errors,
        });
    }
    unsafe { xmlXPathFreeCompExpr(compiled) };
    Ok(())
}

unsafe fn eval_raw(
    node: *mut XmlNodeRaw,
    expression: &str,
    variables: &XPathVariables,
) -> LibXml2Result<XPathValue<*mut XmlNodeRaw>> {
    let c_expr = c_string(expression)?;
    let doc = unsafe { (*node).doc };

    let ctx = XPathContextGuard(unsafe { xmlXPathNewContext(doc) });
    if ctx.0.is_null() {
        return Err(LibXml2Error::MemoryAllocation);
    }
    unsafe { xmlXPathSetContextNode(node, ctx.0) };

    for (name, literal) in variables {
        let c_name = c_string(name)?;
        let object = match literal {
            XPathLiteral::String(value) => {
                let c_value = c_string(value)?;
                unsafe { xmlXPathNewString(c_value.as_ptr() as *const c_uchar) }
            }
            XPathLiteral::Number(value) => unsafe { xmlXPathNewFloat(*value) },
        };
        if object.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        // The context takes ownership of the registered object
        unsafe { xmlXPathRegisterVariable(ctx.0, c_name.as_ptr() as *const c_uchar, object) };
    }

    let capture = ErrorCapture::start();
    let result = unsafe { xmlXPathEval(c_expr.as_ptr() as *const c_uchar, ctx.0) };
    let errors = capture.finish();

    if result.is_null() {
        return Err(LibXml2Error::XPathFailed {
            expression: expression.to_string(),
            errors,
        });
    }

    let value = unsafe {
        match (*result).object_type {
            XPATH_NODESET => {
                let mut nodes = Vec::new();
                let set = (*result).nodesetval;
                if !set.is_null() {
                    for index in 0..(*set).node_nr.max(0) as usize {
                        let item = *(*set).node_tab.add(index);
                        if item.is_null() {
                            continue;
                        }
                        match (*item).node_type {
                            XML_ELEMENT_NODE | XML_ATTRIBUTE_NODE | XML_TEXT_NODE
                            | XML_CDATA_SECTION_NODE | XML_COMMENT_NODE => nodes.push(item),
                            _ => {}
                        }
                    }
                }
                XPathValue::Nodes(nodes)
            }
            XPATH_BOOLEAN => XPathValue::Boolean((*result).boolval != 0),
            XPATH_NUMBER => XPathValue::Number((*result).floatval),
            XPATH_STRING => XPathValue::String(borrowed_xml_string((*result).stringval)),
            other => {
                xmlXPathFreeObject(result);
                return Err(LibXml2Error::XPathFailed {
                    expression: expression.to_string(),
                    errors: vec![format!("unsupported XPath result type {}", other)],
                });
            }
        }
    };
    unsafe { xmlXPathFreeObject(result) };
    Ok(value)
}

/// Kind of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
    Comment,
    Document,
    Other,
}

impl NodeKind {
    fn from_raw(node_type: c_int) -> Self {
        match node_type {
            XML_ELEMENT_NODE => NodeKind::Element,
            XML_ATTRIBUTE_NODE => NodeKind::Attribute,
            XML_TEXT_NODE | XML_CDATA_SECTION_NODE => NodeKind::Text,
            XML_COMMENT_NODE => NodeKind::Comment,
            XML_DOCUMENT_NODE => NodeKind::Document,
            _ => NodeKind::Other,
        }
    }
}

/// A parsed XML document owned by this process
pub struct XmlDocument {
    ptr: *mut XmlDocRaw,
    source_name: String,
    parse_errors: Vec<String>,
    removed: RefCell<Vec<*mut XmlNodeRaw>>,
}

impl std::fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlDocument")
            .field("source_name", &self.source_name)
            .field("parse_errors", &self.parse_errors)
            .finish()
    }
}

impl XmlDocument {
    /// Parse a document from memory; `base_url` is used to resolve relative XIncludes
    pub fn parse_bytes(
        data: &[u8],
        base_url: Option<&str>,
        options: ParseOptions,
    ) -> LibXml2Result<Self> {
        init_libxml2();
        let c_url = base_url.map(c_string).transpose()?;
        let source_name = base_url.unwrap_or("<memory>").to_string();

        let capture = ErrorCapture::start();
        let ptr = unsafe {
            xmlReadMemory(
                data.as_ptr() as *const c_char,
                data.len() as c_int,
                c_url.as_ref().map_or(ptr::null(), |url| url.as_ptr()),
                ptr::null(),
                options.flags(),
            )
        };
        let errors = capture.finish();

        Self::finish_parse(ptr, source_name, errors, options)
    }

    /// Parse a document from a string
    pub fn parse_str(xml: &str) -> LibXml2Result<Self> {
        Self::parse_bytes(xml.as_bytes(), None, ParseOptions::default())
    }

    /// Parse a document from a file
    pub fn parse_file(path: &Path, options: ParseOptions) -> LibXml2Result<Self> {
        init_libxml2();
        let path_str = path.to_str().ok_or_else(|| LibXml2Error::DocumentParseFailed {
            source_name: path.display().to_string(),
            errors: vec!["path is not valid UTF-8".to_string()],
        })?;
        let c_path = c_string(path_str)?;

        let capture = ErrorCapture::start();
        let ptr = unsafe { xmlReadFile(c_path.as_ptr(), ptr::null(), options.flags()) };
        let errors = capture.finish();

        Self::finish_parse(ptr, path_str.to_string(), errors, options)
    }

    fn finish_parse(
        ptr: *mut XmlDocRaw,
        source_name: String,
        errors: Vec<String>,
        options: ParseOptions,
    ) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                source_name,
                errors,
            });
        }
        let mut document = XmlDocument {
            ptr,
            source_name,
            parse_errors: errors,
            removed: RefCell::new(Vec::new()),
        };
        if unsafe { xmlDocGetRootElement(ptr) }.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                source_name: document.source_name.clone(),
                errors: vec!["document has no root element".to_string()],
            });
        }
        if options.xinclude {
            document.process_xincludes(options)?;
        }
        if options.strip_comments {
            document.strip_comments();
        }
        Ok(document)
    }

    /// Expand all XInclude elements in place, returning the number of substitutions
    pub fn process_xincludes(&mut self, options: ParseOptions) -> LibXml2Result<usize> {
        let capture = ErrorCapture::start();
        let result = unsafe { xmlXIncludeProcessFlags(self.ptr, options.flags()) };
        let errors = capture.finish();
        if result < 0 {
            return Err(LibXml2Error::XIncludeFailed { errors });
        }
        Ok(result as usize)
    }

    /// Remove every comment node from the document
    pub fn strip_comments(&mut self) {
        let root = unsafe { xmlDocGetRootElement(self.ptr) };
        if root.is_null() {
            return;
        }
        let mut comments = Vec::new();
        unsafe { collect_comments(root, &mut comments) };
        for comment in comments {
            unsafe {
                xmlUnlinkNode(comment);
                xmlFreeNode(comment);
            }
        }
    }

    /// Errors reported while parsing (non-empty only for recovered documents)
    pub fn parse_errors(&self) -> &[String] {
        &self.parse_errors
    }

    /// Name of the parsed source (file name, base URL or `<memory>`)
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// The root element of the document
    pub fn root(&self) -> XmlNode<'_> {
        XmlNode::from_raw(unsafe { xmlDocGetRootElement(self.ptr) })
    }

    /// The root element of the document as a mutable handle
    pub fn root_mut(&mut self) -> XmlNodeMut<'_> {
        XmlNodeMut::from_raw(unsafe { xmlDocGetRootElement(self.ptr) }, &self.removed)
    }

    /// Serialize the document (pretty printed)
    pub fn to_xml_string(&self) -> String {
        let mut buffer: *mut c_uchar = ptr::null_mut();
        let mut size: c_int = 0;
        unsafe {
            xmlDocDumpFormatMemory(self.ptr, &mut buffer, &mut size, 1);
            take_xml_string(buffer).unwrap_or_default()
        }
    }

    /// Write the serialized document to a file
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_xml_string())
    }

    /// Validate the document against a compiled XML schema
    pub fn validate(&self, schema: &XmlSchemaPtr) -> LibXml2Result<ValidationResult> {
        schema.validate_document(self)
    }
}

unsafe fn collect_comments(node: *mut XmlNodeRaw, comments: &mut Vec<*mut XmlNodeRaw>) {
    let mut child = unsafe { (*node).children };
    while !child.is_null() {
        match unsafe { (*child).node_type } {
            XML_COMMENT_NODE => comments.push(child),
            XML_ELEMENT_NODE => unsafe { collect_comments(child, comments) },
            _ => {}
        }
        child = unsafe { (*child).next };
    }
}

impl Clone for XmlDocument {
    fn clone(&self) -> Self {
        let ptr = unsafe { xmlCopyDoc(self.ptr, 1) };
        assert!(!ptr.is_null(), "libxml2 failed to copy a document");
        XmlDocument {
            ptr,
            source_name: self.source_name.clone(),
            parse_errors: self.parse_errors.clone(),
            removed: RefCell::new(Vec::new()),
        }
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        // Removed nodes that were put back into a tree are freed with that tree
        let mut detached: Vec<*mut XmlNodeRaw> = std::mem::take(self.removed.get_mut())
            .into_iter()
            .filter(|&node| unsafe { (*node).parent }.is_null())
            .collect();
        detached.sort_unstable();
        detached.dedup();
        for node in detached {
            unsafe { xmlFreeNode(node) };
        }
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// Read-only operations shared by both handle types
unsafe fn raw_name(node: *mut XmlNodeRaw) -> String {
    unsafe { borrowed_xml_string((*node).name) }
}

unsafe fn raw_element_children(node: *mut XmlNodeRaw) -> Vec<*mut XmlNodeRaw> {
    let mut children = Vec::new();
    let mut child = unsafe { (*node).children };
    while !child.is_null() {
        if unsafe { (*child).node_type } == XML_ELEMENT_NODE {
            children.push(child);
        }
        child = unsafe { (*child).next };
    }
    children
}

unsafe fn raw_text(node: *mut XmlNodeRaw) -> Option<String> {
    let mut text: Option<String> = None;
    let mut child = unsafe { (*node).children };
    while !child.is_null() {
        match unsafe { (*child).node_type } {
            XML_TEXT_NODE | XML_CDATA_SECTION_NODE => {
                let chunk = unsafe { borrowed_xml_string((*child).content) };
                text.get_or_insert_with(String::new).push_str(&chunk);
            }
            _ => break,
        }
        child = unsafe { (*child).next };
    }
    text
}

unsafe fn raw_attribute(node: *mut XmlNodeRaw, name: &str) -> Option<String> {
    let c_name = c_string(name).ok()?;
    unsafe {
        let attr = xmlHasProp(node, c_name.as_ptr() as *const c_uchar);
        if attr.is_null() {
            return None;
        }
        take_xml_string(xmlGetProp(node, c_name.as_ptr() as *const c_uchar))
    }
}

unsafe fn raw_attributes(node: *mut XmlNodeRaw) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    if unsafe { (*node).node_type } != XML_ELEMENT_NODE {
        return attributes;
    }
    let mut attr = unsafe { (*node).properties };
    while !attr.is_null() {
        unsafe {
            let name = borrowed_xml_string((*attr).name);
            let value = take_xml_string(xmlNodeGetContent(attr as *const XmlNodeRaw))
                .unwrap_or_default();
            attributes.push((name, value));
            attr = (*attr).next;
        }
    }
    attributes
}

unsafe fn raw_parent(node: *mut XmlNodeRaw) -> Option<*mut XmlNodeRaw> {
    let parent = unsafe { (*node).parent };
    if parent.is_null() || unsafe { (*parent).node_type } != XML_ELEMENT_NODE {
        None
    } else {
        Some(parent)
    }
}

unsafe fn raw_dump(node: *mut XmlNodeRaw) -> String {
    unsafe {
        let buffer = xmlBufferCreate();
        if buffer.is_null() {
            return String::new();
        }
        xmlNodeDump(buffer, (*node).doc, node, 0, 1);
        let content = borrowed_xml_string(xmlBufferContent(buffer));
        xmlBufferFree(buffer);
        content
    }
}

/// Copyable read-only handle to a node of an [`XmlDocument`]
#[derive(Clone, Copy)]
pub struct XmlNode<'d> {
    ptr: *mut XmlNodeRaw,
    _doc: PhantomData<&'d XmlDocument>,
}

impl PartialEq for XmlNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for XmlNode<'_> {}

impl std::fmt::Debug for XmlNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "XmlNode({})", self.node_path())
    }
}

impl<'d> XmlNode<'d> {
    fn from_raw(ptr: *mut XmlNodeRaw) -> Self {
        XmlNode {
            ptr,
            _doc: PhantomData,
        }
    }

    /// Kind of node
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_raw(unsafe { (*self.ptr).node_type })
    }

    /// Local name of the element or attribute
    pub fn name(&self) -> String {
        unsafe { raw_name(self.ptr) }
    }

    /// Parent element (the owning element for attribute nodes)
    pub fn parent(&self) -> Option<XmlNode<'d>> {
        unsafe { raw_parent(self.ptr) }.map(XmlNode::from_raw)
    }

    /// Whether this is the root element of its document
    pub fn is_root(&self) -> bool {
        let parent = unsafe { (*self.ptr).parent };
        self.kind() == NodeKind::Element
            && !parent.is_null()
            && unsafe { (*parent).node_type } == XML_DOCUMENT_NODE
    }

    /// Element children in document order
    pub fn children(&self) -> Vec<XmlNode<'d>> {
        unsafe { raw_element_children(self.ptr) }
            .into_iter()
            .map(XmlNode::from_raw)
            .collect()
    }

    /// Value of an attribute of this element
    pub fn attribute(&self, name: &str) -> Option<String> {
        unsafe { raw_attribute(self.ptr, name) }
    }

    /// All attributes of this element in document order
    pub fn attributes(&self) -> Vec<(String, String)> {
        unsafe { raw_attributes(self.ptr) }
    }

    /// Text before the first child element
    pub fn text(&self) -> Option<String> {
        unsafe { raw_text(self.ptr) }
    }

    /// Full string value of the node (attribute value for attribute nodes)
    pub fn content(&self) -> String {
        unsafe { take_xml_string(xmlNodeGetContent(self.ptr)) }.unwrap_or_default()
    }

    /// Location of the node for diagnostics, e.g. `/fleurInput/atomSpecies/species[2]`
    pub fn node_path(&self) -> String {
        unsafe { take_xml_string(xmlGetNodePath(self.ptr)) }.unwrap_or_default()
    }

    /// Serialize the subtree rooted at this node
    pub fn to_xml_string(&self) -> String {
        unsafe { raw_dump(self.ptr) }
    }

    /// Evaluate an XPath expression with this node as the context node
    pub fn xpath(
        &self,
        expression: &str,
        variables: &XPathVariables,
    ) -> LibXml2Result<XPathValue<XmlNode<'d>>> {
        Ok(unsafe { eval_raw(self.ptr, expression, variables) }?.map_nodes(XmlNode::from_raw))
    }

    /// Evaluate an XPath expression and return the matched nodes
    pub fn xpath_nodes(
        &self,
        expression: &str,
        variables: &XPathVariables,
    ) -> LibXml2Result<Vec<XmlNode<'d>>> {
        Ok(self.xpath(expression, variables)?.into_nodes())
    }

    pub(crate) fn raw(&self) -> *mut XmlNodeRaw {
        self.ptr
    }
}

/// Copyable handle to a node that may mutate the tree
///
/// Obtained from [`XmlDocument::root_mut`]; all handles share the exclusive borrow of the
/// document. A removed node stays allocated, detached, until the document is dropped.
#[derive(Clone, Copy)]
pub struct XmlNodeMut<'d> {
    ptr: *mut XmlNodeRaw,
    removed: &'d RefCell<Vec<*mut XmlNodeRaw>>,
    _doc: PhantomData<&'d mut XmlDocument>,
}

impl PartialEq for XmlNodeMut<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for XmlNodeMut<'_> {}

impl std::fmt::Debug for XmlNodeMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "XmlNodeMut({})", self.as_node().node_path())
    }
}

impl<'d> XmlNodeMut<'d> {
    fn from_raw(ptr: *mut XmlNodeRaw, removed: &'d RefCell<Vec<*mut XmlNodeRaw>>) -> Self {
        XmlNodeMut {
            ptr,
            removed,
            _doc: PhantomData,
        }
    }

    fn wrap(&self, ptr: *mut XmlNodeRaw) -> XmlNodeMut<'d> {
        XmlNodeMut::from_raw(ptr, self.removed)
    }

    /// Read-only view of this node
    pub fn as_node(&self) -> XmlNode<'d> {
        XmlNode::from_raw(self.ptr)
    }

    pub fn name(&self) -> String {
        self.as_node().name()
    }

    pub fn kind(&self) -> NodeKind {
        self.as_node().kind()
    }

    pub fn parent(&self) -> Option<XmlNodeMut<'d>> {
        unsafe { raw_parent(self.ptr) }.map(|parent| self.wrap(parent))
    }

    pub fn children(&self) -> Vec<XmlNodeMut<'d>> {
        unsafe { raw_element_children(self.ptr) }
            .into_iter()
            .map(|child| self.wrap(child))
            .collect()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.as_node().attribute(name)
    }

    pub fn text(&self) -> Option<String> {
        self.as_node().text()
    }

    /// Evaluate an XPath expression and return mutable handles to the matched nodes
    pub fn xpath_nodes(
        &self,
        expression: &str,
        variables: &XPathVariables,
    ) -> LibXml2Result<Vec<XmlNodeMut<'d>>> {
        Ok(unsafe { eval_raw(self.ptr, expression, variables) }?
            .map_nodes(|node| self.wrap(node))
            .into_nodes())
    }

    /// Set (or create) an attribute
    pub fn set_attribute(&self, name: &str, value: &str) -> LibXml2Result<()> {
        let c_name = c_string(name)?;
        let c_value = c_string(value)?;
        let attr = unsafe {
            xmlSetProp(
                self.ptr,
                c_name.as_ptr() as *const c_uchar,
                c_value.as_ptr() as *const c_uchar,
            )
        };
        if attr.is_null() {
            return Err(LibXml2Error::InvalidXml {
                details: format!("could not set attribute '{}'", name),
            });
        }
        Ok(())
    }

    /// Remove an attribute, returning whether it existed
    pub fn remove_attribute(&self, name: &str) -> LibXml2Result<bool> {
        let c_name = c_string(name)?;
        Ok(unsafe { xmlUnsetProp(self.ptr, c_name.as_ptr() as *const c_uchar) } == 0)
    }

    /// Replace the text content of this element
    pub fn set_text(&self, text: &str) -> LibXml2Result<()> {
        let c_text = c_string(text)?;
        unsafe {
            let mut child = (*self.ptr).children;
            while !child.is_null() {
                let next = (*child).next;
                if matches!(
                    (*child).node_type,
                    XML_TEXT_NODE | XML_CDATA_SECTION_NODE
                ) {
                    xmlUnlinkNode(child);
                    xmlFreeNode(child);
                }
                child = next;
            }
            let text_node = xmlNewDocText((*self.ptr).doc, c_text.as_ptr() as *const c_uchar);
            if text_node.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            let first = (*self.ptr).children;
            if first.is_null() {
                xmlAddChild(self.ptr, text_node);
            } else {
                xmlAddPrevSibling(first, text_node);
            }
        }
        Ok(())
    }

    /// Create a new, unattached element in the same document
    pub fn new_element(&self, name: &str) -> LibXml2Result<XmlNodeMut<'d>> {
        let c_name = c_string(name)?;
        let node = unsafe {
            xmlNewDocNode(
                (*self.ptr).doc,
                ptr::null_mut(),
                c_name.as_ptr() as *const c_uchar,
                ptr::null(),
            )
        };
        if node.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        Ok(self.wrap(node))
    }

    /// Deep copy of `source` (from any document) as an unattached node of this document
    pub fn import_copy(&self, source: XmlNode<'_>) -> LibXml2Result<XmlNodeMut<'d>> {
        let node = unsafe { xmlDocCopyNode(source.raw(), (*self.ptr).doc, 1) };
        if node.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        Ok(self.wrap(node))
    }

    /// Append `child` as last child
    pub fn append_child(&self, child: XmlNodeMut<'d>) {
        unsafe {
            xmlUnlinkNode(child.ptr);
            xmlAddChild(self.ptr, child.ptr);
        }
    }

    /// Insert `child` as first child
    pub fn prepend_child(&self, child: XmlNodeMut<'d>) {
        unsafe {
            xmlUnlinkNode(child.ptr);
            let first = (*self.ptr).children;
            if first.is_null() {
                xmlAddChild(self.ptr, child.ptr);
            } else {
                xmlAddPrevSibling(first, child.ptr);
            }
        }
    }

    /// Insert `sibling` directly after this node
    pub fn insert_after(&self, sibling: XmlNodeMut<'d>) {
        unsafe {
            xmlUnlinkNode(sibling.ptr);
            xmlAddNextSibling(self.ptr, sibling.ptr);
        }
    }

    /// Detach the node from the tree without freeing it
    pub fn detach(&self) {
        unsafe { xmlUnlinkNode(self.ptr) };
    }

    /// Detach the node (and its subtree) for good; it is freed with the document
    pub fn remove(self) {
        unsafe { xmlUnlinkNode(self.ptr) };
        self.removed.borrow_mut().push(self.ptr);
    }

    /// Put `replacement` in place of this node and remove this node
    pub fn replace_with(self, replacement: XmlNodeMut<'d>) {
        if replacement.ptr == self.ptr {
            return;
        }
        if unsafe { (*self.ptr).parent }.is_null() {
            return;
        }
        unsafe {
            xmlUnlinkNode(replacement.ptr);
            xmlReplaceNode(self.ptr, replacement.ptr);
        }
        self.removed.borrow_mut().push(self.ptr);
    }

    /// Whether `other` lies inside the subtree of this node (the node itself excluded)
    pub fn is_ancestor_of(&self, other: &XmlNodeMut<'_>) -> bool {
        let mut current = unsafe { (*other.ptr).parent };
        while !current.is_null() {
            if current == self.ptr {
                return true;
            }
            current = unsafe { (*current).parent };
        }
        false
    }
}

/// Outermost nodes of a selection, without duplicates, in selection order
///
/// Nodes below another selected node are dropped, since removing or replacing the ancestor
/// already takes them along.
pub fn outermost_nodes<'d>(nodes: Vec<XmlNodeMut<'d>>) -> Vec<XmlNodeMut<'d>> {
    let mut outermost: Vec<XmlNodeMut<'d>> = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        let covered = outermost.contains(node)
            || nodes
                .iter()
                .enumerate()
                .any(|(other_index, other)| other_index != index && other.is_ancestor_of(node));
        if !covered {
            outermost.push(*node);
        }
    }
    outermost
}

/// Thread-safe wrapper for libxml2 schema pointer with proper resource management
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchemaRaw,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// Compile an XML schema from a file (relative includes resolve against its location)
    pub fn from_file(path: &Path) -> LibXml2Result<Self> {
        init_libxml2();
        let path_str = path.to_str().ok_or_else(|| LibXml2Error::SchemaParseFailed {
            errors: vec![format!("path is not valid UTF-8: {}", path.display())],
        })?;
        let c_path = c_string(path_str)?;
        unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            Self::parse_with(parser_ctxt)
        }
    }

    /// Compile an XML schema from a memory buffer
    pub fn from_memory(schema_data: &[u8]) -> LibXml2Result<Self> {
        init_libxml2();
        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(
                schema_data.as_ptr() as *const c_char,
                schema_data.len() as c_int,
            );
            Self::parse_with(parser_ctxt)
        }
    }

    unsafe fn parse_with(parser_ctxt: *mut XmlSchemaParserCtxtRaw) -> LibXml2Result<Self> {
        if parser_ctxt.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }

        let capture = ErrorCapture::start();
        let schema_ptr = unsafe { xmlSchemaParse(parser_ctxt) };
        let errors = capture.finish();

        // Always free the parser context
        unsafe { xmlSchemaFreeParserCtxt(parser_ctxt) };

        if schema_ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed { errors });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner { ptr: schema_ptr }),
        })
    }

    /// Validate a parsed document against this schema
    pub fn validate_document(&self, document: &XmlDocument) -> LibXml2Result<ValidationResult> {
        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(self.inner.ptr);
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut errors = Vec::new();
            let errors_ptr = &mut errors as *mut Vec<String> as *mut c_void;
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                errors_ptr,
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, document.ptr);

            // Always free the validation context
            xmlSchemaFreeValidCtxt(valid_ctxt);

            Ok(ValidationResult::from_code(result_code, errors))
        }
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

/// Validation result from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        errors: Vec<String>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    /// Create ValidationResult from libxml2 return code and captured errors
    pub fn from_code(code: c_int, errors: Vec<String>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                errors,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="item" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:attribute name="name" type="xs:string" use="required"/>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

    const DOCUMENT: &str = r#"<?xml version="1.0"?>
<root>
    <!-- a comment -->
    <item name="a"/>
    <item name="b">text</item>
</root>"#;

    #[test]
    fn test_parse_and_navigate() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "root");
        assert!(root.is_root());

        let children = root.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attribute("name").as_deref(), Some("a"));
        assert_eq!(children[1].text().as_deref(), Some("text"));
        assert_eq!(children[1].parent(), Some(root));
    }

    #[test]
    fn test_comments_are_stripped() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        assert!(!doc.to_xml_string().contains("a comment"));
    }

    #[test]
    fn test_malformed_document_fails() {
        let result = XmlDocument::parse_str("<root><unclosed></root>");
        match result {
            Err(LibXml2Error::DocumentParseFailed { errors, .. }) => assert!(!errors.is_empty()),
            other => panic!("Expected DocumentParseFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_recover_mode_keeps_document() {
        let options = ParseOptions::default().with_recover(true);
        let doc = XmlDocument::parse_bytes(b"<root><item name='a'></root>", None, options).unwrap();
        assert_eq!(doc.root().name(), "root");
        assert!(!doc.parse_errors().is_empty());
    }

    #[test]
    fn test_xpath_with_variables() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        let mut variables = XPathVariables::new();
        variables.insert("wanted".to_string(), XPathLiteral::String("b".to_string()));

        let nodes = doc
            .root()
            .xpath_nodes("/root/item[@name = $wanted]", &variables)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text().as_deref(), Some("text"));

        let count = doc.root().xpath("count(./item)", &XPathVariables::new()).unwrap();
        assert_eq!(count, XPathValue::Number(2.0));
    }

    #[test]
    fn test_xpath_attribute_nodes() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        let nodes = doc
            .root()
            .xpath_nodes("./item/@name", &XPathVariables::new())
            .unwrap();
        let values: Vec<String> = nodes.iter().map(|n| n.content()).collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(nodes[0].kind(), NodeKind::Attribute);
        assert_eq!(nodes[0].parent().unwrap().name(), "item");
    }

    #[test]
    fn test_invalid_xpath_is_reported() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        let result = doc.root().xpath("/root/item[", &XPathVariables::new());
        assert!(matches!(result, Err(LibXml2Error::XPathFailed { .. })));
        assert!(compile_check("/root/item[").is_err());
        assert!(compile_check("/root/item[@name=$x]").is_ok());
    }

    #[test]
    fn test_mutation() {
        let mut doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        {
            let root = doc.root_mut();
            let item = root.new_element("item").unwrap();
            item.set_attribute("name", "c").unwrap();
            root.prepend_child(item);

            let first = root.children()[0];
            assert_eq!(first.attribute("name").as_deref(), Some("c"));

            let last = *root.children().last().unwrap();
            last.set_text("changed").unwrap();
            assert!(last.remove_attribute("name").unwrap());
            root.children()[1].remove();
        }
        let names: Vec<Option<String>> = doc
            .root()
            .children()
            .iter()
            .map(|n| n.attribute("name"))
            .collect();
        assert_eq!(names, vec![Some("c".to_string()), None]);
        assert_eq!(doc.root().children()[1].text().as_deref(), Some("changed"));
    }

    #[test]
    fn test_removing_stale_and_nested_handles() {
        let mut doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        {
            let root = doc.root_mut();
            let item = root.children()[1];
            let copy = item;
            item.remove();
            copy.remove();
            assert!(copy.parent().is_none());

            let first = root.children()[0];
            let nodes = root.xpath_nodes("./item | ./item/@name", &XPathVariables::new()).unwrap();
            assert_eq!(nodes.len(), 2);
            assert_eq!(outermost_nodes(nodes), vec![first]);
            first.remove();
        }
        assert!(doc.root().children().is_empty());
        assert!(doc.to_xml_string().contains("<root"));
    }

    #[test]
    fn test_import_copy_between_documents() {
        let source = XmlDocument::parse_str("<other><item name='x'/></other>").unwrap();
        let mut doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        {
            let root = doc.root_mut();
            let copy = root.import_copy(source.root().children()[0]).unwrap();
            root.append_child(copy);
        }
        assert_eq!(doc.root().children().len(), 3);
        assert_eq!(
            doc.root().children()[2].attribute("name").as_deref(),
            Some("x")
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let doc = XmlDocument::parse_str(DOCUMENT).unwrap();
        let mut copy = doc.clone();
        copy.root_mut().children()[0].remove();
        assert_eq!(doc.root().children().len(), 2);
        assert_eq!(copy.root().children().len(), 1);
    }

    #[test]
    fn test_schema_validation() {
        let schema = XmlSchemaPtr::from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        let valid = XmlDocument::parse_str("<root><item name='a'/></root>").unwrap();
        assert!(valid.validate(&schema).unwrap().is_valid());

        let invalid = XmlDocument::parse_str("<root><item/></root>").unwrap();
        let result = invalid.validate(&schema).unwrap();
        assert!(result.is_invalid());
    }

    #[test]
    fn test_schema_parsing_invalid_schema() {
        let result = XmlSchemaPtr::from_memory(b"<invalid>not a schema</invalid>");
        assert!(matches!(
            result,
            Err(LibXml2Error::SchemaParseFailed { .. })
        ));
    }

    #[test]
    fn test_validation_result_from_code() {
        assert_eq!(
            ValidationResult::from_code(0, vec![]),
            ValidationResult::Valid
        );
        assert!(ValidationResult::from_code(5, vec![]).is_invalid());
        assert!(ValidationResult::from_code(-1, vec![]).is_error());
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(XPathLiteral::Number(2.0).to_xpath_text(), "2");
        assert_eq!(XPathLiteral::Number(2.5).to_xpath_text(), "2.5");
        assert_eq!(
            XPathLiteral::String("Fe-1".to_string()).to_xpath_text(),
            "'Fe-1'"
        );
    }
}
