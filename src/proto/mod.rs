//! Wire codec facade.
//!
//! The four recognized wire dialects share one entry point per direction;
//! this module is a thin facade over `serde_json` for the JSON dialects and
//! over `xml-rs` for the XML/form dialects. The reflective mapping from a
//! shape's fields to JSON/XML/form structure (driven by
//! `crate::encoding::ShapeEncodingDescriptor`) is generated per service and
//! is out of scope here; this facade only supplies the dialect primitives
//! generated code calls into — encode/decode of whole documents, and
//! dialect-aware error-envelope detection (`error`) and success-root
//! unwrapping (`xml::unwrap_operation_result`).

pub mod json;
pub mod xml;

/// The wire dialect a service operation speaks. Distinct from
/// `ServiceConfig.service_protocol` naming in the spec only by Rust
/// convention (`CamelCase` variants instead of lowercase strings).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Json,
    RestJson,
    RestXml,
    Query,
    Ec2,
}

impl Dialect {
    pub fn is_json(&self) -> bool {
        matches!(self, Dialect::Json | Dialect::RestJson)
    }

    pub fn is_xml(&self) -> bool {
        matches!(self, Dialect::RestXml | Dialect::Query | Dialect::Ec2)
    }
}
