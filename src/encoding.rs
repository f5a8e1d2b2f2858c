//! Shape encoding descriptors.
//!
//! Generated per-service code emits one of these per member of an input or
//! output shape; the request builder (`crate::request_builder`)
//! and response pipeline (`crate::response`) walk them to decide where a
//! value lives on the wire. The descriptors themselves carry no behavior —
//! they're plain data, matched by `crate::proto` and the builder/pipeline.

/// Where a shape member's value is carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// Substituted into a `{name}` (or `{name+}`, see `greedy`) placeholder
    /// in the operation's URI path template.
    Uri { name: &'static str, greedy: bool },
    /// Appended to the query string under `name`.
    QueryString { name: &'static str },
    /// A single string-encoded header.
    Header { name: &'static str },
    /// A map member; each entry becomes one header `{prefix}{key}`.
    HeaderPrefix { prefix: &'static str },
    /// Output-only: populated from the HTTP status code.
    StatusCode,
    /// The member is the request/response body, or nested under `name`.
    Body { name: Option<&'static str> },
    /// Substituted into the operation's host-prefix template before
    /// endpoint resolution.
    Hostname { name: &'static str },
}

/// How a list/map-shaped member is encoded on the wire, independent of
/// dialect (the dialect determines the concrete syntax; see
/// `crate::proto::dialect_collection_syntax`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeEncoding {
    /// Dialect-default encoding for this shape kind.
    Default,
    /// List with no wrapper element (restxml/restjson) or `key.N` (query).
    FlatList,
    /// List wrapped with a named member element / `key.member.N`.
    List { member: &'static str },
    /// Map with no wrapper; entries flattened into repeated key/value pairs.
    FlatMap { key: &'static str, value: &'static str },
    /// Map wrapped in a named entry element.
    Map {
        entry: &'static str,
        key: &'static str,
        value: &'static str,
    },
    /// Raw bytes, never run through the structured encoder.
    Blob,
}

bitflags_lite::bitflags! {
    /// Per-shape-type options controlling streaming/checksum behavior.
    pub struct ShapeOptions: u8 {
        const ALLOW_STREAMING = 0b0000_0001;
        const ALLOW_CHUNKED_STREAMING = 0b0000_0010;
        const RAW_PAYLOAD = 0b0000_0100;
        const CHECKSUM_HEADER = 0b0000_1000;
        const CHECKSUM_REQUIRED = 0b0001_0000;
        const MD5_CHECKSUM_HEADER = 0b0010_0000;
    }
}

/// One entry in a shape's encoding descriptor table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeEncodingDescriptor {
    pub label: &'static str,
    pub location: Option<Location>,
    pub shape_encoding: ShapeEncoding,
}

impl ShapeEncodingDescriptor {
    pub const fn new(label: &'static str, location: Option<Location>) -> Self {
        ShapeEncodingDescriptor {
            label,
            location,
            shape_encoding: ShapeEncoding::Default,
        }
    }

    pub const fn with_encoding(mut self, shape_encoding: ShapeEncoding) -> Self {
        self.shape_encoding = shape_encoding;
        self
    }
}

/// A minimal `bitflags`-shaped macro, written by hand to avoid pulling in
/// the `bitflags` crate for a single 6-bit set; kept private to this module
/// via an inline module so call sites still read like ordinary `bitflags!`
/// output (`ShapeOptions::ALLOW_STREAMING`, `.contains(...)`, `|`).
mod bitflags_lite {
    macro_rules! bitflags {
        (
            $(#[$outer:meta])*
            pub struct $name:ident: $t:ty {
                $(const $flag:ident = $value:expr;)*
            }
        ) => {
            $(#[$outer])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            pub struct $name($t);

            impl $name {
                $(pub const $flag: $name = $name($value);)*

                pub const fn empty() -> Self {
                    $name(0)
                }

                pub const fn contains(&self, other: $name) -> bool {
                    (self.0 & other.0) == other.0
                }
            }

            impl std::ops::BitOr for $name {
                type Output = $name;
                fn bitor(self, rhs: $name) -> $name {
                    $name(self.0 | rhs.0)
                }
            }

            impl std::ops::BitOrAssign for $name {
                fn bitor_assign(&mut self, rhs: $name) {
                    self.0 |= rhs.0;
                }
            }
        };
    }
    pub(crate) use bitflags;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_options_compose() {
        let opts = ShapeOptions::ALLOW_STREAMING | ShapeOptions::ALLOW_CHUNKED_STREAMING;
        assert!(opts.contains(ShapeOptions::ALLOW_STREAMING));
        assert!(opts.contains(ShapeOptions::ALLOW_CHUNKED_STREAMING));
        assert!(!opts.contains(ShapeOptions::CHECKSUM_REQUIRED));
    }

    #[test]
    fn descriptor_builder() {
        let d = ShapeEncodingDescriptor::new("Bucket", Some(Location::Uri { name: "Bucket", greedy: false }))
            .with_encoding(ShapeEncoding::Default);
        assert_eq!(d.label, "Bucket");
        assert_eq!(d.shape_encoding, ShapeEncoding::Default);
    }
}
