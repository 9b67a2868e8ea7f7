//! Core type definitions for the QFace semantic model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Annotation tags attached to a symbol, e.g. `@config(port: 1234)`.
pub type Tags = BTreeMap<String, serde_json::Value>;

pub const PRIMITIVE_TYPES: &[&str] = &["bool", "int", "real", "string", "var"];

/// Position of a declaration inside its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

/// A parsed source unit. Immutable once produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub path: PathBuf,
    pub module: ModuleDecl,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
}

impl Document {
    /// Paths referenced by `import` statements, as qualified module names.
    pub fn import_names(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|i| i.name.as_str())
    }
}

/// The `module a.b.c 1.0;` header of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDecl {
    pub name: String,
    pub version: Option<String>,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    pub version: Option<String>,
}

/// A top level type declaration, still detached from its module aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    Interface(Interface),
    Struct(Struct),
    Enum(Enum),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Interface(i) => &i.name,
            Declaration::Struct(s) => &s.name,
            Declaration::Enum(e) => &e.name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Declaration::Interface(i) => &i.location,
            Declaration::Struct(s) => &s.location,
            Declaration::Enum(e) => &e.location,
        }
    }
}

/// A named namespace aggregating declarations from one or more documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    pub version: Option<String>,
    pub imports: Vec<Import>,
    pub interfaces: Vec<Interface>,
    pub structs: Vec<Struct>,
    pub enums: Vec<Enum>,
    /// Documents that contributed to this module, in discovery order.
    pub documents: Vec<PathBuf>,
    pub comment: Option<String>,
    pub tags: Tags,
}

impl Module {
    /// Last segment of the qualified name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn name_parts(&self) -> Vec<&str> {
        self.name.split('.').collect()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn struct_(&self, name: &str) -> Option<&Struct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn enum_(&self, name: &str) -> Option<&Enum> {
        self.enums.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interface {
    pub name: String,
    pub extends: Option<String>,
    pub properties: Vec<Property>,
    pub operations: Vec<Operation>,
    pub signals: Vec<Signal>,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeRef,
    pub readonly: bool,
    #[serde(rename = "const")]
    pub const_: bool,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub name: String,
    pub return_type: TypeRef,
    pub parameters: Vec<Parameter>,
    #[serde(rename = "const")]
    pub const_: bool,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub name: String,
    pub fields: Vec<Field>,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeRef,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enum {
    pub name: String,
    /// `flag` declarations use bit values for implicit members.
    pub is_flag: bool,
    pub members: Vec<EnumMember>,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
    /// Whether the value was written in the document rather than derived.
    pub explicit: bool,
    pub comment: Option<String>,
    pub tags: Tags,
    pub location: Location,
}

/// A type reference as written in a document.
///
/// Resolution of complex names is deferred to [`crate::System::resolve`], so
/// forward references across documents are always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: None,
        }
    }

    pub fn container(name: impl Into<String>, nested: TypeRef) -> Self {
        Self {
            name: name.into(),
            nested: Some(Box::new(nested)),
        }
    }

    pub fn void() -> Self {
        Self::simple("void")
    }

    pub fn is_void(&self) -> bool {
        self.name == "void"
    }

    pub fn is_primitive(&self) -> bool {
        PRIMITIVE_TYPES.contains(&self.name.as_str())
    }

    pub fn is_list(&self) -> bool {
        self.name == "list" && self.nested.is_some()
    }

    pub fn is_map(&self) -> bool {
        self.name == "map" && self.nested.is_some()
    }

    pub fn is_model(&self) -> bool {
        self.name == "model" && self.nested.is_some()
    }

    pub fn is_container(&self) -> bool {
        self.nested.is_some()
    }

    /// A reference to a user declared struct, enum or interface.
    pub fn is_complex(&self) -> bool {
        !self.is_container() && !self.is_primitive() && !self.is_void()
    }

    /// The innermost non-container type, e.g. `Station` for `list<Station>`.
    pub fn innermost(&self) -> &TypeRef {
        match &self.nested {
            Some(nested) => nested.innermost(),
            None => self,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nested {
            Some(nested) => write!(f, "{}<{}>", self.name, nested),
            None => f.write_str(&self.name),
        }
    }
}
