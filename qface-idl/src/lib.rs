//! QFace IDL parsing and semantic model
//!
//! This crate turns `.qface` interface documents into a [`System`]: a
//! read-only symbol table of modules, interfaces, structs and enums with
//! qualified-name lookup and lazy type resolution across documents.

pub mod analysis;
pub mod error;
pub mod filesystem;
pub mod lexer;
pub mod parser;
pub mod search;
pub mod system;
pub mod types;
pub mod utils;

pub use error::*;
pub use filesystem::{parse, parse_document, parse_file};
pub use search::*;
pub use system::*;
pub use types::*;
