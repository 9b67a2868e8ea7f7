//! Template driven code generation for QFace systems
//!
//! A [`RuleGenerator`] reads a YAML rule document and, for every selected
//! module, interface, struct or enum of a [`qface_idl::System`], renders
//! destination paths and document bodies through a [`TemplateEngine`].
//! Writes are idempotent and every failure is reported as a one-line
//! [`Diagnostic`] without stopping the remaining targets.

pub mod engine;
pub mod filters;
pub mod generator;
pub mod report;
pub mod rules;
pub mod value;

pub use engine::{Context, TemplateEngine, INLINE_TEMPLATE};
pub use filters::{Filter, FilterError, FilterRegistry};
pub use generator::{Generator, WriteOutcome};
pub use report::{ConsoleReporter, Diagnostic, MemoryReporter, Reporter};
pub use rules::{RuleDocument, RuleError, RuleGenerator, RunReport};
pub use value::{symbol_value, system_value};
