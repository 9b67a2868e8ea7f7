//! Type graph analysis: complex type references extracted from a system.

use crate::system::System;
use crate::types::{Location, Module, TypeRef};

/// A reference from a member to a user declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeReference {
    /// Member holding the reference, e.g. `Tuner#currentStation` or `Tuner#scan(station)`.
    pub member: String,
    /// Type name as written in the document.
    pub type_name: String,
    /// Qualified name of the resolved symbol, `None` when it does not resolve.
    pub resolved: Option<String>,
    pub location: Location,
}

/// A node in the type graph: one declared type and its outgoing references.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    /// Qualified type name (e.g. "com.pelagicore.ivi.tuner.Tuner").
    pub type_name: String,
    pub references: Vec<TypeReference>,
}

/// Extract a type graph from a system.
///
/// Every interface, struct and enum becomes a node; interfaces also record
/// their `extends` base as a reference. Only complex references are listed.
pub fn extract_type_graph(system: &System) -> Vec<TypeNode> {
    let mut nodes = Vec::new();

    for module in system.modules() {
        for interface in &module.interfaces {
            let mut refs = Refs::new(system, module, &interface.name);
            if let Some(base) = &interface.extends {
                refs.push(
                    "extends".to_string(),
                    &TypeRef::simple(base.clone()),
                    &interface.location,
                );
            }
            for p in &interface.properties {
                refs.push(p.name.clone(), &p.type_, &p.location);
            }
            for o in &interface.operations {
                refs.push(o.name.clone(), &o.return_type, &o.location);
                for param in &o.parameters {
                    refs.push(format!("{}({})", o.name, param.name), &param.type_, &o.location);
                }
            }
            for s in &interface.signals {
                for param in &s.parameters {
                    refs.push(format!("{}({})", s.name, param.name), &param.type_, &s.location);
                }
            }
            nodes.push(refs.finish());
        }

        for s in &module.structs {
            let mut refs = Refs::new(system, module, &s.name);
            for field in &s.fields {
                refs.push(field.name.clone(), &field.type_, &field.location);
            }
            nodes.push(refs.finish());
        }

        for e in &module.enums {
            nodes.push(Refs::new(system, module, &e.name).finish());
        }
    }

    nodes
}

/// All references in the system that do not resolve to a declared type.
pub fn unresolved_references(system: &System) -> Vec<TypeReference> {
    extract_type_graph(system)
        .into_iter()
        .flat_map(|node| node.references)
        .filter(|r| r.resolved.is_none())
        .collect()
}

struct Refs<'a> {
    system: &'a System,
    module: &'a Module,
    owner: &'a str,
    references: Vec<TypeReference>,
}

impl<'a> Refs<'a> {
    fn new(system: &'a System, module: &'a Module, owner: &'a str) -> Self {
        Self {
            system,
            module,
            owner,
            references: Vec::new(),
        }
    }

    fn push(&mut self, member: String, type_: &TypeRef, location: &Location) {
        let inner = type_.innermost();
        if !inner.is_complex() {
            return;
        }
        let resolved = self
            .system
            .resolve_name(&inner.name, &self.module.name)
            .map(|s| s.qualified_name());
        self.references.push(TypeReference {
            member: format!("{}#{}", self.owner, member),
            type_name: inner.name.clone(),
            resolved,
            location: location.clone(),
        });
    }

    fn finish(self) -> TypeNode {
        TypeNode {
            type_name: format!("{}.{}", self.module.name, self.owner),
            references: self.references,
        }
    }
}
