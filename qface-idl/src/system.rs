//! The system model: a symbol table spanning every parsed document.

use crate::error::{ParseError, Result};
use crate::search::{suggest_similar, Suggestion};
use crate::types::{
    Declaration, Document, Enum, EnumMember, Field, Interface, Module, Operation, Property,
    Signal, Struct, Tags, TypeRef,
};
use crate::utils::merge_tags;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Module(usize),
    Interface(usize, usize),
    Struct(usize, usize),
    Enum(usize, usize),
}

/// Root aggregate owning every module of a generation run.
///
/// Built once from a set of documents and read-only afterwards. Two systems
/// assembled from the same documents compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct System {
    modules: Vec<Module>,
    #[serde(skip)]
    index: BTreeMap<String, Slot>,
}

/// Result of a [`System::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol<'a> {
    Module(&'a Module),
    Interface(&'a Module, &'a Interface),
    Struct(&'a Module, &'a Struct),
    Enum(&'a Module, &'a Enum),
    Member(Member<'a>),
}

/// A member addressed as `module.Type#member`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'a> {
    Property(&'a Interface, &'a Property),
    Operation(&'a Interface, &'a Operation),
    Signal(&'a Interface, &'a Signal),
    Field(&'a Struct, &'a Field),
    EnumMember(&'a Enum, &'a EnumMember),
}

impl<'a> Member<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Member::Property(_, p) => &p.name,
            Member::Operation(_, o) => &o.name,
            Member::Signal(_, s) => &s.name,
            Member::Field(_, f) => &f.name,
            Member::EnumMember(_, m) => &m.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match *self {
            Member::Property(..) => "property",
            Member::Operation(..) => "operation",
            Member::Signal(..) => "signal",
            Member::Field(..) => "field",
            Member::EnumMember(..) => "member",
        }
    }

    pub fn tags(&self) -> &'a Tags {
        match *self {
            Member::Property(_, p) => &p.tags,
            Member::Operation(_, o) => &o.tags,
            Member::Signal(_, s) => &s.tags,
            Member::Field(_, f) => &f.tags,
            Member::EnumMember(_, m) => &m.tags,
        }
    }
}

impl<'a> Symbol<'a> {
    /// Unqualified name; modules answer with their full dotted name.
    pub fn name(&self) -> &'a str {
        match *self {
            Symbol::Module(m) => &m.name,
            Symbol::Interface(_, i) => &i.name,
            Symbol::Struct(_, s) => &s.name,
            Symbol::Enum(_, e) => &e.name,
            Symbol::Member(m) => m.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match *self {
            Symbol::Module(_) => "module",
            Symbol::Interface(..) => "interface",
            Symbol::Struct(..) => "struct",
            Symbol::Enum(_, e) if e.is_flag => "flag",
            Symbol::Enum(..) => "enum",
            Symbol::Member(m) => m.kind(),
        }
    }

    /// Owning module, when the symbol is a module or a type.
    pub fn module(&self) -> Option<&'a Module> {
        match *self {
            Symbol::Module(m)
            | Symbol::Interface(m, _)
            | Symbol::Struct(m, _)
            | Symbol::Enum(m, _) => Some(m),
            Symbol::Member(_) => None,
        }
    }

    pub fn qualified_name(&self) -> String {
        match *self {
            Symbol::Module(m) => m.name.clone(),
            Symbol::Interface(m, _) | Symbol::Struct(m, _) | Symbol::Enum(m, _) => {
                format!("{}.{}", m.name, self.name())
            }
            Symbol::Member(m) => m.name().to_string(),
        }
    }

    pub fn tags(&self) -> &'a Tags {
        match *self {
            Symbol::Module(m) => &m.tags,
            Symbol::Interface(_, i) => &i.tags,
            Symbol::Struct(_, s) => &s.tags,
            Symbol::Enum(_, e) => &e.tags,
            Symbol::Member(m) => m.tags(),
        }
    }

    pub fn as_module(&self) -> Option<&'a Module> {
        match *self {
            Symbol::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&'a Interface> {
        match *self {
            Symbol::Interface(_, i) => Some(i),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&'a Struct> {
        match *self {
            Symbol::Struct(_, s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&'a Enum> {
        match *self {
            Symbol::Enum(_, e) => Some(e),
            _ => None,
        }
    }
}

impl System {
    /// Assemble a system from parsed documents.
    ///
    /// Declarations are grouped by qualified module name across all documents,
    /// preserving document order and then declaration order. A type name that
    /// appears twice within one merged module is rejected.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Document>> = HashMap::new();
        for document in documents {
            let name = document.module.name.clone();
            if !groups.contains_key(&name) {
                order.push(name.clone());
            }
            groups.entry(name).or_default().push(document);
        }

        let mut modules = Vec::with_capacity(order.len());
        for name in order {
            let documents = groups.remove(&name).unwrap_or_default();
            modules.push(assemble_module(name, documents)?);
        }

        let mut system = System {
            modules,
            index: BTreeMap::new(),
        };
        system.rebuild_index();
        Ok(system)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (m, module) in self.modules.iter().enumerate() {
            for (i, interface) in module.interfaces.iter().enumerate() {
                self.index
                    .insert(format!("{}.{}", module.name, interface.name), Slot::Interface(m, i));
            }
            for (i, s) in module.structs.iter().enumerate() {
                self.index
                    .insert(format!("{}.{}", module.name, s.name), Slot::Struct(m, i));
            }
            for (i, e) in module.enums.iter().enumerate() {
                self.index
                    .insert(format!("{}.{}", module.name, e.name), Slot::Enum(m, i));
            }
        }
        // Module names shadow `module.Type` keys that spell the same string.
        for (m, module) in self.modules.iter().enumerate() {
            self.index.insert(module.name.clone(), Slot::Module(m));
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.lookup(name).and_then(|s| s.as_module())
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Look a symbol up by qualified name.
    ///
    /// Accepts `a.b.c` (module), `a.b.c.Type` and `a.b.c.Type#member`.
    /// A miss is not an error; callers decide how to report it.
    pub fn lookup(&self, name: &str) -> Option<Symbol<'_>> {
        if let Some((owner, member)) = name.split_once('#') {
            return self.lookup_member(owner, member);
        }
        self.index.get(name).map(|slot| self.symbol(*slot))
    }

    fn lookup_member(&self, owner: &str, member: &str) -> Option<Symbol<'_>> {
        let found = match self.lookup(owner)? {
            Symbol::Interface(_, i) => i
                .properties
                .iter()
                .find(|p| p.name == member)
                .map(|p| Member::Property(i, p))
                .or_else(|| {
                    i.operations
                        .iter()
                        .find(|o| o.name == member)
                        .map(|o| Member::Operation(i, o))
                })
                .or_else(|| {
                    i.signals
                        .iter()
                        .find(|s| s.name == member)
                        .map(|s| Member::Signal(i, s))
                }),
            Symbol::Struct(_, s) => s
                .fields
                .iter()
                .find(|f| f.name == member)
                .map(|f| Member::Field(s, f)),
            Symbol::Enum(_, e) => e
                .members
                .iter()
                .find(|m| m.name == member)
                .map(|m| Member::EnumMember(e, m)),
            _ => None,
        };
        found.map(Symbol::Member)
    }

    fn symbol(&self, slot: Slot) -> Symbol<'_> {
        match slot {
            Slot::Module(m) => Symbol::Module(&self.modules[m]),
            Slot::Interface(m, i) => {
                Symbol::Interface(&self.modules[m], &self.modules[m].interfaces[i])
            }
            Slot::Struct(m, i) => Symbol::Struct(&self.modules[m], &self.modules[m].structs[i]),
            Slot::Enum(m, i) => Symbol::Enum(&self.modules[m], &self.modules[m].enums[i]),
        }
    }

    /// Resolve the innermost complex type of `type_ref` as seen from `scope`
    /// (a qualified module name).
    ///
    /// Simple names are searched in the scope module, then in its imports,
    /// then as a fully qualified name.
    pub fn resolve(&self, type_ref: &TypeRef, scope: &str) -> Option<Symbol<'_>> {
        let inner = type_ref.innermost();
        if !inner.is_complex() {
            return None;
        }
        self.resolve_name(&inner.name, scope)
    }

    pub fn resolve_name(&self, name: &str, scope: &str) -> Option<Symbol<'_>> {
        if let Some(module) = self.module(scope) {
            if let Some(symbol) = self.lookup(&format!("{}.{}", module.name, name)) {
                return Some(symbol);
            }
            for import in &module.imports {
                if let Some(symbol) = self.lookup(&format!("{}.{}", import.name, name)) {
                    return Some(symbol);
                }
            }
        }
        self.lookup(name)
            .filter(|s| !matches!(s, Symbol::Module(_) | Symbol::Member(_)))
    }

    /// Names close to `name`, closest first.
    pub fn suggest(&self, name: &str) -> Vec<Suggestion> {
        let candidates: Vec<&str> = self.index.keys().map(String::as_str).collect();
        suggest_similar(name, &candidates, 3)
    }

    /// Complex type references that name no declared type.
    ///
    /// Parsing never fails on these; front ends warn about them instead.
    pub fn unresolved_types(&self) -> Vec<crate::analysis::TypeReference> {
        crate::analysis::unresolved_references(self)
    }

    /// Deep-merge `tags` into the symbol addressed by `identifier`.
    ///
    /// Returns `false` when the identifier does not name a symbol.
    pub fn annotate(&mut self, identifier: &str, tags: Tags) -> bool {
        match self.tags_mut(identifier) {
            Some(target) => {
                merge_tags(target, tags);
                true
            }
            None => false,
        }
    }

    fn tags_mut(&mut self, identifier: &str) -> Option<&mut Tags> {
        let (owner, member) = match identifier.split_once('#') {
            Some((owner, member)) => (owner, Some(member)),
            None => (identifier, None),
        };
        let slot = *self.index.get(owner)?;
        match (slot, member) {
            (Slot::Module(m), None) => Some(&mut self.modules[m].tags),
            (Slot::Interface(m, i), None) => Some(&mut self.modules[m].interfaces[i].tags),
            (Slot::Struct(m, i), None) => Some(&mut self.modules[m].structs[i].tags),
            (Slot::Enum(m, i), None) => Some(&mut self.modules[m].enums[i].tags),
            (Slot::Interface(m, i), Some(member)) => {
                let interface = &mut self.modules[m].interfaces[i];
                if let Some(p) = interface.properties.iter_mut().find(|p| p.name == member) {
                    return Some(&mut p.tags);
                }
                if let Some(o) = interface.operations.iter_mut().find(|o| o.name == member) {
                    return Some(&mut o.tags);
                }
                interface
                    .signals
                    .iter_mut()
                    .find(|s| s.name == member)
                    .map(|s| &mut s.tags)
            }
            (Slot::Struct(m, i), Some(member)) => self.modules[m].structs[i]
                .fields
                .iter_mut()
                .find(|f| f.name == member)
                .map(|f| &mut f.tags),
            (Slot::Enum(m, i), Some(member)) => self.modules[m].enums[i]
                .members
                .iter_mut()
                .find(|e| e.name == member)
                .map(|e| &mut e.tags),
            (Slot::Module(_), Some(_)) => None,
        }
    }
}

fn assemble_module(name: String, documents: Vec<Document>) -> Result<Module> {
    let mut module = Module {
        name,
        version: None,
        imports: Vec::new(),
        interfaces: Vec::new(),
        structs: Vec::new(),
        enums: Vec::new(),
        documents: Vec::new(),
        comment: None,
        tags: Tags::new(),
    };
    let mut seen: HashSet<String> = HashSet::new();

    for document in documents {
        module.version = module.version.or(document.module.version);
        module.comment = module.comment.or(document.module.comment);
        merge_tags(&mut module.tags, document.module.tags);
        for import in document.imports {
            if !module.imports.contains(&import) {
                module.imports.push(import);
            }
        }
        module.documents.push(document.path);

        for declaration in document.declarations {
            if !seen.insert(declaration.name().to_string()) {
                let location = declaration.location();
                return Err(ParseError::Duplicate {
                    path: location.path.clone(),
                    line: location.line,
                    column: location.column,
                    module: module.name.clone(),
                    name: declaration.name().to_string(),
                });
            }
            match declaration {
                Declaration::Interface(i) => module.interfaces.push(i),
                Declaration::Struct(s) => module.structs.push(s),
                Declaration::Enum(e) => module.enums.push(e),
            }
        }
    }

    Ok(module)
}
