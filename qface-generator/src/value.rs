//! Template values backed by a shared [`System`].
//!
//! Objects hold the system and a qualified identifier and look their symbol
//! up on every access, so nothing is copied out of the model and type
//! references resolve only when a template asks for them.

use minijinja::value::{from_args, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};
use qface_idl::{Member, Module, Parameter, Symbol, System, Tags, TypeRef};
use std::fmt;
use std::sync::Arc;

/// The whole system: `modules`, plus a `lookup(name)` method.
pub fn system_value(system: &Arc<System>) -> Value {
    Value::from_object(SystemObject {
        system: Arc::clone(system),
    })
}

/// A module, type or member addressed by qualified identifier.
pub fn symbol_value(system: &Arc<System>, identifier: impl Into<String>) -> Value {
    Value::from_object(SymbolObject {
        system: Arc::clone(system),
        path: identifier.into(),
    })
}

fn none() -> Value {
    Value::from(())
}

fn optional<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or_else(none)
}

fn tags_value(tags: &Tags) -> Value {
    Value::from_serialize(tags)
}

/// `tag(name)` and `attribute(tag, key)`; absent entries are `none`.
fn tag_method(tags: &Tags, method: &str, args: &[Value]) -> Result<Value, Error> {
    match method {
        "tag" => {
            let (name,): (&str,) = from_args(args)?;
            Ok(tags.get(name).map(Value::from_serialize).unwrap_or_else(none))
        }
        "attribute" => {
            let (tag, key): (&str, &str) = from_args(args)?;
            Ok(tags
                .get(tag)
                .and_then(|t| t.get(key))
                .map(Value::from_serialize)
                .unwrap_or_else(none))
        }
        _ => Err(Error::from(ErrorKind::UnknownMethod)),
    }
}

#[derive(Debug)]
struct SystemObject {
    system: Arc<System>,
}

impl Object for SystemObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "modules" => Some(Value::from(
                self.system
                    .modules()
                    .iter()
                    .map(|m| symbol_value(&self.system, m.name.clone()))
                    .collect::<Vec<_>>(),
            )),
            "kind" => Some(Value::from("system")),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "lookup" => {
                let (name,): (&str,) = from_args(args)?;
                Ok(match self.system.lookup(name) {
                    Some(_) => symbol_value(&self.system, name),
                    None => none(),
                })
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("system")
    }
}

#[derive(Debug)]
struct SymbolObject {
    system: Arc<System>,
    path: String,
}

impl SymbolObject {
    fn symbol(&self) -> Option<Symbol<'_>> {
        self.system.lookup(&self.path)
    }

    fn child(&self, path: String) -> Value {
        symbol_value(&self.system, path)
    }

    /// Qualified name of the module the symbol lives in.
    fn scope(&self) -> Option<&str> {
        let owner = self.path.split('#').next()?;
        self.system
            .lookup(owner)
            .and_then(|s| s.module())
            .map(|m| m.name.as_str())
    }

    fn type_value(&self, type_: &TypeRef) -> Value {
        Value::from_object(TypeObject {
            system: Arc::clone(&self.system),
            scope: self.scope().unwrap_or_default().to_string(),
            type_: type_.clone(),
        })
    }

    fn parameters(&self, parameters: &[Parameter]) -> Value {
        Value::from(
            parameters
                .iter()
                .map(|p| {
                    Value::from_object(ParameterObject {
                        name: p.name.clone(),
                        type_: TypeObject {
                            system: Arc::clone(&self.system),
                            scope: self.scope().unwrap_or_default().to_string(),
                            type_: p.type_.clone(),
                        },
                    })
                })
                .collect::<Vec<_>>(),
        )
    }

    fn members<'a>(&self, names: impl Iterator<Item = &'a str>) -> Value {
        Value::from(
            names
                .map(|name| self.child(format!("{}#{}", self.path, name)))
                .collect::<Vec<_>>(),
        )
    }

    fn types<'a>(&self, module: &Module, names: impl Iterator<Item = &'a str>) -> Value {
        Value::from(
            names
                .map(|name| self.child(format!("{}.{}", module.name, name)))
                .collect::<Vec<_>>(),
        )
    }

    fn module_attr(&self, module: &Module, key: &str) -> Option<Value> {
        let value = match key {
            "short_name" => Value::from(module.short_name()),
            "name_parts" => Value::from(
                module
                    .name_parts()
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<_>>(),
            ),
            "version" => optional(module.version.clone()),
            "imports" => Value::from(
                module
                    .imports
                    .iter()
                    .map(|i| i.name.clone())
                    .collect::<Vec<_>>(),
            ),
            "interfaces" => self.types(module, module.interfaces.iter().map(|i| i.name.as_str())),
            "structs" => self.types(module, module.structs.iter().map(|s| s.name.as_str())),
            "enums" => self.types(module, module.enums.iter().map(|e| e.name.as_str())),
            "documents" => Value::from(
                module
                    .documents
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>(),
            ),
            "comment" => optional(module.comment.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn type_attr(&self, symbol: Symbol<'_>, key: &str) -> Option<Value> {
        if key == "module" {
            return symbol.module().map(|m| self.child(m.name.clone()));
        }
        let value = match (symbol, key) {
            (Symbol::Interface(_, i), "comment") => optional(i.comment.clone()),
            (Symbol::Interface(m, i), "extends") => i
                .extends
                .as_deref()
                .and_then(|base| self.system.resolve_name(base, &m.name))
                .map(|s| self.child(s.qualified_name()))
                .unwrap_or_else(none),
            (Symbol::Interface(_, i), "properties") => {
                self.members(i.properties.iter().map(|p| p.name.as_str()))
            }
            (Symbol::Interface(_, i), "operations") => {
                self.members(i.operations.iter().map(|o| o.name.as_str()))
            }
            (Symbol::Interface(_, i), "signals") => {
                self.members(i.signals.iter().map(|s| s.name.as_str()))
            }
            (Symbol::Struct(_, s), "comment") => optional(s.comment.clone()),
            (Symbol::Struct(_, s), "fields") => self.members(s.fields.iter().map(|f| f.name.as_str())),
            (Symbol::Enum(_, e), "comment") => optional(e.comment.clone()),
            (Symbol::Enum(_, e), "members") => self.members(e.members.iter().map(|m| m.name.as_str())),
            (Symbol::Enum(_, e), "is_flag") => Value::from(e.is_flag),
            (Symbol::Enum(_, e), "is_enum") => Value::from(!e.is_flag),
            _ => return None,
        };
        Some(value)
    }

    fn member_attr(&self, member: Member<'_>, key: &str) -> Option<Value> {
        let value = match (member, key) {
            (Member::Property(_, p), "type") => self.type_value(&p.type_),
            (Member::Property(_, p), "readonly" | "is_readonly") => Value::from(p.readonly),
            (Member::Property(_, p), "const" | "is_const") => Value::from(p.const_),
            (Member::Property(_, p), "comment") => optional(p.comment.clone()),
            (Member::Operation(_, o), "type") => self.type_value(&o.return_type),
            (Member::Operation(_, o), "parameters") => self.parameters(&o.parameters),
            (Member::Operation(_, o), "const" | "is_const") => Value::from(o.const_),
            (Member::Operation(_, o), "comment") => optional(o.comment.clone()),
            (Member::Signal(_, s), "parameters") => self.parameters(&s.parameters),
            (Member::Signal(_, s), "comment") => optional(s.comment.clone()),
            (Member::Field(_, f), "type") => self.type_value(&f.type_),
            (Member::Field(_, f), "comment") => optional(f.comment.clone()),
            (Member::EnumMember(_, m), "value") => Value::from(m.value),
            (Member::EnumMember(_, m), "comment") => optional(m.comment.clone()),
            _ => return None,
        };
        Some(value)
    }
}

impl Object for SymbolObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        let symbol = self.symbol()?;
        match key {
            "name" => return Some(Value::from(symbol.name())),
            "qualified_name" => return Some(Value::from(self.path.as_str())),
            "kind" => return Some(Value::from(symbol.kind())),
            "tags" => return Some(tags_value(symbol.tags())),
            _ => {}
        }
        match symbol {
            Symbol::Module(m) => self.module_attr(m, key),
            Symbol::Member(member) => self.member_attr(member, key),
            other => self.type_attr(other, key),
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let symbol = self.symbol().ok_or_else(|| {
            Error::new(
                ErrorKind::UndefinedError,
                format!("'{}' is no longer defined", self.path),
            )
        })?;
        tag_method(symbol.tags(), method, args)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(symbol) => f.write_str(symbol.name()),
            None => f.write_str(&self.path),
        }
    }
}

/// A type reference seen from the module that wrote it.
#[derive(Debug, Clone)]
struct TypeObject {
    system: Arc<System>,
    scope: String,
    type_: TypeRef,
}

impl TypeObject {
    fn reference(&self) -> Option<Symbol<'_>> {
        self.system.resolve(&self.type_, &self.scope)
    }
}

impl Object for TypeObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let t = &self.type_;
        let value = match key.as_str()? {
            "name" => Value::from(t.name.as_str()),
            "is_void" => Value::from(t.is_void()),
            "is_primitive" => Value::from(t.is_primitive()),
            "is_bool" => Value::from(t.name == "bool"),
            "is_int" => Value::from(t.name == "int"),
            "is_real" => Value::from(t.name == "real"),
            "is_string" => Value::from(t.name == "string"),
            "is_var" => Value::from(t.name == "var"),
            "is_list" => Value::from(t.is_list()),
            "is_map" => Value::from(t.is_map()),
            "is_model" => Value::from(t.is_model()),
            "is_container" => Value::from(t.is_container()),
            "is_complex" => Value::from(t.is_complex()),
            "is_interface" => Value::from(matches!(self.reference(), Some(Symbol::Interface(..)))),
            "is_struct" => Value::from(matches!(self.reference(), Some(Symbol::Struct(..)))),
            "is_enum" => Value::from(matches!(self.reference(), Some(Symbol::Enum(..)))),
            "nested" => match &t.nested {
                Some(nested) => Value::from_object(TypeObject {
                    system: Arc::clone(&self.system),
                    scope: self.scope.clone(),
                    type_: (**nested).clone(),
                }),
                None => none(),
            },
            "reference" => match self.reference() {
                Some(symbol) => symbol_value(&self.system, symbol.qualified_name()),
                None => none(),
            },
            _ => return None,
        };
        Some(value)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_)
    }
}

#[derive(Debug)]
struct ParameterObject {
    name: String,
    type_: TypeObject,
}

impl Object for ParameterObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "name" => Some(Value::from(self.name.as_str())),
            "type" => Some(Value::from_object(self.type_.clone())),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{context, Environment};
    use qface_idl::parser::parse_source;

    fn system() -> Arc<System> {
        let docs = vec![
            parse_source(
                "tuner.qface",
                "module org.tuner 1.0;\nimport org.common;\n@config(port: 8080)\ninterface Base {}\ninterface Tuner extends Base {\n  readonly list<Station> stations;\n  void tune(Station to, int step);\n  signal tuned(int id);\n}\nflag Features { Mono, Stereo }",
            )
            .unwrap(),
            parse_source("common.qface", "module org.common;\nstruct Station { int id; }").unwrap(),
        ];
        Arc::new(System::from_documents(docs).unwrap())
    }

    fn render(source: &str, system: &Arc<System>) -> String {
        let env = Environment::new();
        env.render_str(
            source,
            context! {
                system => system_value(system),
                module => symbol_value(system, "org.tuner"),
                interface => symbol_value(system, "org.tuner.Tuner"),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_module_renders_qualified_name() {
        let system = system();
        assert_eq!(render("{{ module }}", &system), "org.tuner");
        assert_eq!(render("{{ module.short_name }}", &system), "tuner");
        assert_eq!(render("{{ module.interfaces|join(',') }}", &system), "Base,Tuner");
        assert_eq!(render("{{ module.version }}", &system), "1.0");
        assert_eq!(render("{{ system.modules|join(' ') }}", &system), "org.tuner org.common");
    }

    #[test]
    fn test_interface_members() {
        let system = system();
        assert_eq!(render("{{ interface.extends.qualified_name }}", &system), "org.tuner.Base");
        assert_eq!(render("{{ interface.module }}", &system), "org.tuner");
        assert_eq!(
            render(
                "{% for p in interface.properties %}{{ p.type }} {{ p }} {{ p.readonly }}{% endfor %}",
                &system
            ),
            "list<Station> stations True"
        );
        assert_eq!(
            render(
                "{% for o in interface.operations %}{{ o.type }} {{ o }}({% for a in o.parameters %}{{ a.type }} {{ a }}{{ ', ' if not loop.last }}{% endfor %}){% endfor %}",
                &system
            ),
            "void tune(Station to, int step)"
        );
        assert_eq!(render("{{ interface.signals|join }}", &system), "tuned");
    }

    #[test]
    fn test_type_reference_resolves_lazily() {
        let system = system();
        let source = "{% set t = interface.properties[0].type %}{{ t.is_list }} {{ t.nested.is_complex }} {{ t.nested.reference.qualified_name }} {{ t.nested.is_struct }}";
        assert_eq!(render(source, &system), "True True org.common.Station True");
    }

    #[test]
    fn test_tag_methods() {
        let system = system();
        assert_eq!(render("{{ module.lookup is undefined }}", &system), "True");
        let base = "{% set b = system.lookup('org.tuner.Base') %}";
        assert_eq!(render(&format!("{base}{{{{ b.tag('config').port }}}}"), &system), "8080");
        assert_eq!(render(&format!("{base}{{{{ b.attribute('config', 'port') }}}}"), &system), "8080");
        assert_eq!(render(&format!("{base}{{{{ b.tag('missing') is none }}}}"), &system), "True");
        assert_eq!(render("{{ system.lookup('org.nothing') is none }}", &system), "True");
    }

    #[test]
    fn test_enum_members() {
        let system = system();
        let source = "{% set f = system.lookup('org.tuner.Features') %}{{ f.kind }} {{ f.is_flag }} {% for m in f.members %}{{ m }}={{ m.value }} {% endfor %}";
        assert_eq!(render(source, &system), "flag True Mono=1 Stereo=2 ");
    }
}
