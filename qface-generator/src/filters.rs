//! Named filters available to templates.
//!
//! A [`FilterRegistry`] is a plain value owned by one generation run. It is
//! filled with the built-in filters and any number of filter documents, and
//! handed to the template engine when the engine is built.

use minijinja::{context, Environment, Value};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use qface_idl::utils::{lower_first, to_camel_case, to_pascal_case, to_snake_case, upper_first};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to read filter document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: malformed filter document: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{}: filter '{name}': {message}", path.display())]
    Invalid {
        path: PathBuf,
        name: String,
        message: String,
    },

    #[error("filter '{name}': {message}")]
    Call { name: String, message: String },
}

/// A named callable usable as `{{ value | name(args...) }}`.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;
    fn call(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError>;
}

type FilterFn = fn(&Value, &[Value]) -> Result<Value, FilterError>;

struct BuiltinFilter {
    name: &'static str,
    apply: FilterFn,
}

impl Filter for BuiltinFilter {
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError> {
        (self.apply)(value, args)
    }
}

const BUILTINS: &[(&str, FilterFn)] = &[
    ("upper_first", |v, _| Ok(text(v, upper_first))),
    ("lower_first", |v, _| Ok(text(v, lower_first))),
    ("snake", |v, _| Ok(text(v, to_snake_case))),
    ("camel", |v, _| Ok(text(v, to_camel_case))),
    ("pascal", |v, _| Ok(text(v, to_pascal_case))),
    ("path", |v, _| Ok(text(v, |s| s.replace('.', "/")))),
    ("identifier", |v, _| Ok(text(v, |s| s.replace('.', "_")))),
    ("jsonify", jsonify),
    ("hash", hash),
];

fn text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    Value::from(f(&value.to_string()))
}

fn jsonify(value: &Value, _args: &[Value]) -> Result<Value, FilterError> {
    serde_json::to_string(value)
        .map(Value::from)
        .map_err(|e| FilterError::Call {
            name: "jsonify".to_string(),
            message: e.to_string(),
        })
}

/// Hex SHA-256 of the rendered value, truncated to `args[0]` digits (default 8).
fn hash(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let digest = Sha256::digest(value.to_string().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let len = match args.first() {
        Some(arg) => arg.as_usize().ok_or_else(|| FilterError::Call {
            name: "hash".to_string(),
            message: format!("length must be a positive integer, got {}", arg),
        })?,
        None => 8,
    };
    Ok(Value::from(&hex[..len.min(hex.len())]))
}

/// Lookup table filter from a filter document `map:` entry.
struct MapFilter {
    name: String,
    table: BTreeMap<String, Value>,
    default: Option<Value>,
}

impl Filter for MapFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, value: &Value, _args: &[Value]) -> Result<Value, FilterError> {
        let key = value.to_string();
        Ok(self
            .table
            .get(&key)
            .or(self.default.as_ref())
            .cloned()
            .unwrap_or_else(|| value.clone()))
    }
}

/// Filter rendering a small template with `value` and `args` in scope.
struct TemplateFilter {
    name: String,
    source: String,
    env: Environment<'static>,
}

impl Filter for TemplateFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError> {
        self.env
            .render_str(&self.source, context! { value => value, args => args })
            .map(Value::from)
            .map_err(|e| FilterError::Call {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterEntry {
    map: Option<BTreeMap<String, serde_json::Value>>,
    default: Option<serde_json::Value>,
    template: Option<String>,
}

/// Registry of filters, keyed by name. Registering an existing name replaces it.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Arc<dyn Filter>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for &(name, apply) in BUILTINS {
            registry.register(BuiltinFilter { name, apply });
        }
        registry
    }

    pub fn register<F: Filter + 'static>(&mut self, filter: F) {
        self.register_arc(Arc::new(filter));
    }

    pub fn register_arc(&mut self, filter: Arc<dyn Filter>) {
        let name = filter.name().to_string();
        if self.filters.insert(name.clone(), filter).is_some() {
            tracing::debug!(filter = %name, "filter replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Filter>)> {
        self.filters.iter().map(|(name, filter)| (name.as_str(), filter))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Register every filter described by a YAML filter document.
    ///
    /// Top level keys are filter names. Each entry is either a lookup table
    /// (`map:` with an optional `default:`) or a `template:` rendered with
    /// `value` and `args`. Returns the number of filters registered.
    pub fn load_filters(&mut self, path: impl AsRef<Path>) -> Result<usize, FilterError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let specs: BTreeMap<String, FilterEntry> =
            serde_yaml::from_str(&content).map_err(|e| FilterError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut loaded: Vec<Arc<dyn Filter>> = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            loaded.push(build_filter(path, name, spec)?);
        }

        let count = loaded.len();
        for filter in loaded {
            self.register_arc(filter);
        }
        tracing::info!(path = %path.display(), count, "loaded filters");
        Ok(count)
    }
}

fn build_filter(path: &Path, name: String, spec: FilterEntry) -> Result<Arc<dyn Filter>, FilterError> {
    let invalid = |name: &str, message: &str| FilterError::Invalid {
        path: path.to_path_buf(),
        name: name.to_string(),
        message: message.to_string(),
    };

    match (spec.map, spec.template) {
        (Some(table), None) => Ok(Arc::new(MapFilter {
            name,
            table: table
                .into_iter()
                .map(|(k, v)| (k, Value::from_serialize(&v)))
                .collect(),
            default: spec.default.map(|v| Value::from_serialize(&v)),
        })),
        (None, Some(source)) => {
            if spec.default.is_some() {
                return Err(invalid(&name, "'default' is only valid with 'map'"));
            }
            // Reject broken templates at load time rather than on first use.
            Environment::new()
                .template_from_str(&source)
                .map(|_| ())
                .map_err(|e| invalid(&name, &e.to_string()))?;
            let mut env = Environment::new();
            env.set_trim_blocks(true);
            env.set_lstrip_blocks(true);
            Ok(Arc::new(TemplateFilter { name, source, env }))
        }
        (Some(_), Some(_)) => Err(invalid(&name, "expected either 'map' or 'template', not both")),
        (None, None) => Err(invalid(&name, "expected 'map' or 'template'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn call(registry: &FilterRegistry, name: &str, value: Value, args: &[Value]) -> Value {
        registry.get(name).unwrap().call(&value, args).unwrap()
    }

    #[test]
    fn test_builtins() {
        let registry = FilterRegistry::with_builtins();
        assert_eq!(registry.len(), BUILTINS.len());

        let v = |s: &str| Value::from(s);
        assert_eq!(call(&registry, "upper_first", v("tuner"), &[]).to_string(), "Tuner");
        assert_eq!(call(&registry, "lower_first", v("Tuner"), &[]).to_string(), "tuner");
        assert_eq!(call(&registry, "snake", v("BaseTuner"), &[]).to_string(), "base_tuner");
        assert_eq!(call(&registry, "camel", v("base_tuner"), &[]).to_string(), "baseTuner");
        assert_eq!(call(&registry, "pascal", v("base_tuner"), &[]).to_string(), "BaseTuner");
        assert_eq!(
            call(&registry, "path", v("com.pelagicore.ivi"), &[]).to_string(),
            "com/pelagicore/ivi"
        );
        assert_eq!(
            call(&registry, "identifier", v("com.pelagicore.ivi"), &[]).to_string(),
            "com_pelagicore_ivi"
        );
        assert_eq!(call(&registry, "jsonify", v("a\"b"), &[]).to_string(), "\"a\\\"b\"");
    }

    #[test]
    fn test_hash_length() {
        let registry = FilterRegistry::with_builtins();
        let short = call(&registry, "hash", Value::from("tuner"), &[]).to_string();
        assert_eq!(short.len(), 8);
        let long = call(&registry, "hash", Value::from("tuner"), &[Value::from(64)]).to_string();
        assert_eq!(long.len(), 64);
        assert!(long.starts_with(&short));

        let err = registry
            .get("hash")
            .unwrap()
            .call(&Value::from("x"), &[Value::from("nope")])
            .unwrap_err();
        assert!(matches!(err, FilterError::Call { .. }));
    }

    #[test]
    fn test_load_filters_and_last_load_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.yaml");
        fs::write(
            &first,
            "qt_type:\n  map:\n    int: int\n    string: QString\n  default: QVariant\nsnake:\n  template: \"custom_{{ value }}\"\n",
        )
        .unwrap();

        let mut registry = FilterRegistry::with_builtins();
        assert_eq!(registry.load_filters(&first).unwrap(), 2);
        assert_eq!(call(&registry, "qt_type", Value::from("string"), &[]).to_string(), "QString");
        assert_eq!(call(&registry, "qt_type", Value::from("Station"), &[]).to_string(), "QVariant");
        assert_eq!(call(&registry, "snake", Value::from("Tuner"), &[]).to_string(), "custom_Tuner");

        let second = dir.path().join("second.yaml");
        fs::write(
            &second,
            "qt_type:\n  template: \"{{ value }}{{ args[0] }}\"\n",
        )
        .unwrap();
        registry.load_filters(&second).unwrap();
        assert_eq!(
            call(&registry, "qt_type", Value::from("int"), &[Value::from("*")]).to_string(),
            "int*"
        );
        assert!(registry.names().any(|n| n == "camel"));
    }

    #[test]
    fn test_map_without_default_passes_value_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.yaml");
        fs::write(&path, "band:\n  map:\n    FM: fm\n").unwrap();
        let mut registry = FilterRegistry::new();
        registry.load_filters(&path).unwrap();
        assert_eq!(call(&registry, "band", Value::from("AM"), &[]).to_string(), "AM");
    }

    #[test]
    fn test_load_filters_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = FilterRegistry::new();

        let err = registry.load_filters(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, FilterError::Io { .. }));

        let malformed = dir.path().join("malformed.yaml");
        fs::write(&malformed, "- not\n- a mapping\n").unwrap();
        assert!(matches!(
            registry.load_filters(&malformed).unwrap_err(),
            FilterError::Parse { .. }
        ));

        let both = dir.path().join("both.yaml");
        fs::write(&both, "x:\n  map: {}\n  template: \"{{ value }}\"\n").unwrap();
        assert!(matches!(
            registry.load_filters(&both).unwrap_err(),
            FilterError::Invalid { .. }
        ));

        let broken = dir.path().join("broken.yaml");
        fs::write(&broken, "x:\n  template: \"{% if %}\"\n").unwrap();
        assert!(matches!(
            registry.load_filters(&broken).unwrap_err(),
            FilterError::Invalid { .. }
        ));
        assert!(registry.is_empty());
    }
}
