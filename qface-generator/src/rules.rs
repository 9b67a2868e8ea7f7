//! Rule documents: declarative generation plans.
//!
//! A rule document is a YAML mapping of profile names to scopes. Each scope
//! (`system`, `module`, `interface`, `struct`, `enum`) lists destination path
//! templates mapped to body template names. A top level `merge:` list pulls
//! in further rule documents, resolved relative to the including file.

use crate::engine::Context;
use crate::generator::{Generator, WriteOutcome};
use crate::report::Diagnostic;
use crate::value::{symbol_value, system_value};
use glob::Pattern;
use minijinja::Value;
use qface_idl::System;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("yaml document does not exists: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read rule document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: malformed rule document: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("merge cycle detected: {}", chain.join(" -> "))]
    MergeCycle { chain: Vec<String> },
}

impl RuleError {
    fn diagnostic(&self) -> Diagnostic {
        Diagnostic::plain(self.to_string())
    }
}

/// Feature names gating a profile or scope; a single string or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct Features(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Features {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => Features(vec![s]),
            OneOrMany::Many(v) => Features(v),
        }
    }
}

impl Features {
    /// An empty gate always passes; otherwise any enabled feature opens it.
    pub fn allows(&self, enabled: &BTreeSet<String>) -> bool {
        self.0.is_empty() || self.0.iter().any(|f| enabled.contains(f))
    }
}

/// Ordered `destination template -> body template` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_yaml::Mapping")]
pub struct Targets(pub Vec<(String, String)>);

impl TryFrom<serde_yaml::Mapping> for Targets {
    type Error = String;

    fn try_from(mapping: serde_yaml::Mapping) -> Result<Self, Self::Error> {
        mapping
            .into_iter()
            .map(|(k, v)| match (k, v) {
                (serde_yaml::Value::String(k), serde_yaml::Value::String(v)) => Ok((k, v)),
                (k, _) => Err(format!(
                    "document entry {:?} must map a path template to a template name",
                    k
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Targets)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scope {
    #[serde(default)]
    pub when: Features,
    /// Glob patterns matched against qualified names; empty selects everything.
    #[serde(default)]
    pub select: Vec<String>,
    /// Path template appended to the profile directory.
    pub path: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub documents: Targets,
    /// Scaffold documents: written once, never replaced.
    #[serde(default)]
    pub preserve: Targets,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub when: Features,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    pub path: Option<String>,
    pub source: Option<String>,
    pub system: Option<Scope>,
    pub module: Option<Scope>,
    pub interface: Option<Scope>,
    #[serde(rename = "struct")]
    pub struct_: Option<Scope>,
    #[serde(rename = "enum")]
    pub enum_: Option<Scope>,
}

/// One parsed rule document, merges not yet resolved.
#[derive(Debug, Clone, Default)]
pub struct RuleDocument {
    pub path: PathBuf,
    pub merge: Vec<String>,
    pub profiles: Vec<(String, Profile)>,
}

impl RuleDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RuleError::Missing {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: impl AsRef<Path>, content: &str) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let malformed = |message: String| RuleError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let root: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| malformed(e.to_string()))?;
        let mapping = match root {
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => return Err(malformed("expected a mapping of profiles".to_string())),
        };

        let mut document = RuleDocument {
            path: path.to_path_buf(),
            ..Default::default()
        };
        for (key, value) in mapping {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                other => return Err(malformed(format!("profile name {:?} is not a string", other))),
            };
            if name == "merge" {
                let merge: Features = serde_yaml::from_value(value)
                    .map_err(|e| malformed(format!("merge: {}", e)))?;
                document.merge = merge.0;
                continue;
            }
            let profile = match value {
                serde_yaml::Value::Null => Profile::default(),
                value => serde_yaml::from_value(value)
                    .map_err(|e| malformed(format!("{}: {}", name, e)))?,
            };
            document.profiles.push((name, profile));
        }
        Ok(document)
    }
}

/// Counts of what one `process_rules` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub written: usize,
    pub unchanged: usize,
    pub preserved: usize,
    pub failed: usize,
    /// The rule document could not be used at all.
    pub aborted: bool,
}

impl RunReport {
    pub fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created | WriteOutcome::Updated => self.written += 1,
            WriteOutcome::Unchanged => self.unchanged += 1,
            WriteOutcome::Preserved => self.preserved += 1,
            WriteOutcome::Failed => self.failed += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} unchanged, {} preserved, {} failed",
            self.written, self.unchanged, self.preserved, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    System,
    Module,
    Interface,
    Struct,
    Enum,
}

impl Kind {
    fn variable(self) -> &'static str {
        match self {
            Kind::System => "system",
            Kind::Module => "module",
            Kind::Interface => "interface",
            Kind::Struct => "struct",
            Kind::Enum => "enum",
        }
    }
}

/// Interprets rule documents against a [`System`] through a [`Generator`].
pub struct RuleGenerator {
    generator: Generator,
    root: PathBuf,
    features: BTreeSet<String>,
    scaffold: bool,
}

impl RuleGenerator {
    /// Targets are written under the generator's destination.
    pub fn new(generator: Generator) -> Self {
        let root = absolute(generator.destination());
        Self {
            generator,
            root,
            features: BTreeSet::new(),
            scaffold: false,
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scaffold(mut self, scaffold: bool) -> Self {
        self.scaffold = scaffold;
        self
    }

    /// Run every profile of the rule document at `path` (and of the
    /// documents it merges) against `system`.
    ///
    /// Nothing here fails the caller: problems are reported on the error
    /// channel and counted in the returned report.
    pub fn process_rules(&mut self, path: impl AsRef<Path>, system: &Arc<System>) -> RunReport {
        let path = path.as_ref();
        let mut report = RunReport::default();

        let profiles = match self.resolve(path) {
            Ok(profiles) => profiles,
            Err(err) => {
                self.generator.reporter().error(&err.diagnostic());
                report.aborted = true;
                return report;
            }
        };

        for (name, profile) in &profiles {
            if !profile.when.allows(&self.features) {
                tracing::debug!(profile = %name, "profile skipped by feature gate");
                continue;
            }
            self.generator.reporter().progress(&format!("process: {}", name));
            self.process_profile(profile, system, &mut report);
        }

        tracing::info!(rules = %path.display(), %report, "rules processed");
        report
    }

    /// Load `path` and its merges depth-first; own profiles come before
    /// merged ones.
    fn resolve(&self, path: &Path) -> Result<Vec<(String, Profile)>, RuleError> {
        let document = RuleDocument::load(path)?;
        let mut stack = vec![(canonical(path), path.display().to_string())];
        let mut profiles = Vec::new();
        self.collect(document, &mut stack, &mut profiles)?;
        Ok(profiles)
    }

    fn collect(
        &self,
        document: RuleDocument,
        stack: &mut Vec<(PathBuf, String)>,
        profiles: &mut Vec<(String, Profile)>,
    ) -> Result<(), RuleError> {
        let base = document
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        profiles.extend(document.profiles);

        for declared in &document.merge {
            let target = base.join(declared);
            let key = canonical(&target);
            if stack.iter().any(|(seen, _)| *seen == key) {
                let mut chain: Vec<String> = stack.iter().map(|(_, name)| name.clone()).collect();
                chain.push(declared.clone());
                return Err(RuleError::MergeCycle { chain });
            }

            self.generator.reporter().progress(&format!("merge: {}", declared));
            let merged = match RuleDocument::load(&target) {
                Ok(merged) => merged,
                Err(err) => {
                    self.generator.reporter().error(&err.diagnostic());
                    continue;
                }
            };
            stack.push((key, declared.clone()));
            self.collect(merged, stack, profiles)?;
            stack.pop();
        }
        Ok(())
    }

    fn process_profile(&mut self, profile: &Profile, system: &Arc<System>, report: &mut RunReport) {
        self.generator.set_source(profile.source.clone());

        let mut base = Context::new();
        base.insert("system".into(), system_value(system));
        base.insert(
            "features".into(),
            Value::from(self.features.iter().cloned().collect::<Vec<_>>()),
        );
        base.insert("scaffold".into(), Value::from(self.scaffold));
        for (key, value) in &profile.context {
            base.insert(key.clone(), Value::from_serialize(value));
        }

        let dir = match &profile.path {
            Some(path) => match self.generator.apply(path, &base) {
                Ok(path) => self.root.join(path.trim()),
                Err(diagnostic) => {
                    report.record(self.generator.fail(diagnostic));
                    return;
                }
            },
            None => self.root.clone(),
        };

        let scopes = [
            (Kind::System, &profile.system),
            (Kind::Module, &profile.module),
            (Kind::Interface, &profile.interface),
            (Kind::Struct, &profile.struct_),
            (Kind::Enum, &profile.enum_),
        ];
        for (kind, scope) in scopes {
            if let Some(scope) = scope {
                if scope.when.allows(&self.features) {
                    self.process_scope(kind, scope, system, &base, &dir, report);
                }
            }
        }
    }

    fn process_scope(
        &self,
        kind: Kind,
        scope: &Scope,
        system: &Arc<System>,
        base: &Context,
        dir: &Path,
        report: &mut RunReport,
    ) {
        let patterns = match scope
            .select
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(patterns) => patterns,
            Err(e) => {
                let diagnostic = Diagnostic::plain(format!("invalid select pattern: {}", e));
                report.record(self.generator.fail(diagnostic));
                return;
            }
        };
        let selected =
            |name: &str| patterns.is_empty() || patterns.iter().any(|p| p.matches(name));

        for (module, symbol) in targets(kind, system) {
            let qualified = match &symbol {
                Some(symbol) => symbol.clone(),
                None => module.clone().unwrap_or_default(),
            };
            if kind != Kind::System && !selected(&qualified) {
                continue;
            }

            let mut context = base.clone();
            if let Some(module) = &module {
                context.insert("module".into(), symbol_value(system, module.clone()));
            }
            if let Some(symbol) = &symbol {
                context.insert(kind.variable().into(), symbol_value(system, symbol.clone()));
            }
            for (key, value) in &scope.context {
                context.insert(key.clone(), Value::from_serialize(value));
            }
            self.process_target(scope, &context, dir, report);
        }
    }

    fn process_target(&self, scope: &Scope, context: &Context, dir: &Path, report: &mut RunReport) {
        let mut context = context.clone();
        let dir = match &scope.path {
            Some(path) => match self.generator.apply(path, &context) {
                Ok(path) => dir.join(path.trim()),
                Err(diagnostic) => {
                    report.record(self.generator.fail(diagnostic));
                    return;
                }
            },
            None => dir.to_path_buf(),
        };
        context.insert("dst".into(), Value::from(dir.display().to_string()));

        let documents = scope.documents.0.iter().map(|t| (t, false));
        let preserved = scope.preserve.0.iter().map(|t| (t, true));
        for ((path_template, template), preserve) in documents.chain(preserved) {
            let outcome = match self.generator.apply(path_template, &context) {
                Ok(path) => self
                    .generator
                    .write_to(&dir.join(path.trim()), template, &context, preserve),
                Err(diagnostic) => self.generator.fail(diagnostic),
            };
            report.record(outcome);
        }
    }
}

/// `(module, symbol)` qualified names a scope of `kind` runs for.
fn targets(kind: Kind, system: &System) -> Vec<(Option<String>, Option<String>)> {
    let mut out = Vec::new();
    if kind == Kind::System {
        out.push((None, None));
        return out;
    }
    for module in system.modules() {
        let names: Vec<&str> = match kind {
            Kind::Module => {
                out.push((Some(module.name.clone()), Some(module.name.clone())));
                continue;
            }
            Kind::Interface => module.interfaces.iter().map(|i| i.name.as_str()).collect(),
            Kind::Struct => module.structs.iter().map(|s| s.name.as_str()).collect(),
            Kind::Enum => module.enums.iter().map(|e| e.name.as_str()).collect(),
            Kind::System => Vec::new(),
        };
        for name in names {
            out.push((
                Some(module.name.clone()),
                Some(format!("{}.{}", module.name, name)),
            ));
        }
    }
    out
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| absolute(path))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use qface_idl::parser::parse_source;
    use std::fs;

    fn system() -> Arc<System> {
        let docs = vec![
            parse_source(
                "a.qface",
                "module org.tuner;\ninterface Tuner {}\ninterface Extra {}\nstruct Station {}\nenum Band { FM }",
            )
            .unwrap(),
            parse_source("b.qface", "module org.climate;\ninterface Climate {}").unwrap(),
        ];
        Arc::new(System::from_documents(docs).unwrap())
    }

    struct Run {
        dir: tempfile::TempDir,
        reporter: Arc<MemoryReporter>,
    }

    impl Run {
        fn new(templates: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for (name, content) in templates {
                let path = dir.path().join("templates").join(name);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
            Run {
                dir,
                reporter: Arc::new(MemoryReporter::new()),
            }
        }

        fn rules(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join("templates").join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn out(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn generator(&self, features: &[&str]) -> RuleGenerator {
            let generator = Generator::new(vec![self.dir.path().join("templates")])
                .with_reporter(self.reporter.clone())
                .with_destination(self.out());
            RuleGenerator::new(generator).with_features(features.iter().copied())
        }
    }

    #[test]
    fn test_parse_profiles_in_order() {
        let doc = RuleDocument::parse(
            "rules.yaml",
            "merge: other.yaml\nzeta:\n  module:\n    documents:\n      b.txt: b\n      a.txt: a\nalpha:\n  when: [x, y]\n",
        )
        .unwrap();
        assert_eq!(doc.merge, vec!["other.yaml"]);
        let names: Vec<&str> = doc.profiles.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        let module = doc.profiles[0].1.module.as_ref().unwrap();
        assert_eq!(
            module.documents.0,
            vec![
                ("b.txt".to_string(), "b".to_string()),
                ("a.txt".to_string(), "a".to_string())
            ]
        );
        assert_eq!(doc.profiles[1].1.when.0, vec!["x", "y"]);
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = RuleDocument::parse("rules.yaml", "p:\n  modules: {}\n").unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
        let err = RuleDocument::parse("rules.yaml", "p:\n  module:\n    documents:\n      a.txt: [1]\n")
            .unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
    }

    #[test]
    fn test_missing_rule_document() {
        let run = Run::new(&[]);
        let mut rules = run.generator(&[]);
        let report = rules.process_rules("doesnt_exist.txt", &system());
        assert!(report.aborted);
        assert_eq!(
            run.reporter.error_lines(),
            vec!["yaml document does not exists: doesnt_exist.txt"]
        );
        assert!(run.reporter.progress_lines().is_empty());
    }

    #[test]
    fn test_scopes_generate_per_symbol() {
        let run = Run::new(&[
            ("system.txt", "{% for m in system.modules %}{{ m }};{% endfor %}"),
            ("module.txt", "{{ module.short_name }}"),
            ("interface.txt", "{{ module }}.{{ interface }}"),
            ("struct.txt", "{{ struct.qualified_name }}"),
            ("enum.txt", "{{ enum.members|join }}"),
        ]);
        let rules = run.rules(
            "rules.yaml",
            r#"
all:
  system:
    documents:
      "system.txt": system.txt
  module:
    documents:
      "{{module}}/module.txt": module.txt
  interface:
    select: ["org.tuner.*"]
    documents:
      "{{dst}}/{{module|path}}/{{interface|lower}}.txt": interface.txt
  struct:
    documents:
      "{{struct}}.txt": struct.txt
  enum:
    documents:
      "{{enum}}.txt": enum.txt
"#,
        );

        let mut generator = run.generator(&[]);
        let report = generator.process_rules(&rules, &system());
        assert_eq!(run.reporter.progress_lines(), vec!["process: all"]);
        assert!(run.reporter.errors().is_empty(), "{:?}", run.reporter.error_lines());
        assert_eq!(report.written, 7);

        let out = run.out();
        let read = |p: &str| fs::read_to_string(out.join(p)).unwrap();
        assert_eq!(read("system.txt"), "org.tuner;org.climate;");
        assert_eq!(read("org.tuner/module.txt"), "tuner");
        assert_eq!(read("org.climate/module.txt"), "climate");
        assert_eq!(read("org/tuner/tuner.txt"), "org.tuner.Tuner");
        assert_eq!(read("org/tuner/extra.txt"), "org.tuner.Extra");
        assert!(!out.join("org/climate/climate.txt").exists());
        assert_eq!(read("Station.txt"), "org.tuner.Station");
        assert_eq!(read("Band.txt"), "FM");

        run.reporter.clear();
        let again = generator.process_rules(&rules, &system());
        assert_eq!(again.written, 0);
        assert_eq!(again.unchanged, 7);
    }

    #[test]
    fn test_feature_gates_skip_silently() {
        let run = Run::new(&[("a.txt", "a"), ("b.txt", "b {{ features|join(',') }}")]);
        let rules = run.rules(
            "rules.yaml",
            "gated:\n  when: qt\n  system:\n    documents:\n      a.txt: a.txt\nopen:\n  system:\n    when: [docs]\n    documents:\n      b.txt: b.txt\n",
        );

        let report = run.generator(&[]).process_rules(&rules, &system());
        assert_eq!(run.reporter.progress_lines(), vec!["process: open"]);
        assert_eq!(report.written, 0);

        run.reporter.clear();
        let report = run.generator(&["qt", "docs"]).process_rules(&rules, &system());
        assert_eq!(
            run.reporter.progress_lines(),
            vec!["process: gated", "process: open"]
        );
        assert_eq!(report.written, 2);
        assert_eq!(fs::read_to_string(run.out().join("b.txt")).unwrap(), "b docs,qt");
    }

    #[test]
    fn test_merge_order_and_missing_merge_target() {
        let run = Run::new(&[("a.txt", "{{ origin }}")]);
        run.rules(
            "base.yaml",
            "merge: [nested.yaml]\nbase:\n  context: { origin: base }\n  system:\n    documents:\n      base.txt: a.txt\n",
        );
        run.rules(
            "nested.yaml",
            "nested:\n  context: { origin: nested }\n  system:\n    documents:\n      nested.txt: a.txt\n",
        );
        let rules = run.rules(
            "rules.yaml",
            "merge:\n  - base.yaml\n  - missing.yaml\nfrontend:\n  context: { origin: frontend }\n  path: front\n  system:\n    documents:\n      front.txt: a.txt\n",
        );

        let report = run.generator(&[]).process_rules(&rules, &system());
        assert_eq!(
            run.reporter.progress_lines(),
            vec![
                "merge: base.yaml",
                "merge: nested.yaml",
                "merge: missing.yaml",
                "process: frontend",
                "process: base",
                "process: nested",
            ]
        );
        let errors = run.reporter.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("yaml document does not exists: "));
        assert!(errors[0].ends_with("missing.yaml"));

        assert_eq!(report.written, 3);
        let out = run.out();
        assert_eq!(fs::read_to_string(out.join("front/front.txt")).unwrap(), "frontend");
        assert_eq!(fs::read_to_string(out.join("nested.txt")).unwrap(), "nested");
    }

    #[test]
    fn test_merge_cycle_is_fatal() {
        let run = Run::new(&[("a.txt", "a")]);
        run.rules("b.yaml", "merge: [rules.yaml]\nb:\n  system:\n    documents:\n      b.txt: a.txt\n");
        let rules = run.rules("rules.yaml", "merge: [b.yaml]\na:\n  system:\n    documents:\n      a.txt: a.txt\n");

        let report = run.generator(&[]).process_rules(&rules, &system());
        assert!(report.aborted);
        let errors = run.reporter.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("merge cycle detected: "));
        assert!(errors[0].ends_with("rules.yaml -> b.yaml -> rules.yaml"));
        assert!(!run.out().exists());
    }

    #[test]
    fn test_failures_do_not_stop_other_targets() {
        let run = Run::new(&[("good.txt", "ok"), ("bad.txt", "{{ nope }}")]);
        let rules = run.rules(
            "rules.yaml",
            "p:\n  module:\n    documents:\n      \"{{module}}.bad\": bad.txt\n      \"{{module}}.good\": good.txt\n      \"{{module}}.missing\": missing.txt\n",
        );
        let report = run.generator(&[]).process_rules(&rules, &system());
        assert_eq!(report.written, 2);
        assert_eq!(report.failed, 4);
        assert!(!report.is_success());
        assert!(run.out().join("org.tuner.good").exists());
        assert!(!run.out().join("org.tuner.bad").exists());
        assert_eq!(run.reporter.errors().len(), 4);
    }

    #[test]
    fn test_preserve_and_scaffold_context() {
        let run = Run::new(&[("scaffold.txt", "scaffold={{ scaffold }}")]);
        let rules = run.rules(
            "rules.yaml",
            "p:\n  source: \"\"\n  system:\n    preserve:\n      main.txt: scaffold.txt\n",
        );
        let mut generator = run.generator(&[]).with_scaffold(true);
        let report = generator.process_rules(&rules, &system());
        assert_eq!(report.written, 1);
        let main = run.out().join("main.txt");
        assert_eq!(fs::read_to_string(&main).unwrap(), "scaffold=True");

        fs::write(&main, "edited").unwrap();
        let report = generator.process_rules(&rules, &system());
        assert_eq!(report.preserved, 1);
        assert_eq!(fs::read_to_string(&main).unwrap(), "edited");
    }
}
