//! Renders destination paths and document bodies and writes them to disk.

use crate::engine::{Context, TemplateEngine};
use crate::filters::FilterRegistry;
use crate::report::{ConsoleReporter, Diagnostic, Reporter};
use minijinja::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist and was created.
    Created,
    /// The file existed with different content (or the run is forced).
    Updated,
    /// The file already held the rendered content.
    Unchanged,
    /// A scaffold file already existed and was left alone.
    Preserved,
    /// A diagnostic was reported; nothing was written.
    Failed,
}

pub struct Generator {
    engine: TemplateEngine,
    reporter: Arc<dyn Reporter>,
    destination: PathBuf,
    source: Option<String>,
    context: Context,
    force: bool,
}

impl Generator {
    /// A generator over `search_path` with the built-in filters, writing
    /// relative paths under the current directory and reporting to the console.
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self::with_filters(search_path, &FilterRegistry::with_builtins())
    }

    pub fn with_filters(search_path: Vec<PathBuf>, filters: &FilterRegistry) -> Self {
        Self {
            engine: TemplateEngine::new(search_path, filters),
            reporter: Arc::new(ConsoleReporter),
            destination: PathBuf::new(),
            source: None,
            context: Context::new(),
            force: false,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Root joined in front of every relative destination path.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Always write, even over identical or preserved files.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Template sub directory prefixed to body template names.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: Option<String>) {
        self.source = source.filter(|s| !s.is_empty());
    }

    /// Context merged under every call context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn set_context_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    fn merged(&self, context: &Context) -> Context {
        let mut merged = self.context.clone();
        merged.extend(context.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn template_name(&self, name: &str) -> String {
        match &self.source {
            Some(source) => format!("{}/{}", source.trim_end_matches('/'), name),
            None => name.to_string(),
        }
    }

    /// Render a destination path template. Nothing is created.
    pub fn apply(&self, path_template: &str, context: &Context) -> Result<String, Diagnostic> {
        self.engine.render_str(path_template, &self.merged(context))
    }

    /// Render template text with the merged context.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, Diagnostic> {
        self.engine
            .render(&self.template_name(name), &self.merged(context))
    }

    /// Resolve `path_template` to a path under the destination root.
    pub fn resolve_path(&self, path_template: &str, context: &Context) -> Result<PathBuf, Diagnostic> {
        let rendered = self.apply(path_template, context)?;
        Ok(self.destination.join(rendered.trim()))
    }

    /// Render `template` into the file named by `path_template`.
    ///
    /// The file is written only when it is missing or its content differs
    /// from the rendered body, unless the generator is forced. Failures are
    /// reported and leave the destination untouched.
    pub fn write(&self, path_template: &str, template: &str, context: &Context) -> WriteOutcome {
        self.write_target(path_template, template, context, false)
    }

    /// Like [`Generator::write`], but an existing file is never replaced
    /// unless the generator is forced.
    pub fn write_preserved(&self, path_template: &str, template: &str, context: &Context) -> WriteOutcome {
        self.write_target(path_template, template, context, true)
    }

    fn write_target(
        &self,
        path_template: &str,
        template: &str,
        context: &Context,
        preserve: bool,
    ) -> WriteOutcome {
        match self.resolve_path(path_template, context) {
            Ok(path) => self.write_to(&path, template, context, preserve),
            Err(diagnostic) => self.fail(diagnostic),
        }
    }

    /// Render `template` into an already resolved `path`.
    ///
    /// With `preserve` set an existing file is kept as is unless forced.
    pub fn write_to(&self, path: &Path, template: &str, context: &Context, preserve: bool) -> WriteOutcome {
        let exists = path.is_file();
        if preserve && exists && !self.force {
            tracing::info!(path = %path.display(), "preserved");
            return WriteOutcome::Preserved;
        }

        let body = match self.render(template, context) {
            Ok(body) => body,
            Err(diagnostic) => return self.fail(diagnostic),
        };

        if exists && !self.force {
            if let Ok(current) = fs::read(path) {
                if current == body.as_bytes() {
                    tracing::debug!(path = %path.display(), "unchanged");
                    return WriteOutcome::Unchanged;
                }
            }
        }

        match write_file(path, &body) {
            Ok(()) => {
                let outcome = if exists {
                    WriteOutcome::Updated
                } else {
                    WriteOutcome::Created
                };
                tracing::info!(path = %path.display(), ?outcome, "wrote document");
                outcome
            }
            Err(e) => self.fail(Diagnostic::bare(path.display().to_string(), e.to_string())),
        }
    }

    /// Report `diagnostic` on the error channel.
    pub fn fail(&self, diagnostic: Diagnostic) -> WriteOutcome {
        self.reporter.error(&diagnostic);
        WriteOutcome::Failed
    }
}

fn write_file(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use std::time::{Duration, SystemTime};

    struct Fixture {
        _templates: tempfile::TempDir,
        out: tempfile::TempDir,
        reporter: Arc<MemoryReporter>,
        generator: Generator,
    }

    fn fixture() -> Fixture {
        let templates = tempfile::tempdir().unwrap();
        fs::write(templates.path().join("module.txt"), "{{ module }}\n").unwrap();
        fs::write(templates.path().join("scaffold.txt"), "// {{ module }} scaffold\n").unwrap();
        fs::write(templates.path().join("undefinedVariable.txt"), "{{this_is_not_defined}}\n").unwrap();
        fs::create_dir(templates.path().join("frontend")).unwrap();
        fs::write(templates.path().join("frontend/module.txt"), "frontend {{ module }}\n").unwrap();

        let out = tempfile::tempdir().unwrap();
        let reporter = Arc::new(MemoryReporter::new());
        let generator = Generator::new(vec![templates.path().to_path_buf()])
            .with_reporter(reporter.clone());
        Fixture {
            _templates: templates,
            out,
            reporter,
            generator,
        }
    }

    fn context(f: &Fixture, module: &str) -> Context {
        let mut ctx = Context::new();
        ctx.insert("out".into(), Value::from(f.out.path().display().to_string()));
        ctx.insert("module".into(), Value::from(module));
        ctx
    }

    #[test]
    fn test_apply_resolves_without_creating() {
        let f = fixture();
        let ctx = context(&f, "Foo.Bar");
        let path = f.generator.apply("{{out}}/{{module|lower}}.txt", &ctx).unwrap();
        assert_eq!(path, format!("{}/foo.bar.txt", f.out.path().display()));
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_write_is_idempotent() {
        let f = fixture();
        let ctx = context(&f, "Foo.Bar");
        let dst = "{{out}}/{{module|lower}}.txt";

        assert_eq!(f.generator.write(dst, "module.txt", &ctx), WriteOutcome::Created);
        let path = f.out.path().join("foo.bar.txt");
        assert_eq!(fs::read_to_string(&path).unwrap(), "Foo.Bar");

        // Push the timestamp into the past so a rewrite would be visible.
        let past = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(f.generator.write(dst, "module.txt", &ctx), WriteOutcome::Unchanged);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), past);

        fs::write(&path, "stale").unwrap();
        assert_eq!(f.generator.write(dst, "module.txt", &ctx), WriteOutcome::Updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Foo.Bar");
        assert!(f.reporter.errors().is_empty());
    }

    #[test]
    fn test_force_always_writes() {
        let f = fixture();
        let generator = Generator::new(f.generator.engine().search_path().to_vec())
            .with_reporter(f.reporter.clone())
            .with_force(true);
        let ctx = context(&f, "app");
        assert_eq!(generator.write("{{out}}/a.txt", "module.txt", &ctx), WriteOutcome::Created);
        assert_eq!(generator.write("{{out}}/a.txt", "module.txt", &ctx), WriteOutcome::Updated);
    }

    #[test]
    fn test_undefined_variable_writes_nothing() {
        let f = fixture();
        let ctx = context(&f, "app");
        let outcome = f.generator.write("{{out}}/out.txt", "undefinedVariable.txt", &ctx);
        assert_eq!(outcome, WriteOutcome::Failed);
        assert!(!f.out.path().join("out.txt").exists());

        let errors = f.reporter.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].ends_with("/undefinedVariable.txt:1: error: 'this_is_not_defined' is undefined"));
    }

    #[test]
    fn test_failed_render_keeps_previous_file() {
        let f = fixture();
        let ctx = context(&f, "app");
        let path = f.out.path().join("out.txt");
        fs::write(&path, "previous").unwrap();
        f.generator.write("{{out}}/out.txt", "doesnt_exist.txt", &ctx);
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert!(f.reporter.error_lines()[0].ends_with("/doesnt_exist.txt: error: Template not found"));
    }

    #[test]
    fn test_preserved_files_are_not_overwritten() {
        let f = fixture();
        let ctx = context(&f, "app");
        let dst = "{{out}}/app.scaffold";
        assert_eq!(f.generator.write_preserved(dst, "scaffold.txt", &ctx), WriteOutcome::Created);

        let path = f.out.path().join("app.scaffold");
        fs::write(&path, "hand edited").unwrap();
        assert_eq!(f.generator.write_preserved(dst, "scaffold.txt", &ctx), WriteOutcome::Preserved);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hand edited");
    }

    #[test]
    fn test_destination_source_and_base_context() {
        let f = fixture();
        let out = f.out.path().to_path_buf();
        let mut generator = Generator::new(f.generator.engine().search_path().to_vec())
            .with_reporter(f.reporter.clone())
            .with_destination(out.clone());
        generator.set_source(Some("frontend".to_string()));
        generator.set_context_value("module", "base");

        let outcome = generator.write("nested/{{ module }}.txt", "module.txt", &Context::new());
        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(
            fs::read_to_string(out.join("nested/base.txt")).unwrap(),
            "frontend base"
        );

        let mut ctx = Context::new();
        ctx.insert("module".into(), Value::from("call"));
        assert_eq!(generator.apply("{{ module }}", &ctx).unwrap(), "call");
        assert_eq!(generator.source(), Some("frontend"));
    }
}
