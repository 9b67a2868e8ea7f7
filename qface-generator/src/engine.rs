//! Template engine adapter over `minijinja`.
//!
//! Every engine fault is turned into a [`Diagnostic`]: syntax errors,
//! undefined variables (rendering is strict) and templates missing from
//! the search path.

use crate::filters::FilterRegistry;
use crate::report::Diagnostic;
use minijinja::value::{Rest, Value};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity reported for templates rendered from a string.
pub const INLINE_TEMPLATE: &str = "<template>";

/// Variables handed to a template.
pub type Context = BTreeMap<String, Value>;

/// Names minijinja provides as globals; never reported as undefined.
const GLOBALS: &[&str] = &[
    "range", "dict", "debug", "namespace", "loop", "self", "super", "varargs", "kwargs", "caller",
];

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "true", "false", "none", "True", "False", "None",
];

pub struct TemplateEngine {
    env: Environment<'static>,
    search_path: Arc<Vec<PathBuf>>,
}

impl TemplateEngine {
    /// Build an engine over an ordered search path; the first directory
    /// holding a template name wins.
    pub fn new(search_path: Vec<PathBuf>, filters: &FilterRegistry) -> Self {
        let search_path = Arc::new(search_path);
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        // Keeps spans and template sources on errors.
        env.set_debug(true);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let loader_path = Arc::clone(&search_path);
        env.set_loader(move |name| load_template(&loader_path, name));

        for (name, filter) in filters.iter() {
            let filter = Arc::clone(filter);
            env.add_filter(name.to_string(), move |value: Value, args: Rest<Value>| {
                filter
                    .call(&value, &args)
                    .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
            });
        }
        tracing::debug!(
            search_path = ?search_path,
            filters = filters.len(),
            "template engine ready"
        );

        Self { env, search_path }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Location of `name` on the search path, if any.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        locate(&self.search_path, name)
    }

    /// Render template text directly.
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String, Diagnostic> {
        self.env
            .render_named_str(INLINE_TEMPLATE, source, context)
            .map_err(|err| self.diagnose(&err, INLINE_TEMPLATE, INLINE_TEMPLATE, Some(source), context))
    }

    /// Render a template found on the search path.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, Diagnostic> {
        let identity = self.identity(name);
        let template = self
            .env
            .get_template(name)
            .map_err(|err| self.diagnose(&err, name, &identity, None, context))?;
        template.render(context).map_err(|err| {
            let source = self.locate(name).and_then(|p| fs::read_to_string(p).ok());
            self.diagnose(&err, name, &identity, source.as_deref(), context)
        })
    }

    /// `dir/name` for the directory holding `name`, or the first directory
    /// of the search path when nothing holds it.
    fn identity(&self, name: &str) -> String {
        let dir = self
            .search_path
            .iter()
            .find(|d| d.join(name).is_file())
            .or_else(|| self.search_path.first());
        match dir {
            Some(dir) => format!("{}/{}", dir.display(), name),
            None => name.to_string(),
        }
    }

    fn diagnose(
        &self,
        err: &Error,
        name: &str,
        identity: &str,
        source: Option<&str>,
        context: &Context,
    ) -> Diagnostic {
        // Failures inside an included template surface wrapped; report the
        // innermost one against the template it happened in.
        let inner = innermost(err);
        let identity = match inner.name() {
            Some(other) if other != name && other != INLINE_TEMPLATE => self.identity(other),
            _ => identity.to_string(),
        };
        let source = inner
            .template_source()
            .or(source.filter(|_| inner.name().map_or(true, |n| n == name)));

        let diagnostic = match inner.kind() {
            ErrorKind::TemplateNotFound => {
                let missing = missing_template_name(inner).unwrap_or(name);
                Diagnostic::bare(self.identity(missing), "Template not found")
            }
            ErrorKind::SyntaxError => Diagnostic::new(identity, inner.line(), syntax_message(inner)),
            ErrorKind::UndefinedError => {
                let message = match undefined_name(inner, source, context) {
                    Some(var) => format!("'{}' is undefined", var),
                    None => inner.detail().unwrap_or("undefined value").to_string(),
                };
                Diagnostic::new(identity, inner.line(), message)
            }
            _ => Diagnostic::new(
                identity,
                inner.line(),
                inner
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| inner.kind().to_string()),
            ),
        };
        tracing::debug!(error = %err, "template failure");
        diagnostic
    }
}

/// Follow the cause chain down to the last template error.
fn innermost(err: &Error) -> &Error {
    let mut current = err;
    while let Some(next) = std::error::Error::source(current).and_then(|e| e.downcast_ref::<Error>()) {
        current = next;
    }
    current
}

/// Name of the undefined variable: the first name read by the failing
/// expression that the context does not provide. Falls back to the failing
/// line when the engine recorded no span.
fn undefined_name(err: &Error, source: Option<&str>, context: &Context) -> Option<String> {
    let source = source?;
    let expression = match err.range() {
        Some(range) => source.get(range)?,
        None => source.lines().nth(err.line()?.checked_sub(1)?)?,
    };
    variable_names(expression)
        .into_iter()
        .find(|v| !context.contains_key(*v) && !GLOBALS.contains(v))
        .map(str::to_string)
}

/// Identifiers in an expression that name variables: attribute, filter
/// and test names, string contents and keywords are skipped.
fn variable_names(expression: &str) -> Vec<&str> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut names = Vec::new();
    // Whether the next identifier is an attribute, filter or test name.
    let mut qualified = false;
    let mut quote = None;
    let mut chars = expression.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '.' | '|' => qualified = true,
            c if c.is_ascii_digit() => {
                while chars.next_if(|&(_, n)| is_ident(n) || n == '.').is_some() {}
                qualified = false;
            }
            c if is_ident(c) => {
                let mut end = at + c.len_utf8();
                while let Some((next, n)) = chars.next_if(|&(_, n)| is_ident(n)) {
                    end = next + n.len_utf8();
                }
                let word = &expression[at..end];
                if !qualified && !KEYWORDS.contains(&word) {
                    names.push(word);
                }
                qualified = word == "is";
            }
            c if c.is_whitespace() => {}
            _ => qualified = false,
        }
    }
    names
}

fn load_template(search_path: &[PathBuf], name: &str) -> Result<Option<String>, Error> {
    match locate(search_path, name) {
        Some(path) => fs::read_to_string(&path).map(Some).map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read template {}", path.display()),
            )
            .with_source(e)
        }),
        None => Ok(None),
    }
}

fn locate(search_path: &[PathBuf], name: &str) -> Option<PathBuf> {
    if name.split(['/', '\\']).any(|segment| segment == "..") || Path::new(name).is_absolute() {
        return None;
    }
    search_path
        .iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

fn syntax_message(err: &Error) -> String {
    let detail = err.detail().unwrap_or("syntax error");
    match detail.strip_prefix("unknown statement ") {
        Some(tag) => format!("Encountered unknown tag '{}'.", tag.trim()),
        None => detail.to_string(),
    }
}

/// Name quoted in a not-found detail such as `template "x.txt" does not exist`.
fn missing_template_name(err: &Error) -> Option<&str> {
    let detail = err.detail()?;
    let start = detail.find('"')? + 1;
    let end = start + detail[start..].find('"')?;
    Some(&detail[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn engine(dirs: &[&Path]) -> TemplateEngine {
        TemplateEngine::new(
            dirs.iter().map(|d| d.to_path_buf()).collect(),
            &FilterRegistry::with_builtins(),
        )
    }

    fn context(pairs: &[(&str, &str)]) -> Context {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_render_str_with_filters() {
        let engine = engine(&[]);
        let ctx = context(&[("out", "/tmp/x"), ("module", "Foo.Bar")]);
        assert_eq!(
            engine.render_str("{{out}}/{{module|lower}}.txt", &ctx).unwrap(),
            "/tmp/x/foo.bar.txt"
        );
        assert_eq!(
            engine.render_str("{{ module|path }}/{{ module|identifier|snake }}", &ctx).unwrap(),
            "Foo/Bar/foo_bar"
        );
    }

    #[test]
    fn test_trim_and_lstrip_blocks() {
        let engine = engine(&[]);
        let ctx = context(&[]);
        let source = "a\n  {% if true %}\nb\n  {% endif %}\nc\n";
        assert_eq!(engine.render_str(source, &ctx).unwrap(), "a\nb\nc");
    }

    #[test]
    fn test_inline_undefined_variable() {
        let engine = engine(&[]);
        let ctx = context(&[("out", "x")]);
        let err = engine.render_str("{{ out }}\n{{ missing }}", &ctx).unwrap_err();
        assert_eq!(err.to_string(), "<template>:2: error: 'missing' is undefined");
    }

    #[test]
    fn test_inline_syntax_error() {
        let engine = engine(&[]);
        let err = engine.render_str("{% fooo %}", &context(&[])).unwrap_err();
        assert_eq!(err.to_string(), "<template>:1: error: Encountered unknown tag 'fooo'.");
    }

    #[test]
    fn test_search_path_first_match_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("a.txt"), "first").unwrap();
        fs::write(second.path().join("a.txt"), "second").unwrap();
        fs::write(second.path().join("b.txt"), "only {{ name }}").unwrap();

        let engine = engine(&[first.path(), second.path()]);
        let ctx = context(&[("name", "second")]);
        assert_eq!(engine.render("a.txt", &ctx).unwrap(), "first");
        assert_eq!(engine.render("b.txt", &ctx).unwrap(), "only second");
    }

    #[test]
    fn test_named_template_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("syntax.txt"), "ok\n{% fooo %}\n").unwrap();
        fs::write(dir.path().join("undefined.txt"), "{{ this_is_not_defined }}\n").unwrap();
        let engine = engine(&[dir.path()]);
        let ctx = context(&[]);
        let root = dir.path().display();

        let err = engine.render("syntax.txt", &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{root}/syntax.txt:2: error: Encountered unknown tag 'fooo'.")
        );

        let err = engine.render("undefined.txt", &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{root}/undefined.txt:1: error: 'this_is_not_defined' is undefined")
        );

        let err = engine.render("doesnt_exist.txt", &ctx).unwrap_err();
        assert_eq!(err.line, None);
        assert_eq!(
            err.to_string(),
            format!("{root}/doesnt_exist.txt: error: Template not found")
        );
    }

    #[test]
    fn test_parent_directory_names_are_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("templates");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        let engine = engine(&[nested.as_path()]);
        let err = engine.render("../secret.txt", &context(&[])).unwrap_err();
        assert_eq!(err.message, "Template not found");
    }

    #[test]
    fn test_undefined_name_from_failing_expression() {
        let engine = engine(&[]);
        let ctx = context(&[]);
        let err = engine
            .render_str("{% if module is defined %}{{ module }}{% endif %}{{ name }}", &ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "<template>:1: error: 'name' is undefined");

        let ctx = context(&[("out", "x")]);
        let err = engine
            .render_str("{{ out|upper }} {{ 'a' ~ missing.attr|lower }}", &ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "<template>:1: error: 'missing' is undefined");
    }

    #[test]
    fn test_undefined_inside_include() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("outer.txt"), "outer\n{% include 'inner.txt' %}\n").unwrap();
        fs::write(dir.path().join("inner.txt"), "inner\n\n{{ inner_missing }}\n").unwrap();
        let engine = engine(&[dir.path()]);

        let err = engine.render("outer.txt", &context(&[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}/inner.txt:3: error: 'inner_missing' is undefined", dir.path().display())
        );
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(variable_names("module|lower"), vec!["module"]);
        assert_eq!(variable_names("a.b ~ c | d"), vec!["a", "c"]);
        assert_eq!(variable_names("x is defined and not y"), vec!["x", "y"]);
        assert_eq!(variable_names("'quoted name' ~ 1.5 ~ z"), vec!["z"]);
    }
}
