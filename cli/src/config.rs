use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Cli;

/// Project defaults read from `qface.toml`.
///
/// Every field is optional; command-line flags and environment variables
/// take precedence. Relative paths are resolved against the directory that
/// holds the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QfaceConfig {
    pub rules: Option<PathBuf>,
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Extra template directories searched after the rule document's own.
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
    /// YAML filter document loaded into the filter registry.
    pub filters: Option<PathBuf>,
    #[serde(default)]
    pub features: Vec<String>,
    pub scaffold: Option<bool>,
    pub force: Option<bool>,
    #[serde(default)]
    pub watch: Vec<PathBuf>,
}

impl QfaceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: QfaceConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Try to load config, returning None if file doesn't exist
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.rules.iter_mut().for_each(join);
        self.target.iter_mut().for_each(join);
        self.filters.iter_mut().for_each(join);
        self.sources.iter_mut().for_each(join);
        self.search_path.iter_mut().for_each(join);
        self.watch.iter_mut().for_each(join);
    }
}

/// Everything one generation pass needs, after flags and config are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sources: Vec<PathBuf>,
    pub rules: PathBuf,
    pub target: PathBuf,
    pub search_path: Vec<PathBuf>,
    pub filters: Option<PathBuf>,
    pub features: Vec<String>,
    pub scaffold: bool,
    pub force: bool,
    pub reload: bool,
    pub watch: Vec<PathBuf>,
    pub run: Option<String>,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: Option<QfaceConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let rules = cli
            .rules
            .clone()
            .or(config.rules)
            .context("No rule document given: pass --rules or set `rules` in qface.toml")?;

        let sources = if cli.sources.is_empty() {
            config.sources
        } else {
            cli.sources.clone()
        };

        let features = if cli.features.is_empty() {
            config.features
        } else {
            cli.features.clone()
        };

        let mut watch = config.watch;
        watch.extend(cli.watch.iter().cloned());

        Ok(Self {
            sources,
            rules,
            target: cli
                .target
                .clone()
                .or(config.target)
                .unwrap_or_else(|| PathBuf::from(".")),
            search_path: config.search_path,
            filters: cli.filters.clone().or(config.filters),
            features,
            scaffold: flag(cli.scaffold, cli.no_scaffold).or(config.scaffold).unwrap_or(false),
            force: flag(cli.force, cli.no_force).or(config.force).unwrap_or(false),
            reload: cli.reload && !cli.no_reload,
            watch,
            run: cli.run.clone(),
        })
    }

    /// Template directories: the rule document's directory first.
    pub fn template_dirs(&self) -> Vec<PathBuf> {
        let rules_dir = self
            .rules
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut dirs = vec![rules_dir];
        dirs.extend(self.search_path.iter().cloned());
        dirs
    }

    /// Paths whose changes trigger a re-run in reload mode.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.sources.clone();
        paths.extend(self.template_dirs());
        paths.extend(self.filters.iter().cloned());
        paths.extend(self.watch.iter().cloned());
        paths
    }
}

/// `--x` / `--no-x` pair: `None` when neither was given.
fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
