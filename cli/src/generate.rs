use anyhow::{Context, Result};
use qface_generator::{ConsoleReporter, FilterRegistry, Generator, RuleGenerator, RunReport};
use std::process::Command;
use std::sync::Arc;

use crate::config::Settings;
use crate::ui;

/// One full pass: parse the sources, run the rule document, then the
/// post-generation command.
///
/// Parse failures, a bad filter document and a failing `--run` command are
/// errors; template and rule problems are reported per target and only
/// show up in the returned report.
pub fn generate(settings: &Settings) -> Result<RunReport> {
    let system = qface_idl::parse(&settings.sources)?;
    for reference in system.unresolved_types() {
        let hint = qface_idl::did_you_mean(&system.suggest(&reference.type_name));
        ui::print_warning(&format!(
            "{}: unresolved type '{}' in {}{}",
            reference.location, reference.type_name, reference.member, hint
        ));
    }
    let system = Arc::new(system);

    let mut filters = FilterRegistry::with_builtins();
    if let Some(path) = &settings.filters {
        let count = filters
            .load_filters(path)
            .with_context(|| format!("Failed to load filters: {}", path.display()))?;
        tracing::debug!(count, path = %path.display(), "loaded filters");
    }

    let generator = Generator::with_filters(settings.template_dirs(), &filters)
        .with_reporter(Arc::new(ConsoleReporter))
        .with_destination(settings.target.clone())
        .with_force(settings.force);

    let mut rules = RuleGenerator::new(generator)
        .with_features(settings.features.iter().cloned())
        .with_scaffold(settings.scaffold);

    let report = rules.process_rules(&settings.rules, &system);
    tracing::info!(%report, "generation finished");

    if let Some(command) = &settings.run {
        run_command(command)?;
    }
    Ok(report)
}

/// Echo `$ {command}` and run it with inherited stdio.
fn run_command(command: &str) -> Result<()> {
    println!("$ {}", command);
    let argv = shlex::split(command)
        .filter(|argv| !argv.is_empty())
        .with_context(|| format!("Invalid command: {}", command))?;

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .with_context(|| format!("Failed to run: {}", command))?;
    if !status.success() {
        anyhow::bail!("Command failed ({}): {}", status, command);
    }
    Ok(())
}
