//! Reload mode: re-run generation whenever a watched path changes.
//!
//! Sources, the template directories and any `--watch` directories are
//! watched recursively. Events are coalesced over a short quiet period so
//! that an editor's save (often several writes) triggers a single pass.
//! Changes under the target directory are ignored unless a watched path
//! lies inside it. In that case writes only happen for changed output, so
//! the pass after a regeneration settles without writing.

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::config::Settings;
use crate::generate::generate;
use crate::ui;

const QUIET_PERIOD: Duration = Duration::from_millis(250);

pub fn watch(settings: &Settings) -> Result<()> {
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        Config::default(),
    )
    .context("Failed to start file watcher")?;

    let watched = settings.watched_paths();
    for path in &watched {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "not watching missing path");
            continue;
        }
        watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        tracing::debug!(path = %path.display(), "watching");
    }

    let target = absolute(&settings.target);
    let ignored = ignored_dir(&target, &watched);
    ui::print_step("Watching for changes (Ctrl+C to stop)");

    loop {
        let Some(changed) = next_change(&rx, ignored) else {
            return Ok(());
        };
        ui::print_step(&format!("Changed: {}", changed.display()));
        match generate(settings) {
            Ok(report) => ui::print_summary(&report),
            Err(e) => ui::print_error(&format!("{:#}", e)),
        }
    }
}

/// Block until a relevant change arrives, then drain the burst.
///
/// Returns `None` once the watcher is gone.
fn next_change(rx: &Receiver<Event>, ignored: Option<&Path>) -> Option<PathBuf> {
    let first = loop {
        let event = rx.recv().ok()?;
        if let Some(path) = relevant(&event, ignored) {
            break path;
        }
    };
    loop {
        match rx.recv_timeout(QUIET_PERIOD) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => return Some(first),
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

/// The target directory, unless it holds one of the watched paths.
fn ignored_dir<'a>(target: &'a Path, watched: &[PathBuf]) -> Option<&'a Path> {
    let shadows_input = watched
        .iter()
        .any(|path| absolute(path).starts_with(target));
    (!shadows_input).then_some(target)
}

fn relevant(event: &Event, ignored: Option<&Path>) -> Option<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return None;
    }
    event
        .paths
        .iter()
        .find(|p| !ignored.is_some_and(|dir| p.starts_with(dir)))
        .cloned()
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(path)))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_changes_under_target_ignored() {
        let target = Some(Path::new("/work/out"));
        let inside = event(EventKind::Create(CreateKind::File), &["/work/out/a.h"]);
        assert_eq!(relevant(&inside, target), None);

        let outside = event(
            EventKind::Modify(ModifyKind::Any),
            &["/work/out/a.h", "/work/in/tuner.qface"],
        );
        assert_eq!(
            relevant(&outside, target),
            Some(PathBuf::from("/work/in/tuner.qface"))
        );

        let access = event(EventKind::Access(notify::event::AccessKind::Any), &["/work/in/a.qface"]);
        assert_eq!(relevant(&access, target), None);
    }

    #[test]
    fn test_target_holding_sources_is_watched() {
        let cwd = std::env::current_dir().unwrap();
        let watched = vec![PathBuf::from("in"), cwd.join("templates/rules.yaml")];
        assert_eq!(ignored_dir(&cwd, &watched), None);

        let change = event(EventKind::Modify(ModifyKind::Any), &[cwd.join("in/x.qface").to_str().unwrap()]);
        assert_eq!(
            relevant(&change, ignored_dir(&cwd, &watched)),
            Some(cwd.join("in/x.qface"))
        );

        let out = cwd.join("out");
        assert_eq!(ignored_dir(&out, &watched), Some(out.as_path()));
    }

    #[test]
    fn test_burst_coalesced() {
        let (tx, rx) = channel();
        tx.send(event(EventKind::Modify(ModifyKind::Any), &["/work/out/x"])).unwrap();
        tx.send(event(EventKind::Modify(ModifyKind::Any), &["/work/in/a.qface"])).unwrap();
        tx.send(event(EventKind::Modify(ModifyKind::Any), &["/work/in/b.qface"])).unwrap();

        let handle = std::thread::spawn(move || next_change(&rx, Some(Path::new("/work/out"))));
        std::thread::sleep(QUIET_PERIOD * 2);
        drop(tx);
        assert_eq!(handle.join().unwrap(), Some(PathBuf::from("/work/in/a.qface")));
    }
}
