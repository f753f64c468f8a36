//! Loads workflow documents from disk into the registry.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use pipeline::{WorkflowDocument, WorkflowName, WorkflowRegistry};

/// Registers every `*.json` document in `dir` under its file stem.
///
/// Files are read in name order; a stem that is already registered is
/// skipped with a warning. Returns the number of workflows registered.
pub fn load_dir(dir: &Path, registry: &mut WorkflowRegistry) -> anyhow::Result<usize> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading workflows directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let Some(name) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(WorkflowName::new)
        else {
            continue;
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let document: WorkflowDocument = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        let definition = document
            .into_definition()
            .with_context(|| format!("invalid workflow {}", path.display()))?;

        let steps = definition.steps.len();
        if registry.register(name.clone(), definition) {
            tracing::info!(workflow = %name, steps, "workflow registered");
            loaded += 1;
        } else {
            tracing::warn!(workflow = %name, path = %path.display(), "duplicate workflow name skipped");
        }
    }
    Ok(loaded)
}
