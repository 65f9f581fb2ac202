use labeler_core::models::{Asset, AssetState, LabelingState};
use labeler_core::pipeline::RecognitionOutcome;
use std::fmt::Write;
use storage::StorageProvider;

fn state_label(state: AssetState) -> &'static str {
    match state {
        AssetState::NotVisited => "not-visited",
        AssetState::Visited => "visited",
        AssetState::Tagged => "tagged",
    }
}

fn labeling_label(state: Option<LabelingState>) -> &'static str {
    match state {
        None => "-",
        Some(LabelingState::ManuallyLabeled) => "manual",
        Some(LabelingState::AutoLabeled) => "auto",
        Some(LabelingState::AutoLabeledAndAdjusted) => "auto-adjusted",
    }
}

/// One asset per line: state, labeling state, type, name.
pub fn asset_table(assets: &[Asset]) -> String {
    let width = assets.iter().map(|a| a.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for a in assets {
        let _ = writeln!(
            out,
            "{:<12} {:<14} {:<5} {:<width$}",
            state_label(a.state),
            labeling_label(a.labeling_state),
            a.format,
            a.name,
            width = width
        );
    }
    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn outcome_lines(outcomes: &[RecognitionOutcome]) -> String {
    let mut out = String::new();
    for o in outcomes {
        if o.ok {
            let _ = writeln!(out, "ok     {} ({} lines)", o.asset, o.lines);
        } else {
            let _ = writeln!(
                out,
                "failed {}: {}",
                o.asset,
                o.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    let failed = outcomes.iter().filter(|o| !o.ok).count();
    let _ = write!(out, "recognized {} of {}", outcomes.len() - failed, outcomes.len());
    out
}

/// Storage key for an uploaded local file: `prefix` joined with the file name.
pub fn upload_key(local: &std::path::Path, prefix: Option<&str>) -> Option<String> {
    let name = local.file_name()?.to_string_lossy();
    Some(match prefix.map(|p| p.trim_end_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/{name}"),
        _ => name.into_owned(),
    })
}

/// Fails when `key` is not in storage, so the process exits non-zero.
pub async fn ensure_exists(storage: &dyn StorageProvider, key: &str) -> anyhow::Result<()> {
    if !storage.is_file_exists(key).await? {
        anyhow::bail!("{key} does not exist");
    }
    Ok(())
}
