use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::Instant;

use crate::backend::{BackendError, MemoryBackend};
use crate::cli::output::{ReplayJson, StepJson};
use crate::io::script_io::{Script, Step};
use crate::model::command::Command;
use crate::model::config::EngineConfig;
use crate::model::node::NodeRef;
use crate::sync::session::{OutlineSession, SelectOutcome};
use crate::ui::RecordingSurface;

/// Error type for running a replay script
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("step {index}: no node with gnx {gnx:?}")]
    UnknownNode { index: usize, gnx: String },
    #[error("step {index}: {source}")]
    Backend {
        index: usize,
        source: BackendError,
    },
}

/// Run `script` against an in-memory outline and a recording surface.
///
/// Needs a tokio runtime with the time driver enabled.
pub async fn run_replay(script: &Script, config: &EngineConfig) -> Result<ReplayJson, ReplayError> {
    let started_at = chrono::Local::now().to_rfc3339();
    let backend = Arc::new(
        MemoryBackend::from_seed(&script.outline)
            .with_latency(Duration::from_millis(script.latency_ms)),
    );
    let surface = RecordingSurface::new();
    let session = OutlineSession::new(backend.clone(), surface.panes(), config);
    let start = Instant::now();

    let resolve = |index: usize, gnx: &str| -> Result<NodeRef, ReplayError> {
        backend.node_ref(gnx).ok_or_else(|| ReplayError::UnknownNode {
            index,
            gnx: gnx.to_string(),
        })
    };

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let at_ms = start.elapsed().as_millis() as u64;
        let mut accepted = None;
        let detail = match step {
            Step::Add {
                action,
                node,
                text,
                refresh,
                focus,
                from_outline,
                name,
            } => {
                let mut command = Command::new(action.as_str())
                    .refresh(*refresh)
                    .focus(*focus)
                    .from_outline(*from_outline);
                if let Some(gnx) = node {
                    command = command.with_node(resolve(index, gnx)?);
                }
                if let Some(text) = text {
                    command = command.with_text(text.as_str());
                }
                if let Some(name) = name {
                    command = command.named(name.as_str());
                }
                let detail = match node {
                    Some(gnx) => format!("{} @{}", command.label(), gnx),
                    None => command.label().to_string(),
                };
                accepted = Some(session.add(command));
                detail
            }
            Step::Select { node } => {
                let target = resolve(index, node)?;
                let outcome = session
                    .select_node(target)
                    .await
                    .map_err(|source| ReplayError::Backend { index, source })?;
                let verdict = match outcome {
                    SelectOutcome::Applied => "applied",
                    SelectOutcome::Reselected => "reselected",
                    SelectOutcome::Stale => "stale",
                };
                format!("{} ({})", node, verdict)
            }
            Step::Refresh {
                focus,
                flags,
                node,
                preserve_range,
            } => {
                let target = node.as_deref().map(|g| resolve(index, g)).transpose()?;
                session.setup_refresh(*focus, *flags, target, *preserve_range);
                format!("{} focus={}", flags, focus)
            }
            Step::Push { focus, flags, node } => {
                let target = node.as_deref().map(|g| resolve(index, g)).transpose()?;
                session.backend_push(*focus, *flags, target);
                format!("{} focus={}", flags, focus)
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                format!("{}ms", ms)
            }
            Step::Settle => {
                session.settle().await;
                String::new()
            }
        };
        if accepted == Some(false) {
            warn!("step {}: {} rejected by the queue", index, detail);
        }
        steps.push(StepJson {
            index,
            step: step.kind(),
            detail,
            at_ms,
            accepted,
        });
    }

    session.settle().await;
    info!(
        "replay finished: {} step(s), {} pass(es)",
        steps.len(),
        session.coordinator().passes()
    );

    Ok(ReplayJson {
        script: String::new(),
        started_at,
        steps,
        events: surface.events(),
        passes: session.coordinator().pass_history(),
        backend_calls: backend.calls(),
        outline: backend.dump(),
    })
}
