//! Line-oriented operation scripts.
//!
//! One JSON object per line: the caller plus the flattened [`Operation`]:
//!
//! ```text
//! # owner funds addr1
//! {"caller":"owner","op":"mint","to":"owner","amount":100}
//! {"caller":"owner","op":"transfer","to":"addr1","amount":50}
//! ```

use std::io::{self, BufRead};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, LedgerConfig};
use crate::event::LedgerEvent;
use crate::ledger::{LedgerSnapshot, Operation, SnapshotError, TokenLedger};
use crate::shared::SharedLedger;
use crate::types::AccountId;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("snapshot admin {snapshot} does not match genesis admin {genesis}")]
    AdminMismatch {
        snapshot: AccountId,
        genesis: AccountId,
    },
    #[error("resume snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptStep {
    pub caller: AccountId,
    #[serde(flatten)]
    pub op: Operation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// Record rejected steps and keep going.
    #[default]
    Continue,
    StopOnError,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Applied { events: Vec<LedgerEvent> },
    Rejected { error: String },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub caller: AccountId,
    pub op: Operation,
    #[serde(flatten)]
    pub result: StepResult,
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.result, StepResult::Applied { .. })
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReplayReport {
    pub outcomes: Vec<StepOutcome>,
    pub applied: usize,
    pub rejected: usize,
}

impl ReplayReport {
    pub fn events(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.outcomes.iter().flat_map(|o| match &o.result {
            StepResult::Applied { events } => events.as_slice(),
            StepResult::Rejected { .. } => &[][..],
        })
    }
}

pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(trimmed).map_err(|source| ScriptError::Parse {
            line: idx + 1,
            source,
        })?;
        steps.push(step);
    }
    Ok(steps)
}

pub fn replay(ledger: &SharedLedger, steps: &[ScriptStep], mode: ReplayMode) -> ReplayReport {
    let mut report = ReplayReport::default();
    for (index, step) in steps.iter().enumerate() {
        let result = match ledger.execute(&step.caller, &step.op) {
            Ok(events) => {
                debug!(
                    index,
                    caller = %step.caller,
                    op = ?step.op,
                    events = events.len(),
                    "step applied"
                );
                report.applied += 1;
                StepResult::Applied { events }
            }
            Err(err) => {
                warn!(
                    index,
                    caller = %step.caller,
                    op = ?step.op,
                    error = %err,
                    "step rejected"
                );
                report.rejected += 1;
                StepResult::Rejected {
                    error: err.to_string(),
                }
            }
        };
        let stop =
            mode == ReplayMode::StopOnError && matches!(result, StepResult::Rejected { .. });
        report.outcomes.push(StepOutcome {
            index,
            caller: step.caller.clone(),
            op: step.op.clone(),
            result,
        });
        if stop {
            break;
        }
    }
    report
}

/// Result of [`run`]: per-step outcomes plus the final ledger state.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub report: ReplayReport,
    pub snapshot: LedgerSnapshot,
    pub mode: ReplayMode,
}

impl RunSummary {
    /// False only when stopping on error was requested and a step was rejected.
    pub fn succeeded(&self) -> bool {
        self.report.rejected == 0 || self.mode == ReplayMode::Continue
    }
}

/// Builds the ledger from genesis, or from `resume` when given, and replays
/// `steps` against it.
///
/// A resume snapshot must belong to the same admin as the genesis config.
pub fn run(
    config: &LedgerConfig,
    steps: &[ScriptStep],
    resume: Option<LedgerSnapshot>,
    mode: ReplayMode,
) -> Result<RunSummary, RunError> {
    let ledger = match resume {
        Some(snapshot) => {
            if snapshot.admin != config.admin {
                return Err(RunError::AdminMismatch {
                    snapshot: snapshot.admin,
                    genesis: config.admin.clone(),
                });
            }
            let ledger = TokenLedger::from_snapshot(snapshot)?;
            info!(height = ledger.height(), "resumed from snapshot");
            ledger
        }
        None => {
            let (ledger, events) = config.build()?;
            info!(genesis_events = events.len(), "built genesis ledger");
            ledger
        }
    };

    let shared = SharedLedger::new(ledger);
    let report = replay(&shared, steps, mode);
    let snapshot = shared.snapshot();
    info!(
        applied = report.applied,
        rejected = report.rejected,
        height = snapshot.height,
        total_supply = snapshot.total_supply,
        state_root = %snapshot.state_root_hex(),
        "replay finished"
    );
    Ok(RunSummary {
        report,
        snapshot,
        mode,
    })
}
