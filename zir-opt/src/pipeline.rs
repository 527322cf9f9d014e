//! Pass pipeline
//!
//! Runs the enabled transformations over a function in a fixed order:
//!
//! 1. unreachable block removal
//! 2. jump threading
//! 3. block merging
//! 4. critical edge splitting
//! 5. redundancy elimination (dominance-aware)
//!
//! Dominance is recomputed after the shape-changing passes, so the
//! redundancy pass never sees a stale snapshot.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use zir_common::ZirError;
use zir_ir::{validate_function, Function, Module};
use crate::dominance::DominanceInfo;
use crate::transform;

/// Optimizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptConfig {
    /// Round cap of the dominator fixpoint
    pub dominance_round_cap: usize,
    /// Jump threading rounds; `None` allows one round per block
    pub max_threading_rounds: Option<usize>,
    pub remove_unreachable: bool,
    pub thread_jumps: bool,
    pub merge_blocks: bool,
    pub split_critical_edges: bool,
    pub eliminate_redundancies: bool,
    /// Run the validator after every pass and stop at the first failure
    pub validate_after_each_pass: bool,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            dominance_round_cap: crate::DEFAULT_ROUND_CAP,
            max_threading_rounds: None,
            remove_unreachable: true,
            thread_jumps: true,
            merge_blocks: true,
            split_critical_edges: true,
            eliminate_redundancies: true,
            validate_after_each_pass: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    RemoveUnreachable,
    ThreadJumps,
    MergeBlocks,
    SplitCriticalEdges,
    EliminateRedundancies,
}

impl PassKind {
    /// Whether the pass may add, remove or rewire blocks
    pub fn changes_shape(self) -> bool {
        !matches!(self, PassKind::EliminateRedundancies)
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassKind::RemoveUnreachable => "remove-unreachable",
            PassKind::ThreadJumps => "thread-jumps",
            PassKind::MergeBlocks => "merge-blocks",
            PassKind::SplitCriticalEdges => "split-critical-edges",
            PassKind::EliminateRedundancies => "eliminate-redundancies",
        };
        write!(f, "{name}")
    }
}

/// Progress notification handed to the pipeline observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEvent {
    PassFinished { function: String, pass: PassKind, changes: usize },
    DominanceComputed { function: String, rounds: usize, converged: bool },
    ValidationFailed { function: String, pass: PassKind, violations: usize },
}

/// What the pipeline did to one function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub function: String,
    /// Change count of every pass that ran, in order
    pub passes: Vec<(PassKind, usize)>,
    /// Whether the last dominance computation converged; `None` if none ran
    pub dominance_converged: Option<bool>,
}

impl PipelineSummary {
    pub fn changes(&self, pass: PassKind) -> usize {
        self.passes.iter().filter(|(p, _)| *p == pass).map(|(_, n)| n).sum()
    }

    pub fn total_changes(&self) -> usize {
        self.passes.iter().map(|(_, n)| n).sum()
    }
}

type Observer = Box<dyn FnMut(&PassEvent)>;

pub struct PassPipeline {
    config: OptConfig,
    observer: Option<Observer>,
}

impl PassPipeline {
    pub fn new(config: OptConfig) -> Self {
        Self { config, observer: None }
    }

    /// Receive a `PassEvent` as each step completes
    pub fn with_observer(mut self, observer: impl FnMut(&PassEvent) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &OptConfig {
        &self.config
    }

    fn notify(&mut self, event: PassEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    fn enabled_passes(&self) -> Vec<PassKind> {
        let config = &self.config;
        [
            (config.remove_unreachable, PassKind::RemoveUnreachable),
            (config.thread_jumps, PassKind::ThreadJumps),
            (config.merge_blocks, PassKind::MergeBlocks),
            (config.split_critical_edges, PassKind::SplitCriticalEdges),
            (config.eliminate_redundancies, PassKind::EliminateRedundancies),
        ]
        .into_iter()
        .filter_map(|(enabled, pass)| enabled.then_some(pass))
        .collect()
    }

    pub fn run_module(&mut self, module: &mut Module) -> Result<Vec<PipelineSummary>, ZirError> {
        let mut summaries = Vec::with_capacity(module.functions().len());
        for function in module.functions_mut() {
            summaries.push(self.run_function(function)?);
        }
        Ok(summaries)
    }

    pub fn run_function(&mut self, function: &mut Function) -> Result<PipelineSummary, ZirError> {
        let mut summary = PipelineSummary {
            function: function.name().to_string(),
            ..PipelineSummary::default()
        };
        if function.num_blocks() == 0 {
            debug!("skipping '{}': no blocks", function.name());
            return Ok(summary);
        }

        let mut dom = None;
        for pass in self.enabled_passes() {
            let changes = match pass {
                PassKind::RemoveUnreachable => transform::remove_unreachable_blocks(function),
                PassKind::ThreadJumps => {
                    let rounds = self.config.max_threading_rounds.unwrap_or(function.num_blocks());
                    transform::thread_jumps_bounded(function, rounds)
                }
                PassKind::MergeBlocks => transform::merge_all_blocks(function),
                PassKind::SplitCriticalEdges => transform::split_function_critical_edges(function),
                PassKind::EliminateRedundancies => {
                    let info = match dom.take() {
                        Some(info) => info,
                        None => self.compute_dominance(function, &mut summary)?,
                    };
                    let removed = transform::eliminate_dominated_redundancies(function, &info);
                    dom = Some(info);
                    removed
                }
            };
            debug!("{pass} on '{}': {changes} change(s)", function.name());
            summary.passes.push((pass, changes));
            self.notify(PassEvent::PassFinished {
                function: function.name().to_string(),
                pass,
                changes,
            });

            if pass.changes_shape() {
                dom = Some(self.compute_dominance(function, &mut summary)?);
            }
            if self.config.validate_after_each_pass {
                self.validate(function, pass)?;
            }
        }
        Ok(summary)
    }

    fn compute_dominance(&mut self, function: &Function, summary: &mut PipelineSummary) -> Result<DominanceInfo, ZirError> {
        let result = DominanceInfo::compute_with_cap(function, self.config.dominance_round_cap)?;
        let converged = result.is_converged();
        let info = result.into_inner();
        summary.dominance_converged = Some(converged);
        self.notify(PassEvent::DominanceComputed {
            function: function.name().to_string(),
            rounds: info.rounds(),
            converged,
        });
        Ok(info)
    }

    fn validate(&mut self, function: &Function, pass: PassKind) -> Result<(), ZirError> {
        let report = validate_function(function);
        if report.is_valid() {
            return Ok(());
        }
        warn!("'{}' is invalid after {pass}:\n{report}", function.name());
        self.notify(PassEvent::ValidationFailed {
            function: function.name().to_string(),
            pass,
            violations: report.len(),
        });
        Err(ZirError::Validation {
            pass: pass.to_string(),
            violations: report.len(),
        })
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new(OptConfig::default())
    }
}

impl fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassPipeline")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
