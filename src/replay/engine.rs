use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ReplayError, Result};
use crate::page::{Driver, Page, SessionGuard};
use crate::replay::ops::{ActionKind, Operation, plan};
use crate::replay::patterns::{StepPattern, default_patterns};
use crate::types::Step;
use crate::vars::{Variables, substitute};

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Dispatching,
    Executing,
    Advancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Initializing,
    Running { cursor: usize, phase: StepPhase },
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Log failed steps and keep going instead of aborting.
    pub tolerant: bool,
    /// Bound for every element and page-load wait.
    pub step_timeout: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            tolerant: true,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Executed,
    /// Folded into the operation of the step at `into` by `pattern`.
    Collapsed { into: usize, pattern: &'static str },
    Skipped { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based position in the trace.
    pub position: usize,
    pub name: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOutcome {
    pub result: Option<String>,
    pub reports: Vec<StepReport>,
}

impl ReplayOutcome {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Failed { .. }))
    }
}

/// Walks a trace once, front to back, against one page.
pub struct ReplayEngine {
    patterns: Vec<Box<dyn StepPattern>>,
    options: ReplayOptions,
    state: ReplayState,
}

impl ReplayEngine {
    pub fn new(options: ReplayOptions) -> Self {
        Self {
            patterns: default_patterns(),
            options,
            state: ReplayState::Initializing,
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<Box<dyn StepPattern>>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Opens a session, replays `steps` on it and closes it again, whatever
    /// happens in between.
    pub fn replay<D: Driver>(
        &mut self,
        driver: &D,
        steps: &[Step],
        variables: &Variables,
    ) -> Result<ReplayOutcome> {
        self.transition(ReplayState::Initializing);
        let mut session = match SessionGuard::open(driver) {
            Ok(session) => session,
            Err(e) => {
                self.transition(ReplayState::Aborted);
                return Err(ReplayError::SessionStart(e));
            }
        };
        self.run(&mut *session, steps, variables)
    }

    /// Replays `steps` on an already open page.
    pub fn run<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        steps: &[Step],
        variables: &Variables,
    ) -> Result<ReplayOutcome> {
        let total = steps.len();
        let lookahead = self.patterns.iter().map(|p| p.lookahead()).max().unwrap_or(0);
        let mut outcome = ReplayOutcome::default();
        let mut cursor = 0;

        while cursor < total {
            self.transition(ReplayState::Running {
                cursor,
                phase: StepPhase::Dispatching,
            });
            let position = cursor + 1;
            let end = (cursor + 1 + lookahead).min(total);
            let window: Vec<Step> = steps[cursor..end]
                .iter()
                .map(|s| bind(s, variables))
                .collect();
            let name = window[0].name.clone();
            let (operation, consumed, pattern) = self.dispatch(&window);

            let status = match operation {
                Operation::Finish(result) => {
                    info!("[{}/{}] done: {}", position, total, result);
                    outcome.reports.push(report(position, &name, StepStatus::Executed));
                    outcome.result = Some(result);
                    self.transition(ReplayState::Completed);
                    return Ok(outcome);
                }
                Operation::Skip(reason) => {
                    warn!("[{}/{}] skipping {}: {}", position, total, name, reason);
                    StepStatus::Skipped {
                        reason: reason.to_string(),
                    }
                }
                operation => {
                    self.transition(ReplayState::Running {
                        cursor,
                        phase: StepPhase::Executing,
                    });
                    info!("[{}/{}] {} -> {:?}", position, total, name, operation);
                    match self.execute(page, &operation) {
                        Ok(()) => StepStatus::Executed,
                        Err(e) => {
                            warn!("[{}/{}] {} failed: {:#}", position, total, name, e);
                            if !self.options.tolerant {
                                self.transition(ReplayState::Aborted);
                                return Err(ReplayError::Step {
                                    position,
                                    name,
                                    cause: e,
                                });
                            }
                            StepStatus::Failed {
                                message: format!("{:#}", e),
                            }
                        }
                    }
                }
            };
            outcome.reports.push(report(position, &name, status));

            for absorbed in 1..consumed {
                let step = &window[absorbed];
                info!(
                    "[{}/{}] {} folded into step {}",
                    position + absorbed,
                    total,
                    step.name,
                    position
                );
                outcome.reports.push(report(
                    position + absorbed,
                    &step.name,
                    StepStatus::Collapsed {
                        into: position,
                        pattern: pattern.unwrap_or("none"),
                    },
                ));
            }

            self.transition(ReplayState::Running {
                cursor,
                phase: StepPhase::Advancing,
            });
            cursor += consumed;
        }

        self.transition(ReplayState::Completed);
        Ok(outcome)
    }

    fn dispatch(&self, window: &[Step]) -> (Operation, usize, Option<&'static str>) {
        let step = &window[0];
        if ActionKind::of(&step.name) != ActionKind::Done {
            for pattern in &self.patterns {
                let end = (1 + pattern.lookahead()).min(window.len());
                if let Some(collapse) = pattern.collapse(&window[..end]) {
                    debug!("Pattern {} matched {} step(s)", pattern.name(), collapse.consumed);
                    return (
                        collapse.operation,
                        collapse.consumed.clamp(1, end),
                        Some(pattern.name()),
                    );
                }
            }
        }
        (plan(step), 1, None)
    }

    fn execute<P: Page + ?Sized>(&self, page: &mut P, operation: &Operation) -> anyhow::Result<()> {
        let timeout = self.options.step_timeout;
        match operation {
            Operation::Fill { selector, text } => {
                page.wait_until_visible(selector, timeout)?;
                page.fill(selector, text)
            }
            Operation::Click { selector } => {
                page.wait_until_visible(selector, timeout)?;
                page.click(selector)
            }
            Operation::SearchSubmit { selector, text } => {
                page.wait_until_visible(selector, timeout)?;
                page.fill(selector, text)?;
                page.press_key("Enter")?;
                page.wait_for_load(timeout)
            }
            Operation::Native { name, params } => page.execute_native(name, params),
            Operation::Finish(_) | Operation::Skip(_) => Ok(()),
        }
    }

    fn transition(&mut self, next: ReplayState) {
        debug!("Replay state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn bind(step: &Step, variables: &Variables) -> Step {
    let params = step
        .params
        .iter()
        .map(|(k, v)| (k.clone(), substitute(v, variables)))
        .collect();
    Step::new(step.name.clone(), params)
}

fn report(position: usize, name: &str, status: StepStatus) -> StepReport {
    StepReport {
        position,
        name: name.to_string(),
        status,
    }
}
