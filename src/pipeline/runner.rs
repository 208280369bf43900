use crate::error::Result;

use super::checkpoint::CheckpointStore;
use super::logger::{BuildLogger, LogSink};
use super::steps::{Step, StepMode};

/// Decides, per step, between passthrough, skip and execute.
pub struct StepRunner<'a> {
    selection: &'a [Step],
    checkpoint: &'a mut CheckpointStore,
    logger: &'a mut BuildLogger,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        selection: &'a [Step],
        checkpoint: &'a mut CheckpointStore,
        logger: &'a mut BuildLogger,
    ) -> Self {
        Self {
            selection,
            checkpoint,
            logger,
        }
    }

    /// Run `step` over `inputs`.
    ///
    /// A step that is neither `forced` nor selected hands its inputs straight back. A
    /// step the checkpoint already records runs in `StepMode::Skip`. An executed step
    /// is recorded and persisted before this returns.
    pub fn run<T>(
        &mut self,
        step: Step,
        inputs: T,
        forced: bool,
        report_progress: bool,
        f: impl FnOnce(T, StepMode, &LogSink) -> Result<T>,
    ) -> Result<T> {
        if !forced && !self.selection.contains(&step) {
            self.logger
                .debug(format!("Step \"{}\" not requested, passing through", step.name()));
            return Ok(inputs);
        }

        let mode = if self.checkpoint.is_pending(step.name()) {
            StepMode::Execute
        } else {
            self.logger.debug(format!(
                "Step \"{}\" already completed, reading back its output",
                step.name()
            ));
            StepMode::Skip
        };

        let sink = self.logger.sink();
        let outputs = if report_progress {
            self.logger
                .step(step.description(), || f(inputs, mode, &sink))?
        } else {
            f(inputs, mode, &sink)?
        };

        if mode == StepMode::Execute {
            self.checkpoint.mark_completed(step.name()).persist()?;
        }
        Ok(outputs)
    }
}
