use crate::process::{CommandResult, CommandRunner};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl RecordedCall {
    pub fn contains(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Replays queued results in order, succeeding with empty output once drained.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    calls: RefCell<Vec<RecordedCall>>,
    outputs: RefCell<VecDeque<CommandResult>>,
}

impl ScriptedRunner {
    pub fn with_results(results: impl IntoIterator<Item = CommandResult>) -> Self {
        let runner = Self::default();
        runner.outputs.borrow_mut().extend(results);
        runner
    }

    pub fn push(&self, result: CommandResult) {
        self.outputs.borrow_mut().push_back(result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> CommandResult {
        self.calls.borrow_mut().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            timeout,
        });
        self.outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| CommandResult::success(""))
    }
}
