//! Seam for the external executables the pipelines delegate to.

use crate::prelude::{StageError, StageResult};
use log::debug;
use std::ffi::OsStr;
use std::process::Command;

/// Runs one external tool to completion.
pub trait ToolRunner {
    /// Any launch failure or nonzero exit is an `ExternalToolFailure` naming `tool`.
    fn run(&self, tool: &str, args: &[&OsStr]) -> StageResult<()>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run(&self, tool: &str, args: &[&OsStr]) -> StageResult<()> {
        (**self).run(tool, args)
    }
}

/// Resolves tools on `$PATH` and runs them as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, tool: &str, args: &[&OsStr]) -> StageResult<()> {
        debug!("running {} {:?}", tool, args);
        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|err| StageError::ExternalToolFailure {
                tool: tool.to_string(),
                detail: format!("could not be launched: {}", err),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
        Err(StageError::ExternalToolFailure {
            tool: tool.to_string(),
            detail: match last_line {
                Some(line) => format!("{}: {}", output.status, line.trim()),
                None => output.status.to_string(),
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::cell::RefCell;

    /// Records every invocation and hands it to `effect` instead of spawning.
    pub struct ScriptedRunner<F> {
        calls: RefCell<Vec<Vec<String>>>,
        effect: F,
    }

    impl<F> ScriptedRunner<F>
    where
        F: Fn(&str, &[&OsStr]) -> StageResult<()>,
    {
        pub fn new(effect: F) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                effect,
            }
        }

        /// Tool name followed by its arguments, per call.
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }
    }

    impl<F> ToolRunner for ScriptedRunner<F>
    where
        F: Fn(&str, &[&OsStr]) -> StageResult<()>,
    {
        fn run(&self, tool: &str, args: &[&OsStr]) -> StageResult<()> {
            let mut call = vec![tool.to_string()];
            call.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
            self.calls.borrow_mut().push(call);
            (self.effect)(tool, args)
        }
    }
}
