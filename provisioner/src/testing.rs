//! Test support
//!
//! A scripted [`ToolRunner`] double so the pipeline can be exercised without
//! touching the host system. Lives in the library (not `#[cfg(test)]`) so
//! integration tests and downstream crates can drive the pipeline the same
//! way.

use crate::runner::{Invocation, ToolOutput, ToolRunner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Script {
    /// Every invocation succeeds with empty output.
    AlwaysOk,
    /// Outputs are returned in order; running past the end is an error.
    Outputs(Mutex<VecDeque<ToolOutput>>),
}

/// Runner that records every invocation and replies from a script.
pub struct ScriptedRunner {
    script: Script,
    recorded: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<ToolOutput>) -> Self {
        Self {
            script: Script::Outputs(Mutex::new(outputs.into())),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self {
            script: Script::AlwaysOk,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// The invocations issued so far, in order.
    pub fn recorded(&self) -> Vec<Invocation> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        self.recorded.lock().unwrap().push(invocation.clone());
        match &self.script {
            Script::AlwaysOk => Ok(ToolOutput::ok("")),
            Script::Outputs(outputs) => {
                outputs.lock().unwrap().pop_front().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("no scripted output left for: {}", invocation),
                    )
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
