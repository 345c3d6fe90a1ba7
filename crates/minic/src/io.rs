//! I/O behind the `GET` and `PRINT` intrinsics.
//!
//! Both directions are injected into each run so embedders and tests can
//! script input and capture output without touching process stdio.

use std::collections::VecDeque;
use std::io::BufRead;

use crate::error::{RunError, RunResult};

/// Sink for `PRINT`.
pub trait PrintWriter {
    fn print_int(&mut self, value: i64);
}

/// Writes each value to stdout on its own line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn print_int(&mut self, value: i64) {
        println!("{value}");
    }
}

/// Collects printed values for inspection after the run.
#[derive(Debug, Default, Clone)]
pub struct CollectPrint {
    pub values: Vec<i64>,
}

impl PrintWriter for CollectPrint {
    fn print_int(&mut self, value: i64) {
        self.values.push(value);
    }
}

/// Discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn print_int(&mut self, _value: i64) {}
}

/// Source for `GET`.
///
/// A reader yields one decimal integer per call; running out of input or
/// failing to parse is a fatal [`RunError::Input`].
pub trait InputReader {
    fn read_int(&mut self) -> RunResult<i64>;
}

/// Reads whitespace-delimited decimal integers from stdin.
#[derive(Debug, Default)]
pub struct StdInput {
    pending: VecDeque<i64>,
}

impl InputReader for StdInput {
    fn read_int(&mut self) -> RunResult<i64> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Ok(value);
            }
            let mut line = String::new();
            let read = std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|err| RunError::Input(err.to_string()))?;
            if read == 0 {
                return Err(RunError::Input("end of input".to_owned()));
            }
            for token in line.split_whitespace() {
                let value = token
                    .parse::<i64>()
                    .map_err(|_| RunError::Input(format!("`{token}` is not an integer")))?;
                self.pending.push_back(value);
            }
        }
    }
}

/// Serves integers from a fixed script; used by tests and embedders.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    queue: VecDeque<i64>,
}

impl ScriptedInput {
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            queue: values.into_iter().collect(),
        }
    }
}

impl InputReader for ScriptedInput {
    fn read_int(&mut self) -> RunResult<i64> {
        self.queue
            .pop_front()
            .ok_or_else(|| RunError::Input("scripted input exhausted".to_owned()))
    }
}

/// Always fails; for programs that must not call `GET`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputReader for NoInput {
    fn read_int(&mut self) -> RunResult<i64> {
        Err(RunError::Input("no input source attached".to_owned()))
    }
}
