//! Public interface for parsing and running programs.

use crate::environment::Environment;
use crate::error::{ParseError, RunError};
use crate::evaluate::TreeWalker;
use crate::expressions::Program;
use crate::io::{InputReader, PrintWriter};
use crate::parse::parse;

/// A parsed translation unit, ready to run.
///
/// Parsing happens once in [`Executor::new`]; each [`Executor::run`] builds
/// a fresh environment (heap, globals, root frame) and walks the entry
/// function, so one executor can run the same program many times with
/// different input.
///
/// # Example
/// ```
/// use minic::{CollectPrint, Executor, ScriptedInput};
///
/// let source = "extern void PRINT(int);
///               int main() { PRINT(6 * 7); return 0; }";
/// let exec = Executor::new(source, "answer.c").unwrap();
/// let mut out = CollectPrint::default();
/// let exit = exec.run(&mut ScriptedInput::default(), &mut out).unwrap();
/// assert_eq!(exit, 0);
/// assert_eq!(out.values, vec![42]);
/// ```
#[derive(Debug)]
pub struct Executor {
    program: Program,
}

impl Executor {
    /// Parses and resolves a translation unit.
    ///
    /// # Errors
    /// Returns a [`ParseError`] naming the file, line, and failure if the
    /// source does not lex, parse, or resolve.
    pub fn new(code: &str, filename: &str) -> Result<Self, ParseError> {
        Ok(Self {
            program: parse(code, filename)?,
        })
    }

    /// Runs the program to completion and returns the word `main` returned.
    ///
    /// `input` feeds `GET` and `print` receives `PRINT` output; both are
    /// borrowed only for the duration of the run.
    ///
    /// # Errors
    /// Returns a [`RunError`] on the first fatal semantic violation, or if
    /// the translation unit has no `main`.
    pub fn run(
        &self,
        input: &mut impl InputReader,
        print: &mut impl PrintWriter,
    ) -> Result<i64, RunError> {
        let mut env = Environment::new(&self.program, input, print);
        env.init()?;
        let entry = env.entry().ok_or(RunError::MissingEntry)?;
        let function = self.program.function(entry).ok_or(RunError::MissingEntry)?;
        let mut walker = TreeWalker::new(&mut env);
        walker.walk_stmt(&function.body)?;
        let returned = walker.returned();
        if !returned {
            // entry fell off the end of its body
            env.ret(None)?;
        }
        Ok(env.exit_value())
    }
}
