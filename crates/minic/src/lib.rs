#![doc = include_str!("../../../README.md")]
mod environment;
mod error;
mod evaluate;
mod expressions;
mod frame;
mod heap;
mod intern;
mod io;
mod parse;
mod run;

pub use crate::{
    error::{MinicError, ParseError, ParseErrorKind, RunError},
    io::{
        CollectPrint, InputReader, NoInput, NoPrint, PrintWriter, ScriptedInput, StdInput, StdPrint,
    },
    run::Executor,
};
