//! Command-line surface (§6): compile-time flags plus repeatable field
//! bindings, translated into [`pamplemousse_compiler::CompileOptions`].

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use pamplemousse_compiler::emit::{InputFormat, OutputFormat};

/// Mirrors [`InputFormat`]/[`OutputFormat`] as a `clap`-friendly enum; the
/// compiler's own enums don't derive `ValueEnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum IoShape {
    MultiArg,
    Table,
}

impl From<IoShape> for InputFormat {
    fn from(shape: IoShape) -> Self {
        match shape {
            IoShape::MultiArg => InputFormat::MultiArg,
            IoShape::Table => InputFormat::Table,
        }
    }
}

impl From<IoShape> for OutputFormat {
    fn from(shape: IoShape) -> Self {
        match shape {
            IoShape::MultiArg => OutputFormat::MultiArg,
            IoShape::Table => OutputFormat::Table,
        }
    }
}

/// Compiles a PMML model document into a self-contained Lua scoring
/// program (§1, §6).
#[derive(Debug, Parser)]
#[command(name = "pamplemousse", version, about)]
pub struct Options {
    /// Path to the PMML document. Reads from stdin when omitted.
    pub document: Option<PathBuf>,

    /// Write the generated Lua source here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Fold field names and string literals to lower case before comparing
    /// them, so the emitted script is case-insensitive end to end.
    #[arg(long)]
    pub lowercase: bool,

    #[arg(long, value_enum, default_value_t = IoShape::MultiArg)]
    pub input_format: IoShape,

    #[arg(long, value_enum, default_value_t = IoShape::MultiArg)]
    pub output_format: IoShape,

    /// Caps the number of Lua locals the emitted function declares before
    /// spilling the rest into an overflow table (§4.8, §9).
    #[arg(long)]
    pub local_variable_budget: Option<usize>,

    /// Bind a DataDictionary field to a caller-chosen parameter name:
    /// `NAME` or `NAME=EMITTED`. Repeatable.
    #[arg(long = "input", value_name = "NAME[=EMITTED]")]
    pub inputs: Vec<String>,

    /// Request an output: an OutputField name, or `neuron:<id>` for a raw
    /// neural-network neuron activation, optionally renamed
    /// (`=EMITTED`), rescaled (`+|-|*|/ NUMBER`), and rounded
    /// (`,PRECISION`). Repeatable.
    #[arg(long = "output", value_name = "NAME[=EMITTED][+-*/NUM][,PRECISION]")]
    pub outputs: Vec<String>,
}
