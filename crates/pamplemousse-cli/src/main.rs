mod bindings;
mod options;
mod xml;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, info_span};

use options::Options;
use pamplemousse_compiler::{CompileOptions, compile_model};

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let options = Options::parse();
    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> Result<(), String> {
    let source = {
        let _span = info_span!("read").entered();
        xml::read_source(options.document.as_deref()).map_err(|e| e.to_string())?
    };

    let document = {
        let _span = info_span!("parse").entered();
        xml::parse(&source).map_err(|e| e.to_string())?
    };

    let mut input_bindings = Vec::with_capacity(options.inputs.len());
    for raw in &options.inputs {
        input_bindings.push(bindings::parse_input(raw).map_err(|e| e.to_string())?);
    }
    let mut output_bindings = Vec::with_capacity(options.outputs.len());
    for raw in &options.outputs {
        output_bindings.push(bindings::parse_output(raw).map_err(|e| e.to_string())?);
    }

    let compile_options = CompileOptions {
        lowercase: options.lowercase,
        input_format: options.input_format.into(),
        output_format: options.output_format.into(),
        local_variable_budget: options.local_variable_budget,
        input_bindings,
        output_bindings,
    };

    let lua = {
        let _span = info_span!("compile").entered();
        compile_model(&document, &compile_options).map_err(|(_, diag)| diag.render())?
    };
    info!("compiled {} bytes of Lua", lua.len());

    match &options.out {
        Some(path) => std::fs::write(path, lua).map_err(|e| e.to_string())?,
        None => std::io::stdout().write_all(lua.as_bytes()).map_err(|e| e.to_string())?,
    }
    Ok(())
}
