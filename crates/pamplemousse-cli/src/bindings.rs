//! Parses `--input`/`--output` flag values into the binding structures
//! [`pamplemousse_compiler::compile_model`] consumes (§6).

use pamplemousse_compiler::{InputBinding, OutputBinding, OutputTransform};

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("invalid binding `{0}`: missing a field name")]
    MissingName(String),
}

/// `NAME` or `NAME=EMITTED`.
pub fn parse_input(raw: &str) -> Result<InputBinding, BindingError> {
    let (name, emitted) = split_emitted(raw);
    if name.is_empty() {
        return Err(BindingError::MissingName(raw.to_string()));
    }
    Ok(InputBinding { name, emitted })
}

/// `NAME[=EMITTED][+|-|*|/NUMBER][,PRECISION]`, or `neuron:<id>[=EMITTED]...`
/// with the same suffix grammar.
pub fn parse_output(raw: &str) -> Result<OutputBinding, BindingError> {
    let mut rest = raw;

    let mut precision = None;
    if let Some((head, tail)) = rest.rsplit_once(',') {
        if let Ok(p) = tail.parse::<u32>() {
            precision = Some(p);
            rest = head;
        }
    }

    let mut transform = None;
    for op in ['+', '-', '*', '/'] {
        if let Some(idx) = rest.rfind(op) {
            if idx > 0 {
                if let Ok(operand) = rest[idx + op.len_utf8()..].parse::<f64>() {
                    transform = Some(OutputTransform { op, operand });
                    rest = &rest[..idx];
                    break;
                }
            }
        }
    }

    let (name, emitted) = split_emitted(rest);
    if name.is_empty() {
        return Err(BindingError::MissingName(raw.to_string()));
    }
    Ok(OutputBinding { name, emitted, transform, precision })
}

fn split_emitted(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((name, emitted)) => (name.to_string(), Some(emitted.to_string())),
        None => (raw.to_string(), None),
    }
}
