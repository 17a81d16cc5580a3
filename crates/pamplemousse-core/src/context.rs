//! The compile-time symbol table (§3, §4.1).
//!
//! Holds the input dictionary, the output dictionary, a neuron registry,
//! and a stack of lexical scopes. Owns the id counter, so independent
//! [`ConversionContext`] instances produce independent, deterministic ids
//! even when compiled in parallel (§5, §9 "single process-wide id counter
//! is a latent hazard").

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::field::{DataField, FieldDescription, FieldOrigin, FieldRef};
use crate::value::ValueType;

/// Error raised by context operations. Does not carry a line number;
/// callers attach position via the builder's error sink.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("duplicate name `{0}` in current scope")]
    DuplicateName(String),
}

/// One lexical scope: a map from emitted name to the field it names.
/// Popped wholesale when its guard is dropped.
#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, FieldRef>,
}

/// The compile-time symbol table for one compilation (§3).
///
/// A `ConversionContext` is exclusively owned by one compilation; it may
/// not be shared between compilations (§5).
#[derive(Debug, Default)]
pub struct ConversionContext {
    next_id: u32,
    inputs: IndexMap<String, FieldRef>,
    outputs: IndexMap<String, FieldRef>,
    neurons: IndexMap<String, FieldRef>,
    scopes: Vec<Scope>,
    /// Lower-case compile-time option: when set, names are stored and
    /// looked up in lower-case form so comparisons are case-insensitive.
    pub lowercase: bool,
}

impl ConversionContext {
    pub fn new(lowercase: bool) -> Self {
        Self {
            next_id: 0,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            neurons: IndexMap::new(),
            scopes: vec![Scope::default()],
            lowercase,
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn normalize<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        if self.lowercase {
            std::borrow::Cow::Owned(name.to_ascii_lowercase())
        } else {
            std::borrow::Cow::Borrowed(name)
        }
    }

    /// Look up a name, current scope first, then enclosing scopes.
    pub fn lookup(&self, name: &str) -> Option<FieldRef> {
        let key = self.normalize(name);
        for scope in self.scopes.iter().rev() {
            if let Some(f) = scope.bindings.get(key.as_ref()) {
                return Some(Rc::clone(f));
            }
        }
        None
    }

    /// Check whether `name` already resolves in the *current* (innermost)
    /// scope only (§4.1 "check name collision").
    pub fn collides_in_current_scope(&self, name: &str) -> bool {
        let key = self.normalize(name);
        self.scopes.last().is_some_and(|s| s.bindings.contains_key(key.as_ref()))
    }

    /// Create a named field bound in the current scope.
    pub fn declare(
        &mut self,
        name: &str,
        data_field: DataField,
        origin: FieldOrigin,
    ) -> Result<FieldRef, ContextError> {
        if self.collides_in_current_scope(name) {
            return Err(ContextError::DuplicateName(name.to_string()));
        }
        let id = self.fresh_id();
        let emitted = self.emit_identifier(name);
        let field = FieldDescription::new(id, data_field, origin, emitted);
        let key = self.normalize(name).into_owned();
        self.scopes.last_mut().unwrap().bindings.insert(key, Rc::clone(&field));
        Ok(field)
    }

    /// Create a fresh compiler-introduced temporary of the given type. The
    /// candidate name is uniquified by appending the id so it can never
    /// collide, matching the fresh-name allocation guarantee in §4.1.
    pub fn fresh_temporary(&mut self, value_type: ValueType, candidate: &str) -> FieldRef {
        let id = self.fresh_id();
        let emitted = format!("{}_{}", sanitize_identifier(candidate), id);
        let data_field = DataField::new(value_type, crate::value::OpType::Invalid);
        let field = FieldDescription::new(id, data_field, FieldOrigin::Temporary, emitted);
        self.scopes.last_mut().unwrap().bindings.insert(format!("\0temp{id}"), Rc::clone(&field));
        field
    }

    /// Register an output field. Output fields are created during output
    /// discovery and persist for the remainder of compilation (§3
    /// invariants), so they live in the outermost scope.
    pub fn declare_output(&mut self, name: &str, data_field: DataField) -> Result<FieldRef, ContextError> {
        self.declare_output_as(name, name, data_field)
    }

    /// As [`Self::declare_output`], but the emitted identifier is derived
    /// from `emitted_candidate` rather than `name` — the front-end's
    /// `--output NAME=EMITTED` binding.
    pub fn declare_output_as(&mut self, name: &str, emitted_candidate: &str, data_field: DataField) -> Result<FieldRef, ContextError> {
        let key = self.normalize(name).into_owned();
        if self.outputs.contains_key(&key) {
            return Err(ContextError::DuplicateName(name.to_string()));
        }
        let id = self.fresh_id();
        let emitted = self.emit_identifier(emitted_candidate);
        let field = FieldDescription::new(id, data_field, FieldOrigin::Output, emitted);
        self.outputs.insert(key, Rc::clone(&field));
        Ok(field)
    }

    pub fn declare_input(&mut self, name: &str, data_field: DataField) -> Result<FieldRef, ContextError> {
        self.declare_input_as(name, name, data_field)
    }

    /// As [`Self::declare_input`], but the emitted identifier is derived
    /// from `emitted_candidate` rather than `name` — the front-end's
    /// `--input NAME=EMITTED` binding.
    pub fn declare_input_as(&mut self, name: &str, emitted_candidate: &str, data_field: DataField) -> Result<FieldRef, ContextError> {
        let key = self.normalize(name).into_owned();
        if self.inputs.contains_key(&key) {
            return Err(ContextError::DuplicateName(name.to_string()));
        }
        let id = self.fresh_id();
        let emitted = self.emit_identifier(emitted_candidate);
        let field = FieldDescription::new(id, data_field, FieldOrigin::DataDictionary, emitted);
        self.inputs.insert(key.clone(), Rc::clone(&field));
        self.scopes[0].bindings.insert(key, Rc::clone(&field));
        Ok(field)
    }

    /// Rebinds `name` in the current scope to `field`, replacing whatever
    /// it previously resolved to, without the collision check `declare`
    /// applies. Used by mining-field preprocessing: a cleaned value takes
    /// over a raw input's name for the rest of the scope, so later
    /// lookups (predicates, transformations, the model body) see the
    /// cleaned field without the parser needing to know preprocessing
    /// happened.
    pub fn rebind(&mut self, name: &str, field: FieldRef) {
        let key = self.normalize(name).into_owned();
        self.scopes.last_mut().unwrap().bindings.insert(key, field);
    }

    pub fn declare_neuron(&mut self, id_str: &str, data_field: DataField) -> FieldRef {
        let id = self.fresh_id();
        let emitted = self.emit_identifier(&format!("neuron_{id_str}"));
        let field = FieldDescription::new(id, data_field, FieldOrigin::Special, emitted);
        self.neurons.insert(id_str.to_string(), Rc::clone(&field));
        field
    }

    pub fn lookup_neuron(&self, id_str: &str) -> Option<FieldRef> {
        self.neurons.get(id_str).cloned()
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &FieldRef)> {
        self.inputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &FieldRef)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn neurons(&self) -> impl Iterator<Item = (&str, &FieldRef)> {
        self.neurons.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Turn a candidate name into a legal target-script identifier.
    fn emit_identifier(&self, candidate: &str) -> String {
        let base = sanitize_identifier(candidate);
        let base = if self.lowercase { base.to_ascii_lowercase() } else { base };
        base
    }

    /// Enter a new lexical scope, returning a guard. Bindings added in the
    /// returned guard's lifetime are removed when it is dropped (§4.1
    /// scope discipline, §9 "scope guards as scoped resources").
    pub fn enter_scope(&mut self) -> ScopeGuard<'_> {
        self.scopes.push(Scope::default());
        ScopeGuard { ctx: self }
    }
}

/// RAII scope guard. Leaving a scope removes all bindings added in it;
/// this happens on every exit path, including via early return, because
/// `Drop` runs unconditionally.
pub struct ScopeGuard<'a> {
    ctx: &'a mut ConversionContext,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.scopes.pop();
    }
}

impl std::ops::Deref for ScopeGuard<'_> {
    type Target = ConversionContext;
    fn deref(&self) -> &ConversionContext {
        self.ctx
    }
}

impl std::ops::DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ConversionContext {
        self.ctx
    }
}

/// Replace any character illegal in a target-script identifier with `_`,
/// and ensure the result does not start with a digit.
fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
        if i == 0 && out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OpType;

    fn number_field() -> DataField {
        DataField::new(ValueType::Number, OpType::Continuous)
    }

    #[test]
    fn declare_then_lookup_round_trips() {
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("x", number_field(), FieldOrigin::Temporary).unwrap();
        assert_eq!(ctx.lookup("x"), Some(field));
    }

    #[test]
    fn duplicate_name_in_same_scope_errors() {
        let mut ctx = ConversionContext::new(false);
        ctx.declare("x", number_field(), FieldOrigin::Temporary).unwrap();
        let err = ctx.declare("x", number_field(), FieldOrigin::Temporary).unwrap_err();
        assert_eq!(err, ContextError::DuplicateName("x".to_string()));
    }

    #[test]
    fn scope_guard_removes_bindings_on_drop() {
        let mut ctx = ConversionContext::new(false);
        {
            let mut inner = ctx.enter_scope();
            inner.declare("y", number_field(), FieldOrigin::Temporary).unwrap();
            assert!(inner.lookup("y").is_some());
        }
        assert!(ctx.lookup("y").is_none());
    }

    #[test]
    fn same_name_legal_again_in_outer_scope_after_inner_exits() {
        let mut ctx = ConversionContext::new(false);
        ctx.declare("y", number_field(), FieldOrigin::Temporary).unwrap();
        {
            let mut inner = ctx.enter_scope();
            // shadowing is fine; different scope
            inner.declare("y", number_field(), FieldOrigin::Temporary).unwrap();
        }
        // outer binding for y is still visible and unharmed
        assert!(ctx.lookup("y").is_some());
    }

    #[test]
    fn lowercase_mode_folds_lookups() {
        let mut ctx = ConversionContext::new(true);
        ctx.declare("Outlook", number_field(), FieldOrigin::Temporary).unwrap();
        assert!(ctx.lookup("outlook").is_some());
        assert!(ctx.lookup("OUTLOOK").is_some());
    }

    #[test]
    fn fresh_temporaries_never_collide() {
        let mut ctx = ConversionContext::new(false);
        let a = ctx.fresh_temporary(ValueType::Number, "tmp");
        let b = ctx.fresh_temporary(ValueType::Number, "tmp");
        assert_ne!(a.emitted_name, b.emitted_name);
    }

    #[test]
    fn sanitizes_illegal_identifier_characters() {
        let mut ctx = ConversionContext::new(false);
        let field = ctx.declare("weird name!", number_field(), FieldOrigin::Temporary).unwrap();
        assert_eq!(field.emitted_name, "weird_name_");
    }
}
