//! Core data structures shared by the Pamplemousse model-to-script compiler.
//!
//! - [`value`] / [`field`] — the closed value-type enumeration and field
//!   descriptions (§3 Data Model, C1).
//! - [`context`] — the compile-time symbol table (§4.1, C2).
//! - [`ast`] / [`builder`] — the AST and its stack-based builder (§4.2, C3).
//! - [`catalogue`] — the function/operator registry (§4.3, C4).
//! - [`interner`] — string interning for category-value string tables.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod ast;
pub mod builder;
pub mod catalogue;
pub mod context;
pub mod field;
pub mod interner;
pub mod value;

pub use ast::{AstKind, AstNode, FunctionId, IfArm, Literal};
pub use builder::{AstBuilder, ErrorSink};
pub use catalogue::{Arity, Catalogue, FunctionEntry, MissingnessClass, Notation, Precedence};
pub use context::{ContextError, ConversionContext, ScopeGuard};
pub use field::{DataField, FieldDescription, FieldOrigin, FieldRef, MiningField, OutlierTreatment};
pub use interner::{Interner, Symbol};
pub use value::{OpType, ValueType, value_type_from_str};
