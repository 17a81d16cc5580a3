//! Field descriptions and mining-field use-site annotations (§3 Data Model).

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::value::{OpType, ValueType};

/// Where a field's value originates. Drives how the emitter's name policy
/// and the analyser's missingness defaults treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOrigin {
    /// A model input declared in the `DataDictionary`.
    DataDictionary,
    /// A model output (`OutputField`, predicted value, probability, ...).
    Output,
    /// A `DerivedField` computed by a `LocalTransformations`/`TransformationDictionary`.
    TransformedValue,
    /// A compiler-introduced temporary (loop accumulators, sub-expressions).
    Temporary,
    /// A function parameter within a `lambda` body.
    Parameter,
    /// Special bookkeeping slots (e.g. an entity-id accumulator) that do not
    /// correspond to any PMML-visible field.
    Special,
}

/// The data field proper: its declared value type, its operational type,
/// and, for categorical fields, the ordered list of observed category
/// values (insertion order is the tie-break order for winner selection).
#[derive(Debug, Clone)]
pub struct DataField {
    pub value_type: ValueType,
    pub op_type: OpType,
    pub categories: Vec<String>,
}

impl DataField {
    pub fn new(value_type: ValueType, op_type: OpType) -> Self {
        Self { value_type, op_type, categories: Vec::new() }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }
}

/// A shared, immutable field description plus one mutable slot: the
/// overflow-assignment index the emitter assigns when a function's local
/// variable count would exceed the target script's per-call budget
/// (§4.8, §9). Field descriptions are referred to by shared reference
/// ([`FieldRef`]); the same input field seen in two scopes is the same
/// description (§3 invariants).
#[derive(Debug)]
pub struct FieldDescription {
    pub id: u32,
    pub data_field: DataField,
    pub origin: FieldOrigin,
    /// The identifier the emitter writes for this field. Always a legal
    /// target-script identifier; disambiguated by appending the id when a
    /// caller-supplied candidate collided with an existing binding.
    pub emitted_name: String,
    /// Slot index into the overflow table, or `None` if this field is
    /// emitted as an ordinary local/parameter. Assigned by the emitter,
    /// not at construction time.
    overflow_slot: Cell<Option<u32>>,
}

/// A shared handle to a [`FieldDescription`]. AST nodes hold this, never a
/// bare name, so that renames and overflow-slot assignment are visible
/// everywhere the field is referenced.
pub type FieldRef = Rc<FieldDescription>;

impl FieldDescription {
    pub fn new(id: u32, data_field: DataField, origin: FieldOrigin, emitted_name: String) -> FieldRef {
        Rc::new(Self {
            id,
            data_field,
            origin,
            emitted_name,
            overflow_slot: Cell::new(None),
        })
    }

    pub fn value_type(&self) -> ValueType {
        self.data_field.value_type
    }

    pub fn overflow_slot(&self) -> Option<u32> {
        self.overflow_slot.get()
    }

    /// Assign this field's storage to an overflow-table slot. Called only
    /// by the emitter, and only once per field.
    pub fn set_overflow_slot(&self, slot: u32) {
        debug_assert!(self.overflow_slot.get().is_none(), "overflow slot assigned twice");
        self.overflow_slot.set(Some(slot));
    }
}

impl fmt::Display for FieldDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.emitted_name, self.id)
    }
}

impl PartialEq for FieldDescription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for FieldDescription {}

impl std::hash::Hash for FieldDescription {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Outlier treatment for a mining field, applied before the field is read
/// by the model body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutlierTreatment {
    #[default]
    AsIs,
    AsMissing,
    AsExtremeValues,
}

impl OutlierTreatment {
    pub fn from_str(s: &str) -> Self {
        match s {
            "asMissingValues" => OutlierTreatment::AsMissing,
            "asExtremeValues" => OutlierTreatment::AsExtremeValues,
            _ => OutlierTreatment::AsIs,
        }
    }
}

/// A use-site annotation over a field description (§3: Mining field).
/// Missing-value treatment rules (replacement, outlier clipping) apply
/// before the field is read by the model body.
#[derive(Debug, Clone)]
pub struct MiningField {
    pub field: FieldRef,
    pub missing_value_replacement: Option<String>,
    pub invalid_value_replacement: Option<String>,
    pub outlier_treatment: OutlierTreatment,
    pub low_value: Option<f64>,
    pub high_value: Option<f64>,
}

impl MiningField {
    pub fn new(field: FieldRef) -> Self {
        Self {
            field,
            missing_value_replacement: None,
            invalid_value_replacement: None,
            outlier_treatment: OutlierTreatment::AsIs,
            low_value: None,
            high_value: None,
        }
    }

    pub fn needs_preprocessing(&self) -> bool {
        self.missing_value_replacement.is_some()
            || self.invalid_value_replacement.is_some()
            || self.outlier_treatment != OutlierTreatment::AsIs
    }
}
