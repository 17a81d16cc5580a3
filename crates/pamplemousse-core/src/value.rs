//! The closed value-type enumeration shared by the AST, the function
//! catalogue, and the emitter (§3 Data Model).

use std::fmt;

/// A value type in the target scripting language.
///
/// Implicit coercion is permitted only from more permissive toward less
/// permissive, along the fixed order `String` ≻ `Number` ≻ `Bool`.
/// Downward coercion (e.g. `Bool` to `Number`) must be requested explicitly
/// via [`ValueType::coercible_to`] plus an inserted conversion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Bool,
    /// The value of a missing or unparsable field.
    Invalid,
    /// No meaningful value; used for statement-shaped nodes.
    Void,
    /// A function value, used internally for `MapValues`/`Apply` closures.
    Lambda,
    /// A key to value table (`{[k] = v, ...}`).
    Table,
    /// A key to string table, used for compact set-membership constants.
    StringTable,
}

impl ValueType {
    /// Rank along the fixed permissiveness order. Lower is more permissive.
    /// Types outside the String/Number/Bool chain have no implicit
    /// coercions and are left at the bottom of the order.
    fn rank(self) -> u8 {
        match self {
            ValueType::String => 0,
            ValueType::Number => 1,
            ValueType::Bool => 2,
            ValueType::Invalid => 3,
            ValueType::Void | ValueType::Lambda | ValueType::Table | ValueType::StringTable => 4,
        }
    }

    /// Whether a value of `self` may be used where `target` is expected
    /// without an explicit conversion call. `Invalid` is coercible to
    /// anything (a missing value propagates silently); a type is always
    /// coercible to itself.
    pub fn coercible_to(self, target: ValueType) -> bool {
        if self == target || self == ValueType::Invalid {
            return true;
        }
        matches!(
            (self, target),
            (ValueType::String, ValueType::Number)
                | (ValueType::String, ValueType::Bool)
                | (ValueType::Number, ValueType::Bool)
        ) || self.rank() < target.rank() && target.rank() <= ValueType::Bool.rank()
    }

    /// True for types a field-valued AST node may settle on; excludes the
    /// purely compiler-internal `Lambda`/`Table`/`StringTable` kinds.
    pub fn is_scalar(self) -> bool {
        matches!(self, ValueType::String | ValueType::Number | ValueType::Bool)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Bool => "bool",
            ValueType::Invalid => "invalid",
            ValueType::Void => "void",
            ValueType::Lambda => "lambda",
            ValueType::Table => "table",
            ValueType::StringTable => "string-table",
        };
        f.write_str(s)
    }
}

/// Data-dictionary operational type. Governs which predicate/transformation
/// shapes are legal for a field (set-membership on `Categorical`, range
/// comparisons preferred on `Continuous`/`Ordinal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Categorical,
    Continuous,
    Ordinal,
    Invalid,
}

impl OpType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "categorical" => OpType::Categorical,
            "continuous" => OpType::Continuous,
            "ordinal" => OpType::Ordinal,
            _ => OpType::Invalid,
        }
    }
}

/// Converts a PMML `dataType` attribute value to a [`ValueType`].
/// Unknown or absent values fall back to `Invalid`; callers decide whether
/// that is itself an error.
pub fn value_type_from_str(s: &str) -> ValueType {
    match s {
        "string" => ValueType::String,
        "boolean" => ValueType::Bool,
        "integer" | "float" | "double" => ValueType::Number,
        _ => ValueType::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_coerces_downward_to_number_and_bool() {
        assert!(ValueType::String.coercible_to(ValueType::Number));
        assert!(ValueType::String.coercible_to(ValueType::Bool));
        assert!(!ValueType::Number.coercible_to(ValueType::String));
    }

    #[test]
    fn invalid_coerces_to_anything() {
        assert!(ValueType::Invalid.coercible_to(ValueType::String));
        assert!(ValueType::Invalid.coercible_to(ValueType::Table));
    }

    #[test]
    fn same_type_always_coercible() {
        assert!(ValueType::Table.coercible_to(ValueType::Table));
    }
}
