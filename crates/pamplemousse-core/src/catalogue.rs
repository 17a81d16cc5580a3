//! The function catalogue (§4.3): a closed registry of every scalar
//! operator, arithmetic built-in, and statement-shaped macro used by
//! compiled code, keyed by a stable string identifier.

use std::collections::HashMap;

use crate::ast::FunctionId;
use crate::value::ValueType;

/// Fixed or variadic argument arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// At least this many arguments, no upper bound.
    Variadic(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n == k,
            Arity::Variadic(min) => n >= min,
        }
    }
}

/// Precedence class, used by the emitter to decide when an expression must
/// be parenthesised inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Literals, field references, calls, table indexing.
    Primary,
    Unary,
    Multiplicative,
    Additive,
    Relational,
    Equality,
    LogicalAnd,
    LogicalOr,
    /// Statement-shaped entries: assignment, declaration, if-chain, block,
    /// return. Never appear nested inside an expression.
    Statement,
}

/// Missing-value propagation class (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingnessClass {
    NeverMissing,
    MissingIfAnyArgumentMissing,
    MissingIfAllArgumentsMissing,
    /// Tries arguments in order; the first non-missing one wins.
    SurrogateMacro,
    IsMissing,
    IsNotMissing,
    /// The right-hand argument substitutes when the left is missing.
    DefaultValue,
}

/// How a function is written back out by the emitter: as an infix/prefix
/// operator, or as an ordinary call `name(args...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    Infix(&'static str),
    Prefix(&'static str),
    Call(&'static str),
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub id: FunctionId,
    pub name: &'static str,
    pub arity: Arity,
    pub arg_types: Vec<ValueType>,
    pub return_type: ValueType,
    pub precedence: Precedence,
    pub missingness: MissingnessClass,
    pub notation: Notation,
}

impl FunctionEntry {
    /// The expected type for argument `idx`. For variadic entries every
    /// position shares `arg_types[0]`.
    pub fn arg_type(&self, idx: usize) -> ValueType {
        match self.arity {
            Arity::Fixed(_) => self.arg_types[idx],
            Arity::Variadic(_) => self.arg_types[0],
        }
    }
}

/// A closed registry of catalogue entries, keyed by stable identifier.
#[derive(Debug)]
pub struct Catalogue {
    entries: Vec<FunctionEntry>,
    by_name: HashMap<&'static str, FunctionId>,
}

macro_rules! entry {
    ($entries:expr, $by_name:expr, $name:expr, $arity:expr, $arg_types:expr, $ret:expr, $prec:expr, $miss:expr, $notation:expr) => {{
        let id = FunctionId($entries.len() as u32);
        $entries.push(FunctionEntry {
            id,
            name: $name,
            arity: $arity,
            arg_types: $arg_types,
            return_type: $ret,
            precedence: $prec,
            missingness: $miss,
            notation: $notation,
        });
        $by_name.insert($name, id);
    }};
}

impl Catalogue {
    /// Build the standard catalogue. Cheap; called once per compilation.
    pub fn standard() -> Self {
        use Arity::*;
        use MissingnessClass::*;
        use Notation::*;
        use Precedence::*;
        use ValueType::*;

        let mut entries = Vec::new();
        let mut by_name = HashMap::new();

        entry!(entries, by_name, "+", Fixed(2), vec![Number, Number], Number, Additive, MissingIfAnyArgumentMissing, Infix("+"));
        entry!(entries, by_name, "-", Fixed(2), vec![Number, Number], Number, Additive, MissingIfAnyArgumentMissing, Infix("-"));
        entry!(entries, by_name, "neg", Fixed(1), vec![Number], Number, Unary, MissingIfAnyArgumentMissing, Prefix("-"));
        entry!(entries, by_name, "*", Fixed(2), vec![Number, Number], Number, Multiplicative, MissingIfAnyArgumentMissing, Infix("*"));
        entry!(entries, by_name, "/", Fixed(2), vec![Number, Number], Number, Multiplicative, MissingIfAnyArgumentMissing, Infix("/"));
        entry!(entries, by_name, "min", Variadic(2), vec![Number], Number, Primary, MissingIfAllArgumentsMissing, Call("math.min"));
        entry!(entries, by_name, "max", Variadic(2), vec![Number], Number, Primary, MissingIfAllArgumentsMissing, Call("math.max"));
        entry!(entries, by_name, "avg", Variadic(2), vec![Number], Number, Primary, MissingIfAllArgumentsMissing, Call("pmml_avg"));
        entry!(entries, by_name, "sum", Variadic(2), vec![Number], Number, Primary, MissingIfAllArgumentsMissing, Call("pmml_sum"));
        entry!(entries, by_name, "abs", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.abs"));
        entry!(entries, by_name, "exp", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.exp"));
        entry!(entries, by_name, "ln", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.log"));
        entry!(entries, by_name, "log10", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("pmml_log10"));
        entry!(entries, by_name, "sqrt", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.sqrt"));
        entry!(entries, by_name, "pow", Fixed(2), vec![Number, Number], Number, Multiplicative, MissingIfAnyArgumentMissing, Infix("^"));
        entry!(entries, by_name, "threshold", Fixed(2), vec![Number, Number], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_threshold"));
        entry!(entries, by_name, "floor", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.floor"));
        entry!(entries, by_name, "ceiling", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("math.ceil"));
        entry!(entries, by_name, "round", Fixed(1), vec![Number], Number, Primary, MissingIfAnyArgumentMissing, Call("pmml_round"));

        entry!(entries, by_name, "==", Fixed(2), vec![String, String], Bool, Equality, MissingIfAnyArgumentMissing, Infix("=="));
        entry!(entries, by_name, "!=", Fixed(2), vec![String, String], Bool, Equality, MissingIfAnyArgumentMissing, Infix("~="));
        entry!(entries, by_name, "<", Fixed(2), vec![Number, Number], Bool, Relational, MissingIfAnyArgumentMissing, Infix("<"));
        entry!(entries, by_name, "<=", Fixed(2), vec![Number, Number], Bool, Relational, MissingIfAnyArgumentMissing, Infix("<="));
        entry!(entries, by_name, ">", Fixed(2), vec![Number, Number], Bool, Relational, MissingIfAnyArgumentMissing, Infix(">"));
        entry!(entries, by_name, ">=", Fixed(2), vec![Number, Number], Bool, Relational, MissingIfAnyArgumentMissing, Infix(">="));

        entry!(entries, by_name, "and", Variadic(2), vec![Bool], Bool, LogicalAnd, MissingIfAnyArgumentMissing, Infix("and"));
        entry!(entries, by_name, "or", Variadic(2), vec![Bool], Bool, LogicalOr, MissingIfAnyArgumentMissing, Infix("or"));
        entry!(entries, by_name, "xor", Fixed(2), vec![Bool, Bool], Bool, Equality, MissingIfAnyArgumentMissing, Infix("~="));
        entry!(entries, by_name, "not", Fixed(1), vec![Bool], Bool, Unary, MissingIfAnyArgumentMissing, Prefix("not "));

        entry!(entries, by_name, "uppercase", Fixed(1), vec![String], String, Primary, MissingIfAnyArgumentMissing, Call("string.upper"));
        entry!(entries, by_name, "lowercase", Fixed(1), vec![String], String, Primary, MissingIfAnyArgumentMissing, Call("string.lower"));
        entry!(entries, by_name, "trimBlanks", Fixed(1), vec![String], String, Primary, MissingIfAnyArgumentMissing, Call("pmml_trim"));
        entry!(entries, by_name, "concat", Variadic(2), vec![String], String, Additive, MissingIfAnyArgumentMissing, Infix(".."));
        entry!(entries, by_name, "substring", Fixed(3), vec![String, Number, Number], String, Primary, MissingIfAnyArgumentMissing, Call("string.sub"));
        entry!(entries, by_name, "stringLength", Fixed(1), vec![String], Number, Primary, MissingIfAnyArgumentMissing, Call("string.len"));
        entry!(entries, by_name, "equalsIgnoreCase", Fixed(2), vec![String, String], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_eq_ignore_case"));

        entry!(entries, by_name, "isMissing", Fixed(1), vec![Invalid], Bool, Primary, IsMissing, Call("pmml_is_missing"));
        entry!(entries, by_name, "isNotMissing", Fixed(1), vec![Invalid], Bool, Primary, IsNotMissing, Call("pmml_is_not_missing"));
        entry!(entries, by_name, "isIn", Variadic(2), vec![String], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_is_in"));
        entry!(entries, by_name, "isNotIn", Variadic(2), vec![String], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_is_not_in"));
        entry!(entries, by_name, "tableIsIn", Fixed(2), vec![StringTable, String], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_table_is_in"));

        entry!(entries, by_name, "default", Fixed(2), vec![Invalid, Invalid], Invalid, Primary, DefaultValue, Call("pmml_default"));
        entry!(entries, by_name, "surrogate", Variadic(1), vec![Invalid], Invalid, Primary, SurrogateMacro, Call("pmml_surrogate"));

        entry!(entries, by_name, "toString", Fixed(1), vec![Invalid], String, Primary, MissingIfAnyArgumentMissing, Call("tostring"));
        entry!(entries, by_name, "toNumber", Fixed(1), vec![Invalid], Number, Primary, MissingIfAnyArgumentMissing, Call("tonumber"));
        entry!(entries, by_name, "toBool", Fixed(1), vec![Invalid], Bool, Primary, MissingIfAnyArgumentMissing, Call("pmml_to_bool"));

        entry!(entries, by_name, "normalizeLinear", Fixed(5), vec![Number, Number, Number, Number, Number], Number, Primary, MissingIfAnyArgumentMissing, Call("pmml_normalize_linear"));
        entry!(entries, by_name, "if", Fixed(3), vec![Bool, Invalid, Invalid], Invalid, Primary, MissingIfAnyArgumentMissing, Call("pmml_if"));

        // Nullary sentinels for the emitter's "constant representing a
        // sentinel infinity value" (§4.8): model compilers that need an
        // always-overtaken initial running-best (ruleset `weightedMax`,
        // mining `max`/`sum` accumulators) push one of these rather than a
        // finite literal that could tie with a real score.
        entry!(entries, by_name, "negInfinity", Fixed(0), vec![], Number, Primary, NeverMissing, Call("-math.huge"));
        entry!(entries, by_name, "posInfinity", Fixed(0), vec![], Number, Primary, NeverMissing, Call("math.huge"));

        Self { entries, by_name }
    }

    pub fn get(&self, id: FunctionId) -> &FunctionEntry {
        &self.entries[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionEntry> {
        self.by_name.get(name).map(|id| self.get(*id))
    }

    pub fn id_of(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalogue_has_arithmetic_operators() {
        let cat = Catalogue::standard();
        let plus = cat.lookup("+").unwrap();
        assert_eq!(plus.arity, Arity::Fixed(2));
        assert_eq!(plus.return_type, ValueType::Number);
    }

    #[test]
    fn variadic_min_accepts_three_args() {
        let cat = Catalogue::standard();
        let min = cat.lookup("min").unwrap();
        assert!(min.arity.accepts(3));
        assert!(!min.arity.accepts(1));
    }

    #[test]
    fn is_missing_has_is_missing_class() {
        let cat = Catalogue::standard();
        let f = cat.lookup("isMissing").unwrap();
        assert_eq!(f.missingness, MissingnessClass::IsMissing);
    }
}
