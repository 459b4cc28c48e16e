//! Cell type classification
//!
//! Primitive cells use the `$`-prefixed type names of the synthesis flow. Taint
//! nodes created by instrumentation use fixed names understood by the
//! simulation library.

/// Taint node for a one-operand combinational cell
pub const TAINT_UNARY: &str = "taintcell_1I1O";
/// Taint node for a two-operand combinational cell
pub const TAINT_BINARY: &str = "taintcell_2I1O";
/// Taint node for the multiplexer family
pub const TAINT_MUX: &str = "taintcell_mux";
/// Taint node for flip-flops
pub const TAINT_REGISTER: &str = "taintcell_dff";
/// Taint node for memory arrays
pub const TAINT_MEMORY: &str = "taintcell_mem";
/// Per-module coverage hash collector
pub const COVERAGE_COLLECTOR: &str = "tainthelp_coverage";

const UNARY_CELLS: &[&str] = &[
    "$not",
    "$pos",
    "$neg",
    "$reduce_and",
    "$reduce_or",
    "$reduce_xor",
    "$reduce_xnor",
    "$reduce_bool",
    "$logic_not",
];

const BINARY_CELLS: &[&str] = &[
    "$and", "$or", "$xor", "$xnor", "$shift", "$shiftx", "$lt", "$le", "$eq", "$ne", "$eqx",
    "$nex", "$ge", "$gt", "$add", "$sub", "$mul", "$div", "$mod", "$divfloor", "$modfloor",
    "$logic_and", "$logic_or", "$shl", "$shr", "$sshl", "$sshr",
];

const MUX_CELLS: &[&str] = &["$mux", "$bwmux", "$pmux"];

const REGISTER_CELLS: &[&str] = &[
    "$dff", "$dffe", "$adff", "$adffe", "$sdff", "$sdffe", "$sdffce", "$aldff", "$aldffe",
];

const MEMORY_CELLS: &[&str] = &["$mem", "$mem_v2"];

/// Cells that neither carry data nor need a taint mirror
const PASSTHROUGH_CELLS: &[&str] = &[
    "$scopeinfo",
    "$print",
    "$check",
    "$assert",
    "$assume",
    "$cover",
    COVERAGE_COLLECTOR,
];

/// Shape of a primitive cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveClass {
    Unary,
    Binary,
    Mux,
    Register,
    Memory,
}

/// Kinds of taint node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaintCellKind {
    Unary,
    Binary,
    Mux,
    Register,
    Memory,
}

impl TaintCellKind {
    pub fn cell_type(self) -> &'static str {
        match self {
            TaintCellKind::Unary => TAINT_UNARY,
            TaintCellKind::Binary => TAINT_BINARY,
            TaintCellKind::Mux => TAINT_MUX,
            TaintCellKind::Register => TAINT_REGISTER,
            TaintCellKind::Memory => TAINT_MEMORY,
        }
    }

    pub fn from_cell_type(cell_type: &str) -> Option<Self> {
        match cell_type {
            TAINT_UNARY => Some(TaintCellKind::Unary),
            TAINT_BINARY => Some(TaintCellKind::Binary),
            TAINT_MUX => Some(TaintCellKind::Mux),
            TAINT_REGISTER => Some(TaintCellKind::Register),
            TAINT_MEMORY => Some(TaintCellKind::Memory),
            _ => None,
        }
    }
}

impl From<PrimitiveClass> for TaintCellKind {
    fn from(class: PrimitiveClass) -> Self {
        match class {
            PrimitiveClass::Unary => TaintCellKind::Unary,
            PrimitiveClass::Binary => TaintCellKind::Binary,
            PrimitiveClass::Mux => TaintCellKind::Mux,
            PrimitiveClass::Register => TaintCellKind::Register,
            PrimitiveClass::Memory => TaintCellKind::Memory,
        }
    }
}

/// Classify a `$`-prefixed primitive type
pub fn classify_primitive(cell_type: &str) -> Option<PrimitiveClass> {
    if UNARY_CELLS.contains(&cell_type) {
        Some(PrimitiveClass::Unary)
    } else if BINARY_CELLS.contains(&cell_type) {
        Some(PrimitiveClass::Binary)
    } else if MUX_CELLS.contains(&cell_type) {
        Some(PrimitiveClass::Mux)
    } else if REGISTER_CELLS.contains(&cell_type) {
        Some(PrimitiveClass::Register)
    } else if MEMORY_CELLS.contains(&cell_type) {
        Some(PrimitiveClass::Memory)
    } else {
        None
    }
}

/// Cells that need no taint mirror
pub fn is_passthrough(cell_type: &str) -> bool {
    PASSTHROUGH_CELLS.contains(&cell_type)
}

/// Original register primitive or its taint mirror
pub fn is_register(cell_type: &str) -> bool {
    cell_type == TAINT_REGISTER || classify_primitive(cell_type) == Some(PrimitiveClass::Register)
}

/// Original memory primitive or its taint mirror
pub fn is_memory(cell_type: &str) -> bool {
    cell_type == TAINT_MEMORY || classify_primitive(cell_type) == Some(PrimitiveClass::Memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_primitives() {
        assert_eq!(classify_primitive("$not"), Some(PrimitiveClass::Unary));
        assert_eq!(classify_primitive("$sshr"), Some(PrimitiveClass::Binary));
        assert_eq!(classify_primitive("$pmux"), Some(PrimitiveClass::Mux));
        assert_eq!(classify_primitive("$sdffce"), Some(PrimitiveClass::Register));
        assert_eq!(classify_primitive("$mem_v2"), Some(PrimitiveClass::Memory));
        assert_eq!(classify_primitive("$fancy"), None);
        assert_eq!(classify_primitive("Queue"), None);
    }

    #[test]
    fn test_taint_cell_names() {
        for kind in [
            TaintCellKind::Unary,
            TaintCellKind::Binary,
            TaintCellKind::Mux,
            TaintCellKind::Register,
            TaintCellKind::Memory,
        ] {
            assert_eq!(TaintCellKind::from_cell_type(kind.cell_type()), Some(kind));
        }
        assert!(is_register(TAINT_REGISTER));
        assert!(is_memory("$mem"));
        assert!(is_passthrough(COVERAGE_COLLECTOR));
    }
}
