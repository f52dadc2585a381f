//! External function signatures and references.

use crate::ir::types::Type;
use core::fmt;

/// How a function argument or return value is passed, beyond its raw type: this core only
/// ever uses `Normal`, but the field exists (as it does in the teacher's `AbiParam`) so a
/// future purpose-carrying param (e.g. a struct-return pointer) has somewhere to attach.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgumentPurpose {
    /// A normal WebAssembly-level parameter or return value.
    Normal,
    /// The execution-context pointer, always the first parameter.
    ExecutionContext,
    /// The module-instance pointer, always the second parameter.
    ModuleInstance,
}

/// One parameter or return value slot in a `Signature`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AbiParam {
    /// The value type carried in this slot.
    pub value_type: Type,
    /// The role this slot plays in the calling convention.
    pub purpose: ArgumentPurpose,
}

impl AbiParam {
    /// A plain parameter of the given type.
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            purpose: ArgumentPurpose::Normal,
        }
    }

    /// A parameter carrying a special purpose.
    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            value_type,
            purpose,
        }
    }
}

impl fmt::Display for AbiParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value_type)
    }
}

/// A function signature: parameter and return value types, in order.
///
/// By convention (see `SPEC_FULL.md` section 4.3) the first two `params` are always the
/// execution-context pointer and module-instance pointer; callers of `Signature::wasm`
/// get those two prepended automatically so call sites only need to think in WebAssembly
/// param/return types.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Signature {
    /// Parameters, execution-context and module-instance prefix included.
    pub params: std::vec::Vec<AbiParam>,
    /// Return values.
    pub returns: std::vec::Vec<AbiParam>,
}

impl Signature {
    /// An empty signature.
    pub fn new() -> Self {
        Self {
            params: std::vec::Vec::new(),
            returns: std::vec::Vec::new(),
        }
    }

    /// Build a signature for a WebAssembly function type, prepending the
    /// (execution-context, module-instance) pointer pair that every emitted function
    /// receives.
    pub fn wasm(wasm_params: &[Type], wasm_returns: &[Type]) -> Self {
        let mut params = std::vec::Vec::with_capacity(wasm_params.len() + 2);
        params.push(AbiParam::special(
            Type::REF,
            ArgumentPurpose::ExecutionContext,
        ));
        params.push(AbiParam::special(
            Type::REF,
            ArgumentPurpose::ModuleInstance,
        ));
        params.extend(wasm_params.iter().map(|&t| AbiParam::new(t)));
        Self {
            params,
            returns: wasm_returns.iter().map(|&t| AbiParam::new(t)).collect(),
        }
    }

    /// Clear to the default empty signature.
    pub fn clear(&mut self) {
        self.params.clear();
        self.returns.clear();
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> (")?;
        for (i, r) in self.returns.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        write!(f, ")")
    }
}

/// The name of an external (imported or intra-module) function, identified by its index in
/// the module's function table. Module-level naming/symbol resolution is out of scope; the
/// core only needs to distinguish "this one" from "that one".
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ExternalName {
    /// Index into the module's function table.
    pub index: u32,
}

impl ExternalName {
    /// Name a function by its module-level function index.
    pub fn user(index: u32) -> Self {
        Self { index }
    }
}

impl Default for ExternalName {
    fn default() -> Self {
        Self { index: u32::max_value() }
    }
}

impl fmt::Display for ExternalName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fn{}", self.index)
    }
}

/// Data describing a callee reachable through a `FuncRef`: either a direct intra-module
/// call (known function index) or an imported call (known import index), each carrying the
/// signature the call site was lowered against.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExtFuncData {
    /// The callee's signature.
    pub signature: Signature,
    /// Which function (by module-level function index) this reference names.
    pub name: ExternalName,
    /// Whether this callee is an imported function (resolved via the module-context
    /// offsets) rather than an intra-module direct call (resolved via a relocation).
    pub imported: bool,
}
