//! The error type shared across every stage of the compiler core.
//!
//! Grounded on `cranelift-codegen::result`, which builds its `CodegenError` on `failure`;
//! this crate keeps that dependency rather than introducing a newer error-derive crate the
//! teacher project didn't use at this vintage (see DESIGN.md).

use failure_derive::Fail;

use crate::ir::AnyEntity;

/// The four error kinds described in SPEC_FULL.md section 7.
#[derive(Fail, Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// The function body does not validate. Should not occur if the caller already
    /// validated the WebAssembly; guarded by debug assertions at the call sites that would
    /// otherwise panic.
    #[fail(display = "validation error at {}: {}", location, message)]
    ValidationError {
        /// Where in the function the problem was found.
        location: AnyEntity,
        /// A human-readable description.
        message: std::string::String,
    },

    /// An opcode or type isn't implemented for the target yet. Fatal for the function.
    #[fail(display = "unsupported feature: {}", 0)]
    UnsupportedFeature(std::string::String),

    /// A should-never-happen condition: a bug in this compiler, not in its input.
    #[fail(display = "internal invariant violated: {}", 0)]
    InternalInvariant(std::string::String),

    /// A branch displacement exceeds even the long form.
    #[fail(display = "code too large in function {}", function)]
    CodeTooLarge {
        /// The function that triggered the limit.
        function: std::string::String,
    },
}

/// The result type returned by every fallible stage of the compiler core.
pub type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    /// Build a `ValidationError` at the given location.
    pub fn validation(location: impl Into<AnyEntity>, message: impl Into<std::string::String>) -> Self {
        CodegenError::ValidationError {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Build an `UnsupportedFeature` error.
    pub fn unsupported(message: impl Into<std::string::String>) -> Self {
        CodegenError::UnsupportedFeature(message.into())
    }

    /// Build an `InternalInvariant` error. In debug builds, call sites should prefer
    /// `debug_assert!`/`panic!` directly; this constructor is for release-build paths that
    /// must still surface a structured error instead of aborting the whole process.
    pub fn bug(message: impl Into<std::string::String>) -> Self {
        CodegenError::InternalInvariant(message.into())
    }
}
