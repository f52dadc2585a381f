//! Pretty-printing for verifier and codegen errors.
//!
//! Grounded on the teacher's `cranelift-codegen::print_errors`: the same arrow-pointer
//! annotation convention (a `;` comment line with a `^~~~` marker under the offending
//! location, followed by `; error: ...`), simplified to annotate the bare `AnyEntity` label
//! (`inst12`, `ebb3`, ...) rather than a full decorated IR listing, since this crate has no
//! `write::FuncWriter`-style function-text printer to hang the annotation under.

use core::fmt::Write;

use crate::result::CodegenError;
use crate::verifier::{VerifierError, VerifierErrors};

/// Render every verifier error as an arrow-annotated line under its location label.
pub fn pretty_verifier_errors(errors: &VerifierErrors) -> std::string::String {
    let mut w = std::string::String::new();
    for err in &errors.0 {
        pretty_one(&mut w, err);
    }
    let _ = writeln!(
        w,
        "; {} verifier error{} detected (see above). Compilation aborted.",
        errors.0.len(),
        if errors.0.len() == 1 { "" } else { "s" }
    );
    w
}

fn pretty_one(w: &mut std::string::String, err: &VerifierError) {
    let label = err.location.to_string();
    let _ = writeln!(w, "; {}", label);
    let _ = writeln!(w, ";{}^{}", " ".repeat(label.len()), "~".repeat(label.len().saturating_sub(1)));
    let _ = writeln!(w, "; error: {}", err.message);
}

/// Pretty-print a `CodegenError`. A `ValidationError` gets the arrow-annotated single-line
/// form; every other kind is just its `Display` text, since the other three kinds don't carry
/// a source location to annotate.
pub fn pretty_error(err: &CodegenError) -> std::string::String {
    if let CodegenError::ValidationError { location, message } = err {
        let mut w = std::string::String::new();
        pretty_one(
            &mut w,
            &VerifierError {
                location: *location,
                message: message.clone(),
            },
        );
        w
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::AnyEntity;
    use waot_entity::EntityRef;

    #[test]
    fn annotates_location_and_message() {
        let errors = VerifierErrors(std::vec![VerifierError {
            location: AnyEntity::Inst(crate::ir::Inst::new(3)),
            message: std::string::String::from("bad arity"),
        }]);
        let text = pretty_verifier_errors(&errors);
        assert!(text.contains("inst3"));
        assert!(text.contains("bad arity"));
        assert!(text.contains("1 verifier error detected"));
    }

    #[test]
    fn pretty_error_annotates_validation_error() {
        let err = CodegenError::validation(AnyEntity::Function, "missing entry block");
        let text = pretty_error(&err);
        assert!(text.contains("missing entry block"));
    }
}
