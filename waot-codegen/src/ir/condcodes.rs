//! Condition codes for comparison instructions.

use core::fmt;

/// Integer comparison condition codes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntCC {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// signed `<`
    SignedLessThan,
    /// signed `<=`
    SignedGreaterThanOrEqual,
    /// signed `>`
    SignedGreaterThan,
    /// signed `<=`
    SignedLessThanOrEqual,
    /// unsigned `<`
    UnsignedLessThan,
    /// unsigned `>=`
    UnsignedGreaterThanOrEqual,
    /// unsigned `>`
    UnsignedGreaterThan,
    /// unsigned `<=`
    UnsignedLessThanOrEqual,
}

impl IntCC {
    /// Invert this condition code (negate the test).
    pub fn inverse(self) -> Self {
        use IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            SignedLessThan => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThan,
            SignedGreaterThan => SignedLessThanOrEqual,
            SignedLessThanOrEqual => SignedGreaterThan,
            UnsignedLessThan => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThan,
            UnsignedGreaterThan => UnsignedLessThanOrEqual,
            UnsignedLessThanOrEqual => UnsignedGreaterThan,
        }
    }
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use IntCC::*;
        f.write_str(match *self {
            Equal => "eq",
            NotEqual => "ne",
            SignedLessThan => "slt",
            SignedGreaterThanOrEqual => "sge",
            SignedGreaterThan => "sgt",
            SignedLessThanOrEqual => "sle",
            UnsignedLessThan => "ult",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedGreaterThan => "ugt",
            UnsignedLessThanOrEqual => "ule",
        })
    }
}

/// Floating point comparison condition codes (ordered unless stated otherwise).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FloatCC {
    /// `==`
    Equal,
    /// `!=` (unordered-or-not-equal, matching IEEE 754 `!=`)
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl FloatCC {
    /// The AArch64 condition-flag mnemonic an `fcmp` leaves behind for this predicate;
    /// `IntCC` doubles as that shared mnemonic set since the hardware condition codes are the
    /// same NZCV tests regardless of whether `cmp` or `fcmp` set the flags.
    pub fn as_int_cc(self) -> IntCC {
        match self {
            FloatCC::Equal => IntCC::Equal,
            FloatCC::NotEqual => IntCC::NotEqual,
            FloatCC::LessThan => IntCC::SignedLessThan,
            FloatCC::LessThanOrEqual => IntCC::SignedLessThanOrEqual,
            FloatCC::GreaterThan => IntCC::SignedGreaterThan,
            FloatCC::GreaterThanOrEqual => IntCC::SignedGreaterThanOrEqual,
        }
    }
}

impl fmt::Display for FloatCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FloatCC::*;
        f.write_str(match *self {
            Equal => "eq",
            NotEqual => "ne",
            LessThan => "lt",
            LessThanOrEqual => "le",
            GreaterThan => "gt",
            GreaterThanOrEqual => "ge",
        })
    }
}
