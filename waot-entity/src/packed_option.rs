//! A compact `Option<T>` for entity references, using a reserved sentinel value instead of a
//! discriminant so it takes no more space than `T` itself.

use crate::EntityRef;
use core::fmt;

/// Types that have a reserved value not used by any real instance, usable as a niche for
/// `PackedOption`.
pub trait ReservedValue {
    /// Return the reserved value.
    fn reserved_value() -> Self;

    /// Check if `self` is the reserved value.
    fn is_reserved_value(&self) -> bool;
}

/// Optional `T`, with no size overhead over `T` when `T: ReservedValue`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PackedOption<T: ReservedValue>(T);

impl<T: EntityRef + ReservedValue> PackedOption<T> {
    /// Returns `true` if this is a `None` value.
    pub fn is_none(&self) -> bool {
        self.0.is_reserved_value()
    }

    /// Returns `true` if this is a `Some` value.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Expand this packed option into a full `Option`.
    pub fn expand(self) -> Option<T> {
        if self.is_none() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Unwrap this packed option, panicking if it is `None`.
    pub fn unwrap(self) -> T {
        self.expand().expect("PackedOption is none")
    }
}

impl<T: EntityRef + ReservedValue> From<T> for PackedOption<T> {
    fn from(t: T) -> Self {
        PackedOption(t)
    }
}

impl<T: EntityRef + ReservedValue> From<Option<T>> for PackedOption<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(t) => PackedOption(t),
            None => PackedOption(T::reserved_value()),
        }
    }
}

impl<T: EntityRef + ReservedValue> Default for PackedOption<T> {
    fn default() -> Self {
        PackedOption(T::reserved_value())
    }
}

impl<T: EntityRef + ReservedValue + fmt::Debug> fmt::Debug for PackedOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expand() {
            Some(t) => write!(f, "Some({:?})", t),
            None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_impl;

    #[derive(Clone, Copy, Debug)]
    struct E(u32);
    entity_impl!(E);

    #[test]
    fn none_by_default() {
        let p: PackedOption<E> = Default::default();
        assert!(p.is_none());
        assert_eq!(p.expand(), None);
    }

    #[test]
    fn some_roundtrip() {
        let e = E::new(3);
        let p: PackedOption<E> = e.into();
        assert!(p.is_some());
        assert_eq!(p.expand(), Some(e));
    }

    #[test]
    fn size_no_overhead() {
        assert_eq!(
            core::mem::size_of::<PackedOption<E>>(),
            core::mem::size_of::<E>()
        );
    }
}
