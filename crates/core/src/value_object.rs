//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two `Money`
/// values of 10.00 are the same thing, while two accounts holding 10.00 are
/// not. To "modify" a value object, build a new one.
///
/// See [`crate::Money`] and [`crate::CurrencyCode`].
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
