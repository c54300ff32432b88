//! Per-entity adapters (spec §9, "property metadata caches").
//!
//! Rather than reflecting on a host type at call time, the host registers a
//! small record of function pointers once, up front. Code generators can
//! produce these statically; the engine never inspects host types itself.

use crate::codec::{Document, Value};

/// Function-pointer record mapping a host type `T` to and from [`Document`].
///
/// `T: 'static` because these are ordinary `fn` pointers (not closures),
/// so an adapter is itself `Copy` and cheap to pass around.
pub struct EntityAdapter<T> {
    pub to_document: fn(&T) -> Document,
    pub from_document: fn(&Document) -> T,
    pub get_id: fn(&T) -> Value,
    pub set_id: fn(&mut T, Value),
    pub get_property_by_name: fn(&T, &str) -> Option<Value>,
}

impl<T> Clone for EntityAdapter<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityAdapter<T> {}
