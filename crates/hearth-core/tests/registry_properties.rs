//! Property-Based Tests for Component Registries
//!
//! ## Properties Verified
//!
//! - Enumeration order equals first-attachment order for any attach sequence
//! - Every repeated attachment is rejected as a duplicate
//! - Every attached type can be looked up; every other type cannot
#![allow(clippy::unwrap_used)]

use hearth_core::{Component, ComponentError, ComponentRegistry};
use proptest::prelude::*;

struct Host;

struct Marker<const N: usize>;

impl<const N: usize> Component<Host> for Marker<N> {}

const KINDS: usize = 5;

fn name_of(kind: usize) -> &'static str {
    match kind {
        0 => std::any::type_name::<Marker<0>>(),
        1 => std::any::type_name::<Marker<1>>(),
        2 => std::any::type_name::<Marker<2>>(),
        3 => std::any::type_name::<Marker<3>>(),
        _ => std::any::type_name::<Marker<4>>(),
    }
}

fn attach(registry: &mut ComponentRegistry<Host>, kind: usize) -> Result<(), ComponentError> {
    match kind {
        0 => registry.attach(Marker::<0>).map(|_| ()),
        1 => registry.attach(Marker::<1>).map(|_| ()),
        2 => registry.attach(Marker::<2>).map(|_| ()),
        3 => registry.attach(Marker::<3>).map(|_| ()),
        _ => registry.attach(Marker::<4>).map(|_| ()),
    }
}

fn lookup(registry: &ComponentRegistry<Host>, kind: usize) -> Result<(), ComponentError> {
    match kind {
        0 => registry.get::<Marker<0>>().map(|_| ()),
        1 => registry.get::<Marker<1>>().map(|_| ()),
        2 => registry.get::<Marker<2>>().map(|_| ()),
        3 => registry.get::<Marker<3>>().map(|_| ()),
        _ => registry.get::<Marker<4>>().map(|_| ()),
    }
}

proptest! {
    /// Property: enumeration follows first attachment, repeats are rejected
    #[test]
    fn prop_enumeration_follows_attachment(sequence in prop::collection::vec(0..KINDS, 0..24)) {
        let mut registry = ComponentRegistry::<Host>::new("prop");
        let mut expected: Vec<usize> = Vec::new();

        for kind in sequence {
            let result = attach(&mut registry, kind);
            if expected.contains(&kind) {
                let is_duplicate = matches!(result, Err(ComponentError::Duplicate { .. }));
                prop_assert!(is_duplicate, "repeat attach of {} must fail", kind);
            } else {
                prop_assert!(result.is_ok());
                expected.push(kind);
            }
        }

        let expected_names: Vec<&'static str> = expected.iter().map(|k| name_of(*k)).collect();
        prop_assert_eq!(registry.names(), expected_names);
        prop_assert_eq!(registry.len(), expected.len());

        for kind in 0..KINDS {
            let found = lookup(&registry, kind);
            if expected.contains(&kind) {
                prop_assert!(found.is_ok());
            } else {
                let is_missing = matches!(found, Err(ComponentError::NotFound { .. }));
                prop_assert!(is_missing);
            }
        }
    }
}
