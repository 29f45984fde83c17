//! Native method binding.
//!
//! Assemblies without IL (such as the built-in `mscorlib`) are backed by a [`NativeLibrary`].
//! A call into such an assembly is bound by the full name of the declaring type and a method
//! key derived from the member name and the element types of its parameters:
//!
//! | Call | Key |
//! |------|-----|
//! | `Console.WriteLine()` | `WriteLine$` |
//! | `Console.WriteLine(string)` | `WriteLine$_14` |
//! | `Console.WriteLine(long)` | `WriteLine$_10` |
//!
//! Overloads thus bind to different native methods without any type resolution.

use std::{collections::HashMap, fmt::Write, rc::Rc};

use crate::{
    emulation::{EmValue, Heap, ReferenceTable},
    metadata::signatures::SignatureMethod,
    Result,
};

/// State of a native method after one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeOutcome {
    /// Not done yet; the method is invoked again on the next step of its thread.
    Pending,
    /// Done, optionally producing a return value.
    Complete(Option<EmValue>),
}

/// What a native method sees of the runtime.
pub struct NativeCall<'a> {
    /// Arguments in declaration order, `this` first
    pub arguments: &'a [EmValue],
    /// The heap of the domain
    pub heap: &'a mut Heap,
    /// The heap objects of the domain
    pub references: &'a mut ReferenceTable,
}

/// A bound native method.
pub type NativeMethod = Rc<dyn Fn(&mut NativeCall<'_>) -> Result<NativeOutcome>>;

/// A provider of native methods.
pub trait NativeLibrary {
    /// Find the method `key` (see [`native_key`]) of the type `type_name` (`Namespace.Type`).
    fn bind(&self, type_name: &str, key: &str) -> Option<NativeMethod>;
}

/// Binding key of the method `name` with `signature`.
#[must_use]
pub fn native_key(name: &str, signature: &SignatureMethod) -> String {
    let mut key = format!("{name}$");
    for param in signature.params.iter().chain(&signature.varargs) {
        let _ = write!(key, "_{}", param.base.element_type_id());
    }
    key
}

/// A [`NativeLibrary`] backed by a map of registered methods.
#[derive(Default)]
pub struct NativeRegistry {
    methods: HashMap<(String, String), NativeMethod>,
}

impl NativeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> NativeRegistry {
        NativeRegistry::default()
    }

    /// Register `method` as `type_name::key`, replacing any earlier registration.
    pub fn register<F>(&mut self, type_name: &str, key: &str, method: F)
    where
        F: Fn(&mut NativeCall<'_>) -> Result<NativeOutcome> + 'static,
    {
        self.methods
            .insert((type_name.to_string(), key.to_string()), Rc::new(method));
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl NativeLibrary for NativeRegistry {
    fn bind(&self, type_name: &str, key: &str) -> Option<NativeMethod> {
        self.methods
            .get(&(type_name.to_string(), key.to_string()))
            .cloned()
    }
}
