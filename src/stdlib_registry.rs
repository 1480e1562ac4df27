//==================================================
// sciblock/stdlib_registry.rs
//==================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Track the library handles each block kind injects
// Objective: Map stable namespace names to module values so adapters can
//            seed a snippet namespace with one call
//==================================================

use indexmap::IndexMap;

use crate::interpreter::Value;
use crate::modules::numeric::{jax_module, numpy_module};
use crate::modules::optimize::scipy_module;
use crate::modules::plotting::{matplotlib_module, pyplot_module};
use crate::surface::PlotSurface;

//==================================================
// Section 1.0 - Registry Types
//==================================================

/// Namespace name to library handle, in registration order.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    handles: IndexMap<String, Value>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `np`, `jnp`, `jax` and `scipy`.
    pub fn for_data() -> Self {
        let mut registry = Self::new();
        registry.register_numeric();
        registry.register("scipy", scipy_module());
        registry
    }

    /// `plt` and `matplotlib` drawing into `surface`, plus the numeric handles.
    pub fn for_plot(surface: &PlotSurface) -> Self {
        let mut registry = Self::new();
        let pyplot = pyplot_module(surface).into_value();
        registry.register("plt", pyplot);
        registry.register("matplotlib", matplotlib_module(surface));
        registry.register_numeric();
        registry
    }

    fn register_numeric(&mut self) {
        let jax = jax_module();
        if let Some(jnp) = member(&jax, "numpy") {
            self.register("jnp", jnp);
        }
        self.register("np", numpy_module());
        self.register("jax", jax);
    }

    pub fn register(&mut self, name: &str, handle: Value) {
        self.handles.insert(name.to_string(), handle);
    }

    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.handles.get(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl IntoIterator for HandleRegistry {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.into_iter()
    }
}

fn member(module: &Value, name: &str) -> Option<Value> {
    match module {
        Value::Module(module) => module.members.get(name).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(registry: &HandleRegistry, name: &str) -> String {
        match registry.resolve(name) {
            Some(Value::Module(module)) => module.name.clone(),
            other => panic!("{name} is not a module: {other:?}"),
        }
    }

    #[test]
    fn test_data_handles() {
        let registry = HandleRegistry::for_data();
        assert_eq!(canonical(&registry, "np"), "numpy");
        assert_eq!(canonical(&registry, "jnp"), "jax.numpy");
        assert_eq!(canonical(&registry, "jax"), "jax");
        assert_eq!(canonical(&registry, "scipy"), "scipy");
        assert!(registry.resolve("plt").is_none());
    }

    #[test]
    fn test_plot_handles() {
        let registry = HandleRegistry::for_plot(&PlotSurface::new());
        assert_eq!(canonical(&registry, "plt"), "matplotlib.pyplot");
        assert_eq!(canonical(&registry, "matplotlib"), "matplotlib");
        assert_eq!(canonical(&registry, "np"), "numpy");
        assert!(registry.resolve("scipy").is_none());
        assert_eq!(registry.len(), 5);
    }
}
