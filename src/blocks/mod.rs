//=============================================
// sciblock/blocks/mod.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Block adapters over the executor
// Objective: Share namespace seeding between the data and plot adapters
//=============================================

pub mod data;
pub mod plot;

use indexmap::IndexMap;

use crate::executor::Namespace;
use crate::interpreter::Value;
use crate::stdlib_registry::HandleRegistry;

pub use data::DataBlock;
pub use plot::{PlotBlock, PlotOutput};

/// Named data values passed into and out of blocks.
pub type Fields = IndexMap<String, Value>;

/// Prior fields (deep-copied so the snippet cannot reach the caller's
/// containers) overlaid with the library handles.
pub(crate) fn seed_namespace(prior: &Fields, handles: HandleRegistry) -> Namespace {
    let mut namespace: Namespace = prior
        .iter()
        .map(|(name, value)| (name.clone(), value.deep_copy()))
        .collect();
    namespace.extend(handles);
    namespace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_copies_prior_containers() {
        let shared = Value::list(vec![Value::Int(1)]);
        let mut prior = Fields::new();
        prior.insert("xs".to_string(), shared.clone());
        let namespace = seed_namespace(&prior, HandleRegistry::for_data());
        if let Some(Value::List(items)) = namespace.get("xs") {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(shared.repr(), "[1]");
        assert!(namespace.contains("np"));
    }
}
