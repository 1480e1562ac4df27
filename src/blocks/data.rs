//=============================================
// sciblock/blocks/data.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Data-producing block
// Objective: Run a snippet with numeric handles and return the mapping it
//            leaves in `result`
//=============================================

use tracing::info;

use super::{Fields, seed_namespace};
use crate::config::{Config, DEFAULT_VIRTUAL_ID};
use crate::error::{BlockError, ContractViolation};
use crate::executor::Executor;
use crate::interpreter::{DictKey, Value};
use crate::stdlib_registry::HandleRegistry;

pub const RESULT_NAME: &str = "result";

#[derive(Debug, Clone)]
pub struct DataBlock {
    executor: Executor,
    virtual_id: String,
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl DataBlock {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
            virtual_id: DEFAULT_VIRTUAL_ID.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            executor: Executor::new().with_max_call_depth(config.max_call_depth),
            virtual_id: config.virtual_id.clone(),
        }
    }

    pub fn with_virtual_id(mut self, virtual_id: impl Into<String>) -> Self {
        self.virtual_id = virtual_id.into();
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn virtual_id(&self) -> &str {
        &self.virtual_id
    }

    //Function: produce_data
    //Purpose: Execute `code` and hand back the mapping bound to `result`
    //Inputs: prior fields, snippet source
    //Returns: result mapping, or the execution/contract failure
    pub fn produce_data(&self, prior: &Fields, code: &str) -> Result<Fields, BlockError> {
        let mut namespace = seed_namespace(prior, HandleRegistry::for_data());
        namespace.insert(RESULT_NAME, Value::None);

        let namespace = self.executor.run(&self.virtual_id, code, &mut namespace)?;
        let fields = extract_result(namespace.get(RESULT_NAME))?;
        info!(
            virtual_id = %self.virtual_id,
            fields = fields.len(),
            "data block produced result"
        );
        Ok(fields)
    }
}

/// Validates the `result` binding. `None` is the unset sentinel.
fn extract_result(result: Option<&Value>) -> Result<Fields, ContractViolation> {
    let entries = match result {
        None | Some(Value::None) => return Err(ContractViolation::ResultUnset),
        Some(Value::Dict(entries)) => entries,
        Some(other) => {
            return Err(ContractViolation::ResultNotMapping {
                found: other.type_name().to_string(),
            });
        }
    };
    entries
        .borrow()
        .iter()
        .map(|(key, value)| match key {
            DictKey::Str(name) => Ok((name.to_string(), value.clone())),
            other => Err(ContractViolation::NonStringKey {
                key: other.to_value().repr(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str) -> DataBlock {
        DataBlock::new().with_virtual_id(id)
    }

    #[test]
    fn test_result_mapping_returned() {
        let fields = block("<data_unit_ok>")
            .produce_data(&Fields::new(), "result = {'a': 1, 'b': 2}\n")
            .unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert!(matches!(fields["a"], Value::Int(1)));
        assert!(matches!(fields["b"], Value::Int(2)));
    }

    #[test]
    fn test_unset_result_is_contract_violation() {
        let err = block("<data_unit_unset>")
            .produce_data(&Fields::new(), "x = 1\n")
            .unwrap_err();
        assert!(matches!(err, BlockError::Contract(ContractViolation::ResultUnset)));
    }

    #[test]
    fn test_non_mapping_result() {
        let err = block("<data_unit_list>")
            .produce_data(&Fields::new(), "result = [1, 2]\n")
            .unwrap_err();
        assert!(matches!(
            err,
            BlockError::Contract(ContractViolation::ResultNotMapping { ref found }) if found == "list"
        ));
    }

    #[test]
    fn test_non_string_key() {
        let err = block("<data_unit_key>")
            .produce_data(&Fields::new(), "result = {1: 'x'}\n")
            .unwrap_err();
        assert!(matches!(err, BlockError::Contract(ContractViolation::NonStringKey { .. })));
    }

    #[test]
    fn test_prior_fields_visible() {
        let mut prior = Fields::new();
        prior.insert("scale".to_string(), Value::Float(2.5));
        let fields = block("<data_unit_prior>")
            .produce_data(&prior, "result = {'scaled': scale * 2}\n")
            .unwrap();
        assert!(matches!(fields["scaled"], Value::Float(v) if v == 5.0));
    }
}
