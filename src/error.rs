//=============================================
// sciblock/error.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Public failure taxonomy of the block adapters
// Objective: Keep execution failures, result-contract violations and
//            capture failures apart so callers can treat them differently
//=============================================

use thiserror::Error;

use crate::capture::CaptureError;
use crate::executor::ExecutionDiagnostic;

/// A data snippet ran cleanly but did not hand back a usable `result`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error(
        "The code did not set the result variable. It must be set to a dictionary containing the newly generated data. E.g. result={{'<result_key>': <data>, ...}}"
    )]
    ResultUnset,
    #[error("The result variable must be a dictionary. E.g. result={{'<result_key>': <data>, ...}}")]
    ResultNotMapping { found: String },
    #[error("The result dictionary keys must be strings, found key {key}")]
    NonStringKey { key: String },
}

#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    Execution(#[from] ExecutionDiagnostic),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl BlockError {
    /// Process exit status the CLI uses for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BlockError::Contract(_) => 2,
            _ => 1,
        }
    }

    pub fn diagnostic(&self) -> Option<&ExecutionDiagnostic> {
        match self {
            BlockError::Execution(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_messages() {
        assert!(ContractViolation::ResultUnset
            .to_string()
            .starts_with("The code did not set the result variable."));
        let err = BlockError::from(ContractViolation::ResultNotMapping {
            found: "list".into(),
        });
        assert_eq!(
            err.to_string(),
            "The result variable must be a dictionary. E.g. result={'<result_key>': <data>, ...}"
        );
        assert_eq!(err.exit_code(), 2);
        assert!(err.diagnostic().is_none());
    }
}
