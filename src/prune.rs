//! Dead constant-global pruning.
//!
//! When the runtime supplies constant contents at load time, the module only
//! needs a global for constants some kernel still references. After emission
//! the unreferenced ones are erased.

use log::{debug, trace};

use crate::core::{CompileError, CompileResult};
use crate::module::CodeModule;

/// A constant the executable provides to the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantInfo {
    pub symbol_name: String,
    /// Serialized content supplied at load time; empty when embedded in the module.
    pub content: Vec<u8>,
    pub allocation_index: Option<usize>,
}

impl ConstantInfo {
    pub fn new(symbol_name: &str, content: Vec<u8>) -> Self {
        Self { symbol_name: symbol_name.to_string(), content, allocation_index: None }
    }
}

/// Erase the globals of externally supplied constants that have no uses.
///
/// Returns the number of erased globals. A constant with non-empty content
/// whose global is absent from `module` is a [`CompileError::ConsistencyViolation`].
pub fn prune_globals(module: &mut CodeModule, constants: &[ConstantInfo]) -> CompileResult<usize> {
    let mut erased = 0;
    for info in constants.iter().filter(|c| !c.content.is_empty()) {
        let global = module
            .global(&info.symbol_name)
            .ok_or_else(|| CompileError::ConsistencyViolation { symbol: info.symbol_name.clone() })?;
        if global.use_empty() {
            trace!("Erasing unused global {}", info.symbol_name);
            module.erase_global(&info.symbol_name);
            erased += 1;
        }
    }
    debug!("Pruned {} unused constant globals from {}", erased, module.name());
    Ok(erased)
}
