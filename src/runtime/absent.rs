use std::sync::Arc;

use super::{HostContext, InvocationHandler, ObjectRef, VendorRuntime};
use crate::error::{Result, RuntimeError};

/// Runtime used when the vendor library could not be loaded.
///
/// Every type lookup fails with [`RuntimeError::TypeNotFound`] and every call
/// with [`RuntimeError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsentRuntime;

impl AbsentRuntime {
    /// Create the null-object runtime.
    pub fn new() -> Self {
        Self
    }
}

impl VendorRuntime for AbsentRuntime {
    fn name(&self) -> &str {
        "absent"
    }

    fn resolve_type(&self, type_name: &str) -> Result<()> {
        Err(RuntimeError::TypeNotFound {
            type_name: type_name.to_string(),
        })
    }

    fn construct(&self, _type_name: &str, _context: &HostContext) -> Result<ObjectRef> {
        Err(RuntimeError::Unavailable)
    }

    fn proxy(&self, _interface: &str, _handler: Arc<dyn InvocationHandler>) -> Result<ObjectRef> {
        Err(RuntimeError::Unavailable)
    }

    fn invoke(&self, _target: &ObjectRef, _method: &str, _arg: &ObjectRef) -> Result<()> {
        Err(RuntimeError::Unavailable)
    }
}
