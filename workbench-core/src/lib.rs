//! # Workbench Core
//!
//! IDL model, type resolution, form state and the error taxonomy shared by
//! the workbench tooling.

pub mod error;
pub mod form;
pub mod idl;
pub mod resolve;

pub mod prelude {
    pub use crate::error::{WorkbenchError, WorkbenchResult};
    pub use crate::form::FormState;
    pub use crate::idl::{IdlAccountItem, IdlDoc, IdlField, IdlInstruction, IdlType, IdlTypeDef};
    pub use crate::resolve::{resolve, Resolved, TypeTable};
}
