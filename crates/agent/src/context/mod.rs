//! Context assembly: a device's own turns plus its linked devices' turns,
//! bounded by turn count and character budget.

pub mod assembler;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextWindow, merge_and_truncate,
};
