pub mod ast;
pub mod compiler;
pub mod context;
pub mod errors;
pub mod runtime_abi;
pub mod span;
pub mod specialize;
pub mod types;
