//! High-level operations.
//!
//! This module contains the implementation of capgen commands.

pub mod compile;

pub use compile::{
    compile_batch, compile_batch_with_progress, compile_target, CompileJob, Compilation,
};
