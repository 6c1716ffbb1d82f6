//! Sandbox Validator
//!
//! Provisions an ephemeral MySQL container, seeds it with the target schema,
//! replays the migration script and checks convergence toward the source.

pub mod container;
pub mod validator;

pub use container::{Container, ContainerConfig, DockerHost, ExecOutcome};
pub use validator::{
    ExecutionLogEntry, ProgressCallback, ValidationOptions, ValidationResult, Validator,
};
