pub mod assembler;
pub mod docker;
pub mod error;
pub mod isolation;
pub mod orchestrator;
pub mod provisioner;
pub mod runner;
pub mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ExecError, Result};
pub use isolation::Isolation;
pub use orchestrator::Executor;
pub use provisioner::ImageProvisioner;
