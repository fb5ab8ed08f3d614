//! Topology Compiler
//!
//! Turns a site descriptor into the multi-service container topology that
//! runs it, generates the per-site secrets that topology needs, and writes the
//! result to disk as a compose manifest.

pub mod compiler;
pub mod manifest;
pub mod secrets;
pub mod topology;
pub mod writer;

pub use compiler::{CompilerConfig, TopologyCompiler};
pub use secrets::CredentialGenerator;
pub use topology::{RestartPolicy, ServiceRole, ServiceSpec, TopologySpec, VolumeMount};
pub use writer::TopologyWriter;
