//! In-process reference host for opkit operators.
//!
//! Owns input tensors, records every output provisioning request, and drives
//! the create/compute/destroy lifecycle the way an engine would. Integration
//! tests use it to exercise operators end to end.

pub mod context;
pub mod node;
pub mod session;
pub mod tensor;

pub use context::{AllocationRecord, HostContext};
pub use node::NodeInfo;
pub use session::{HostSession, RunOutput};
pub use tensor::{HostData, HostElement, HostTensor, PackedStrings};
