//! Drives one operator through the kernel lifecycle for one node.

use std::sync::Arc;

use opkit::{CustomOp, KernelHandle, OpResult};

use crate::context::{AllocationRecord, HostContext};
use crate::node::NodeInfo;
use crate::tensor::HostTensor;

/// Outputs and provisioning log of one successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub outputs: Vec<Option<HostTensor>>,
    pub requests: Vec<AllocationRecord>,
}

/// One kernel of one operator, created for one node.
///
/// The kernel is destroyed when the session is dropped. Runs only need
/// `&self`, so a session can be shared across threads.
pub struct HostSession {
    op: Arc<dyn CustomOp>,
    node: NodeInfo,
    kernel: KernelHandle,
}

impl HostSession {
    pub fn create(op: Arc<dyn CustomOp>, node: NodeInfo) -> OpResult<Self> {
        let kernel = op.create_kernel(&node)?;
        Ok(HostSession {
            op,
            node,
            kernel,
        })
    }

    pub fn op(&self) -> &dyn CustomOp {
        self.op.as_ref()
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// Runs one call with the node's declared output count.
    pub fn run(&self, inputs: Vec<HostTensor>) -> OpResult<Vec<Option<HostTensor>>> {
        let ctx = HostContext::new(inputs, self.node.outputs);
        Ok(self.run_with(ctx)?.outputs)
    }

    /// Runs one call against a prepared context.
    ///
    /// A failing call drops the context together with every output it
    /// provisioned.
    pub fn run_with(&self, ctx: HostContext) -> OpResult<RunOutput> {
        self.run_with_kernel(&self.kernel, ctx)
    }

    /// Runs one call against a handle chosen by the caller.
    pub fn run_with_kernel(&self, kernel: &KernelHandle, ctx: HostContext) -> OpResult<RunOutput> {
        self.op.compute(kernel, &ctx)?;
        let requests = ctx.requests();
        Ok(RunOutput {
            outputs: ctx.into_outputs(),
            requests,
        })
    }

    pub fn kernel(&self) -> &KernelHandle {
        &self.kernel
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        let kernel = std::mem::replace(&mut self.kernel, Box::new(()));
        self.op.destroy_kernel(kernel);
    }
}
