//! Engine-facing operator trait and the adapters that implement it.
//!
//! The engine drives every operator through the same lifecycle: query the
//! schema at registration, [`CustomOp::create_kernel`] once per compiled node,
//! [`CustomOp::compute`] any number of times, then
//! [`CustomOp::destroy_kernel`]. [`FnOp`] adapts a free function and
//! [`StructOp`] adapts a method on per-kernel state.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binder::bind_arguments;
use crate::context::{ExecutionContext, KernelInfo};
use crate::element::ElementType;
use crate::error::{OpError, OpResult};
use crate::param::{ComputeFn, KernelMethod};
use crate::schema::{Characteristic, Schema};

/// Type-erased per-node kernel created by [`CustomOp::create_kernel`].
pub type KernelHandle = Box<dyn Any + Send + Sync>;

/// Memory placement the operator expects for an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Whatever memory the execution provider uses.
    Default,
    /// Host memory regardless of provider.
    Cpu,
}

/// Per-operator registration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpOptions {
    pub execution_provider: String,
    pub version: u32,
}

impl Default for OpOptions {
    fn default() -> Self {
        OpOptions {
            execution_provider: "CPUExecutionProvider".to_string(),
            version: 1,
        }
    }
}

/// Custom operator as seen by the engine.
pub trait CustomOp: Send + Sync {
    fn name(&self) -> &str;

    fn execution_provider(&self) -> &str;

    fn version(&self) -> u32;

    fn schema(&self) -> &Schema;

    fn input_type_count(&self) -> usize {
        self.schema().input_count()
    }

    fn input_type(&self, index: usize) -> Option<ElementType> {
        self.schema().input_types().get(index).copied()
    }

    fn output_type_count(&self) -> usize {
        self.schema().output_count()
    }

    fn output_type(&self, index: usize) -> Option<ElementType> {
        self.schema().output_types().get(index).copied()
    }

    fn input_characteristic(&self, index: usize) -> Option<Characteristic> {
        self.schema().input_characteristic(index)
    }

    fn output_characteristic(&self, index: usize) -> Option<Characteristic> {
        self.schema().output_characteristic(index)
    }

    fn input_memory_type(&self, _index: usize) -> MemoryType {
        MemoryType::Default
    }

    fn variadic_input_min_arity(&self) -> usize {
        0
    }

    fn variadic_input_homogeneity(&self) -> bool {
        false
    }

    fn variadic_output_min_arity(&self) -> usize {
        0
    }

    fn variadic_output_homogeneity(&self) -> bool {
        false
    }

    /// Instantiates the operator for one graph node.
    fn create_kernel(&self, info: &dyn KernelInfo) -> OpResult<KernelHandle>;

    /// Runs one call against a kernel created by this operator.
    fn compute(&self, kernel: &KernelHandle, ctx: &dyn ExecutionContext) -> OpResult<()>;

    fn destroy_kernel(&self, kernel: KernelHandle) {
        log::debug!("destroying kernel of operator {}", self.name());
        drop(kernel);
    }
}

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Per-node record shared by both adapters.
struct Kernel<S> {
    /// Id of the operator that created this kernel.
    owner: u64,
    inputs: usize,
    outputs: usize,
    state: S,
}

/// Name, options and schema common to both adapters.
#[derive(Debug)]
struct OpHeader {
    id: u64,
    name: String,
    options: OpOptions,
    schema: Schema,
}

impl OpHeader {
    fn new(name: String, options: OpOptions, schema: Schema) -> Self {
        log::debug!(
            "operator {name} ({}, v{}): inputs {:?}, outputs {:?}",
            options.execution_provider,
            options.version,
            schema.input_types(),
            schema.output_types()
        );
        OpHeader {
            id: NEXT_OP_ID.fetch_add(1, Ordering::Relaxed),
            name,
            options,
            schema,
        }
    }

    fn kernel<S>(
        &self,
        info: &dyn KernelInfo,
        state: impl FnOnce() -> OpResult<S>,
    ) -> OpResult<Kernel<S>> {
        let (inputs, outputs) = (info.input_count(), info.output_count());
        self.schema
            .check_arity(inputs, outputs)
            .map_err(|err| match err {
                OpError::SchemaViolation { message } => {
                    OpError::schema(format!("operator {}: {message}", self.name))
                }
                other => other,
            })?;
        let state = state()?;
        log::debug!(
            "created kernel of operator {} for node {} ({inputs} inputs, {outputs} outputs)",
            self.name,
            info.node_name().unwrap_or("<unnamed>")
        );
        Ok(Kernel {
            owner: self.id,
            inputs,
            outputs,
            state,
        })
    }

    /// Matches on owner id as well as type: operators built from the same
    /// function or state type share a kernel type.
    fn owned<'k, S: 'static>(&self, kernel: &'k KernelHandle) -> Option<&'k Kernel<S>> {
        kernel
            .downcast_ref::<Kernel<S>>()
            .filter(|kernel| kernel.owner == self.id)
    }

    fn downcast<'k, S: 'static>(&self, kernel: &'k KernelHandle) -> OpResult<&'k Kernel<S>> {
        self.owned(kernel).ok_or_else(|| {
            log::warn!("rejected a kernel handle not created by operator {}", self.name);
            OpError::InvalidHandle {
                op: self.name.clone(),
            }
        })
    }

    fn release<S: 'static>(&self, kernel: KernelHandle) {
        if self.owned::<S>(&kernel).is_some() {
            log::debug!("destroying kernel of operator {}", self.name);
        } else {
            log::warn!("destroying a kernel handle not created by operator {}", self.name);
        }
        drop(kernel);
    }
}

/// Operator backed by a free function or closure.
pub struct FnOp<F, M> {
    header: OpHeader,
    func: Arc<F>,
    _marker: PhantomData<fn() -> M>,
}

impl<F, M> FnOp<F, M>
where
    F: ComputeFn<M>,
    M: 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> OpResult<Self> {
        Self::with_options(name, OpOptions::default(), func)
    }

    pub fn with_options(name: impl Into<String>, options: OpOptions, func: F) -> OpResult<Self> {
        let schema = Schema::from_slots(F::descriptors())?;
        Ok(FnOp {
            header: OpHeader::new(name.into(), options, schema),
            func: Arc::new(func),
            _marker: PhantomData,
        })
    }
}

impl<F, M> CustomOp for FnOp<F, M>
where
    F: ComputeFn<M>,
    M: 'static,
{
    fn name(&self) -> &str {
        &self.header.name
    }

    fn execution_provider(&self) -> &str {
        &self.header.options.execution_provider
    }

    fn version(&self) -> u32 {
        self.header.options.version
    }

    fn schema(&self) -> &Schema {
        &self.header.schema
    }

    fn create_kernel(&self, info: &dyn KernelInfo) -> OpResult<KernelHandle> {
        let kernel = self.header.kernel(info, || Ok(Arc::clone(&self.func)))?;
        Ok(Box::new(kernel))
    }

    fn compute(&self, kernel: &KernelHandle, ctx: &dyn ExecutionContext) -> OpResult<()> {
        let kernel = self.header.downcast::<Arc<F>>(kernel)?;
        let mut bound = bind_arguments(&self.header.schema, ctx, kernel.inputs, kernel.outputs)?;
        ComputeFn::<M>::invoke(&*kernel.state, &mut bound)
    }

    fn destroy_kernel(&self, kernel: KernelHandle) {
        self.header.release::<Arc<F>>(kernel);
    }
}

/// Per-kernel operator state for [`StructOp`].
pub trait KernelState: Send + Sync + Sized + 'static {
    /// Builds the state for one node, typically from its attributes.
    fn create(info: &dyn KernelInfo) -> OpResult<Self>;
}

/// Operator whose kernels each own a `K` and run a method on it.
pub struct StructOp<K, F, M> {
    header: OpHeader,
    method: F,
    _marker: PhantomData<fn() -> (K, M)>,
}

impl<K, F, M> StructOp<K, F, M>
where
    K: KernelState,
    F: KernelMethod<K, M>,
    M: 'static,
{
    pub fn new(name: impl Into<String>, method: F) -> OpResult<Self> {
        Self::with_options(name, OpOptions::default(), method)
    }

    pub fn with_options(name: impl Into<String>, options: OpOptions, method: F) -> OpResult<Self> {
        let schema = Schema::from_slots(F::descriptors())?;
        Ok(StructOp {
            header: OpHeader::new(name.into(), options, schema),
            method,
            _marker: PhantomData,
        })
    }
}

impl<K, F, M> CustomOp for StructOp<K, F, M>
where
    K: KernelState,
    F: KernelMethod<K, M>,
    M: 'static,
{
    fn name(&self) -> &str {
        &self.header.name
    }

    fn execution_provider(&self) -> &str {
        &self.header.options.execution_provider
    }

    fn version(&self) -> u32 {
        self.header.options.version
    }

    fn schema(&self) -> &Schema {
        &self.header.schema
    }

    fn create_kernel(&self, info: &dyn KernelInfo) -> OpResult<KernelHandle> {
        let kernel = self.header.kernel(info, || K::create(info))?;
        Ok(Box::new(kernel))
    }

    fn compute(&self, kernel: &KernelHandle, ctx: &dyn ExecutionContext) -> OpResult<()> {
        let kernel = self.header.downcast::<K>(kernel)?;
        let mut bound = bind_arguments(&self.header.schema, ctx, kernel.inputs, kernel.outputs)?;
        KernelMethod::<K, M>::invoke(&self.method, &kernel.state, &mut bound)
    }

    fn destroy_kernel(&self, kernel: KernelHandle) {
        self.header.release::<K>(kernel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    struct Counts(usize, usize);

    impl KernelInfo for Counts {
        fn input_count(&self) -> usize {
            self.0
        }

        fn output_count(&self) -> usize {
            self.1
        }
    }

    struct Unused;

    impl ExecutionContext for Unused {
        fn input_count(&self) -> usize {
            0
        }

        fn output_count(&self) -> usize {
            0
        }

        fn input(&self, index: usize) -> OpResult<crate::context::InputValue<'_>> {
            Err(OpError::engine(format!("no input {index}")))
        }

        fn output(
            &self,
            index: usize,
            _: ElementType,
            _: &[i64],
        ) -> OpResult<crate::context::OutputBuffer<'_>> {
            Err(OpError::allocation(index, "unused"))
        }

        fn output_strings(&self, index: usize, _: &[i64], _: &[&str]) -> OpResult<()> {
            Err(OpError::allocation(index, "unused"))
        }
    }

    fn relu(x: &Tensor<f32>, y: &mut Tensor<f32>) -> OpResult<()> {
        let shape = x.shape()?.to_vec();
        for (out, value) in y.allocate(&shape)?.iter_mut().zip(x.data()) {
            *out = value.max(0.0);
        }
        Ok(())
    }

    #[test]
    fn engine_queries_follow_the_signature() {
        let op = FnOp::new("Relu", relu).unwrap();
        assert_eq!(op.name(), "Relu");
        assert_eq!(op.execution_provider(), "CPUExecutionProvider");
        assert_eq!(op.version(), 1);
        assert_eq!(op.input_type_count(), 1);
        assert_eq!(op.input_type(0), Some(ElementType::F32));
        assert_eq!(op.input_type(1), None);
        assert_eq!(op.output_type(0), Some(ElementType::F32));
        assert_eq!(op.input_characteristic(0), Some(Characteristic::Required));
        assert_eq!(op.input_memory_type(0), MemoryType::Default);
        assert_eq!(op.variadic_input_min_arity(), 0);
        assert!(!op.variadic_output_homogeneity());
    }

    #[test]
    fn options_override_provider_and_version() {
        let options: OpOptions =
            serde_json::from_str(r#"{"execution_provider": "CUDAExecutionProvider"}"#).unwrap();
        let op = FnOp::with_options("Relu", options, relu).unwrap();
        assert_eq!(op.execution_provider(), "CUDAExecutionProvider");
        assert_eq!(op.version(), 1);
    }

    #[test]
    fn kernels_need_every_required_slot() {
        let op = FnOp::new("Relu", relu).unwrap();
        assert!(op.create_kernel(&Counts(1, 1)).is_ok());
        assert!(op.create_kernel(&Counts(1, 0)).unwrap_err().is_schema_violation());
        assert!(op.create_kernel(&Counts(0, 1)).unwrap_err().is_schema_violation());
    }

    #[test]
    fn foreign_handles_are_rejected() {
        fn identity(x: &Tensor<f32>, y: &mut Tensor<f32>) -> OpResult<()> {
            let shape = x.shape()?.to_vec();
            y.allocate(&shape)?.copy_from_slice(x.data());
            Ok(())
        }
        let relu_op = FnOp::new("Relu", relu).unwrap();
        let identity_op = FnOp::new("Identity", identity).unwrap();
        let foreign = identity_op.create_kernel(&Counts(1, 1)).unwrap();
        let bogus: KernelHandle = Box::new(42u32);

        for handle in [&foreign, &bogus] {
            let err = relu_op.compute(handle, &Unused).unwrap_err();
            assert!(matches!(err, OpError::InvalidHandle { ref op } if op == "Relu"));
        }
        identity_op.destroy_kernel(foreign);
    }

    #[test]
    fn operators_sharing_a_function_keep_their_kernels_apart() {
        let left = FnOp::new("Left", relu).unwrap();
        let right = FnOp::new("Right", relu).unwrap();
        let kernel = left.create_kernel(&Counts(1, 1)).unwrap();
        let err = right.compute(&kernel, &Unused).unwrap_err();
        assert!(matches!(err, OpError::InvalidHandle { ref op } if op == "Right"));
        // The owner gets past the handle check and fails on the empty context.
        let err = left.compute(&kernel, &Unused).unwrap_err();
        assert!(err.is_schema_violation());
        left.destroy_kernel(kernel);
    }

    #[test]
    fn foreign_handles_are_still_dropped_on_destroy() {
        let op = FnOp::new("Relu", relu).unwrap();
        let payload = Arc::new(());
        op.destroy_kernel(Box::new(Arc::clone(&payload)));
        assert_eq!(Arc::strong_count(&payload), 1);

        let other = FnOp::new("Other", relu).unwrap();
        let kernel = other.create_kernel(&Counts(1, 1)).unwrap();
        let func = Arc::clone(&other.func);
        assert_eq!(Arc::strong_count(&func), 3);
        op.destroy_kernel(kernel);
        assert_eq!(Arc::strong_count(&func), 2);
    }
}
