//! Typed binding layer for custom tensor operators.
//!
//! An operator is written as an ordinary Rust function over [`Tensor`],
//! [`Span`], [`StringTensor`], scalars and an optional
//! [`ExecutionContext`] handle. Wrapping it in [`FnOp`] (or a method on
//! per-kernel state in [`StructOp`]) derives the element-type schema the
//! engine registers and the per-call argument binding that feeds the
//! function from the engine's execution context.
//!
//! ```ignore
//! use opkit::{FnOp, OpDomain, OpResult, Tensor};
//!
//! fn add(a: &Tensor<f32>, b: &Tensor<f32>, out: &mut Tensor<f32>) -> OpResult<()> {
//!     let shape = a.shape()?.to_vec();
//!     let out = out.allocate(&shape)?;
//!     for ((o, x), y) in out.iter_mut().zip(a.data()).zip(b.data()) {
//!         *o = x + y;
//!     }
//!     Ok(())
//! }
//!
//! let mut domain = OpDomain::new("example");
//! domain.add(FnOp::new("Add", add)?)?;
//! opkit::registry::register_domain(domain);
//! ```

pub use linkme;

pub mod binder;
pub mod context;
pub mod element;
pub mod error;
pub mod op;
pub mod param;
pub mod registry;
pub mod schema;
pub mod tensor;

pub use context::{
    AttributeValue, ExecutionContext, InputData, InputValue, KernelInfo, OutputBuffer,
    StringContent,
};
pub use element::{Element, ElementType};
pub use error::{OpError, OpResult};
pub use op::{CustomOp, FnOp, KernelHandle, KernelState, MemoryType, OpOptions, StructOp};
pub use registry::OpDomain;
pub use schema::{Access, Characteristic, Schema, SlotDescriptor, SlotKind};
pub use tensor::{Span, StringTensor, Tensor};
