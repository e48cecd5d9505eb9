//! Builds the call-scoped argument values for one compute invocation.
//!
//! [`bind_arguments`] walks a [`Schema`] with separate input and output
//! cursors and produces one [`BoundValue`] per declared parameter. The
//! returned vector owns every tensor built for the call; parameters borrow
//! from it while the function runs and it is dropped when the call returns.

use half::{bf16, f16};

use crate::context::{ExecutionContext, InputData};
use crate::element::{Element, ElementType};
use crate::error::{OpError, OpResult};
use crate::schema::{Schema, SlotKind};
use crate::tensor::{StringTensor, Tensor};

/// Argument value prepared for one parameter.
pub enum BoundValue<'a> {
    Context(&'a dyn ExecutionContext),
    Tensor(BoundTensor<'a>),
    /// Optional slot the node does not connect.
    Absent,
}

/// Tensor of any supported element type.
#[derive(Debug)]
pub enum BoundTensor<'a> {
    Bool(Tensor<'a, bool>),
    F16(Tensor<'a, f16>),
    BF16(Tensor<'a, bf16>),
    F32(Tensor<'a, f32>),
    F64(Tensor<'a, f64>),
    I8(Tensor<'a, i8>),
    I16(Tensor<'a, i16>),
    I32(Tensor<'a, i32>),
    I64(Tensor<'a, i64>),
    U8(Tensor<'a, u8>),
    U16(Tensor<'a, u16>),
    U32(Tensor<'a, u32>),
    U64(Tensor<'a, u64>),
    String(StringTensor<'a>),
}

impl<'a> BoundTensor<'a> {
    pub fn element_type(&self) -> ElementType {
        match self {
            BoundTensor::Bool(_) => ElementType::Bool,
            BoundTensor::F16(_) => ElementType::F16,
            BoundTensor::BF16(_) => ElementType::BF16,
            BoundTensor::F32(_) => ElementType::F32,
            BoundTensor::F64(_) => ElementType::F64,
            BoundTensor::I8(_) => ElementType::I8,
            BoundTensor::I16(_) => ElementType::I16,
            BoundTensor::I32(_) => ElementType::I32,
            BoundTensor::I64(_) => ElementType::I64,
            BoundTensor::U8(_) => ElementType::U8,
            BoundTensor::U16(_) => ElementType::U16,
            BoundTensor::U32(_) => ElementType::U32,
            BoundTensor::U64(_) => ElementType::U64,
            BoundTensor::String(_) => ElementType::String,
        }
    }

    pub fn as_typed<T: Element>(&self) -> Option<&Tensor<'a, T>> {
        T::bound_ref(self)
    }

    pub fn as_typed_mut<T: Element>(&mut self) -> Option<&mut Tensor<'a, T>> {
        T::bound_mut(self)
    }

    pub fn as_strings(&self) -> Option<&StringTensor<'a>> {
        match self {
            BoundTensor::String(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_strings_mut(&mut self) -> Option<&mut StringTensor<'a>> {
        match self {
            BoundTensor::String(tensor) => Some(tensor),
            _ => None,
        }
    }
}

impl std::fmt::Debug for BoundValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundValue::Context(_) => f.write_str("Context"),
            BoundValue::Tensor(tensor) => f.debug_tuple("Tensor").field(tensor).finish(),
            BoundValue::Absent => f.write_str("Absent"),
        }
    }
}

/// Which side of the node a slot is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Input => f.write_str("input"),
            Role::Output => f.write_str("output"),
        }
    }
}

/// Routine that builds the tensor for one slot of a given element type.
pub type BindFn = for<'a> fn(&'a dyn ExecutionContext, usize, Role) -> OpResult<BoundTensor<'a>>;

/// Looks up the bind routine for `element`.
pub fn bind_fn(element: ElementType) -> BindFn {
    match element {
        ElementType::Bool => bind_numeric::<bool>,
        ElementType::F16 => bind_numeric::<f16>,
        ElementType::BF16 => bind_numeric::<bf16>,
        ElementType::F32 => bind_numeric::<f32>,
        ElementType::F64 => bind_numeric::<f64>,
        ElementType::I8 => bind_numeric::<i8>,
        ElementType::I16 => bind_numeric::<i16>,
        ElementType::I32 => bind_numeric::<i32>,
        ElementType::I64 => bind_numeric::<i64>,
        ElementType::U8 => bind_numeric::<u8>,
        ElementType::U16 => bind_numeric::<u16>,
        ElementType::U32 => bind_numeric::<u32>,
        ElementType::U64 => bind_numeric::<u64>,
        ElementType::String => bind_strings,
    }
}

fn bind_numeric<T: Element>(
    ctx: &dyn ExecutionContext,
    index: usize,
    role: Role,
) -> OpResult<BoundTensor<'_>> {
    match role {
        Role::Input => {
            let value = ctx.input(index)?;
            let data = T::input_slice(&value.data)
                .ok_or_else(|| element_mismatch(index, T::TYPE, &value.data))?;
            Ok(T::into_bound(Tensor::input(index, value.shape, data)?))
        }
        Role::Output => Ok(T::into_bound(Tensor::output(ctx, index))),
    }
}

fn bind_strings(
    ctx: &dyn ExecutionContext,
    index: usize,
    role: Role,
) -> OpResult<BoundTensor<'_>> {
    match role {
        Role::Input => {
            let value = ctx.input(index)?;
            let InputData::String(content) = value.data else {
                return Err(element_mismatch(index, ElementType::String, &value.data));
            };
            Ok(BoundTensor::String(StringTensor::input(
                index,
                value.shape,
                content,
            )?))
        }
        Role::Output => Ok(BoundTensor::String(StringTensor::output(ctx, index))),
    }
}

fn element_mismatch(index: usize, declared: ElementType, data: &InputData<'_>) -> OpError {
    OpError::schema(format!(
        "input {index} carries {} elements but the operator declares {declared}",
        data.element_type()
    ))
}

/// Builds one bound value per slot of `schema`.
///
/// `inputs` and `outputs` are the counts the node was compiled with; the
/// context's own counts cap them. Slots past the available count bind as
/// [`BoundValue::Absent`] when optional and fail when required.
pub fn bind_arguments<'a>(
    schema: &Schema,
    ctx: &'a dyn ExecutionContext,
    inputs: usize,
    outputs: usize,
) -> OpResult<Vec<BoundValue<'a>>> {
    let inputs = inputs.min(ctx.input_count());
    let outputs = outputs.min(ctx.output_count());
    let mut next_input = 0;
    let mut next_output = 0;
    let mut bound = Vec::with_capacity(schema.slots().len());

    for slot in schema.slots() {
        let (role, available, cursor) = match slot.kind {
            SlotKind::Context => {
                bound.push(BoundValue::Context(ctx));
                continue;
            }
            SlotKind::Input | SlotKind::OptionalInput => (Role::Input, inputs, &mut next_input),
            SlotKind::Output | SlotKind::OptionalOutput => {
                (Role::Output, outputs, &mut next_output)
            }
        };
        let index = *cursor;
        *cursor += 1;

        let value = match slot.binder() {
            Some(bind) if index < available => BoundValue::Tensor(bind(ctx, index, role)?),
            Some(_) if slot.kind.is_optional() => BoundValue::Absent,
            Some(_) => {
                return Err(OpError::schema(format!(
                    "required {role} {index} is missing, the call provides {available}"
                )))
            }
            None => {
                return Err(OpError::schema(format!(
                    "{role} slot {index} has no element type"
                )))
            }
        };
        bound.push(value);
    }

    log::trace!(
        "bound {} arguments ({} of {} inputs, {} of {} outputs)",
        bound.len(),
        next_input.min(inputs),
        inputs,
        next_output.min(outputs),
        outputs
    );
    Ok(bound)
}
