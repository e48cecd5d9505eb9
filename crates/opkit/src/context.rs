//! Contract between operators and the engine that runs them.
//!
//! The engine owns every buffer. Operators see inputs as borrowed slices and
//! request output buffers through [`ExecutionContext::output`]; nothing handed
//! out here may outlive the call that produced it.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementType};
use crate::error::OpResult;

/// Per-call handle used to read inputs and provision outputs.
pub trait ExecutionContext {
    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    /// Returns the shape and typed data of input `index`.
    fn input(&self, index: usize) -> OpResult<InputValue<'_>>;

    /// Provisions the buffer for output `index`, sized for `shape`.
    ///
    /// The returned buffer must carry `element` and hold exactly the number of
    /// elements implied by `shape`.
    fn output(&self, index: usize, element: ElementType, shape: &[i64])
        -> OpResult<OutputBuffer<'_>>;

    /// Hands a string output to the engine, which copies the contents.
    fn output_strings(&self, index: usize, shape: &[i64], strings: &[&str]) -> OpResult<()>;
}

/// Compile-time view of the graph node a kernel is created for.
pub trait KernelInfo {
    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    fn node_name(&self) -> Option<&str> {
        None
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        let _ = name;
        None
    }
}

/// Typed node attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

impl AttributeValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer attributes are widened so `alpha: 2` reads as a float.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttributeValue::Float(value) => Some(*value),
            AttributeValue::Int(value) => Some(*value as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttributeValue::Ints(values) => Some(values),
            _ => None,
        }
    }
}

/// Shape and data of one input for the duration of a call.
#[derive(Debug, Clone)]
pub struct InputValue<'a> {
    pub shape: Vec<i64>,
    pub data: InputData<'a>,
}

/// Read-only input data, one variant per element type.
#[derive(Debug, Clone, Copy)]
pub enum InputData<'a> {
    Bool(&'a [bool]),
    F16(&'a [f16]),
    BF16(&'a [bf16]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    I8(&'a [i8]),
    I16(&'a [i16]),
    I32(&'a [i32]),
    I64(&'a [i64]),
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    U64(&'a [u64]),
    String(StringContent<'a>),
}

impl InputData<'_> {
    pub fn element_type(&self) -> ElementType {
        match self {
            InputData::Bool(_) => ElementType::Bool,
            InputData::F16(_) => ElementType::F16,
            InputData::BF16(_) => ElementType::BF16,
            InputData::F32(_) => ElementType::F32,
            InputData::F64(_) => ElementType::F64,
            InputData::I8(_) => ElementType::I8,
            InputData::I16(_) => ElementType::I16,
            InputData::I32(_) => ElementType::I32,
            InputData::I64(_) => ElementType::I64,
            InputData::U8(_) => ElementType::U8,
            InputData::U16(_) => ElementType::U16,
            InputData::U32(_) => ElementType::U32,
            InputData::U64(_) => ElementType::U64,
            InputData::String(_) => ElementType::String,
        }
    }
}

/// Packed string input: one character blob plus the start offset of every element.
///
/// Element `i` spans `offsets[i]..offsets[i + 1]`, the last one ends at
/// `content_length`.
#[derive(Debug, Clone, Copy)]
pub struct StringContent<'a> {
    pub content_length: usize,
    pub offsets: &'a [usize],
    pub blob: &'a [u8],
}

/// Mutable output buffer provisioned by the engine, one variant per element type.
#[derive(Debug)]
pub enum OutputBuffer<'a> {
    Bool(&'a mut [bool]),
    F16(&'a mut [f16]),
    BF16(&'a mut [bf16]),
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
    I8(&'a mut [i8]),
    I16(&'a mut [i16]),
    I32(&'a mut [i32]),
    I64(&'a mut [i64]),
    U8(&'a mut [u8]),
    U16(&'a mut [u16]),
    U32(&'a mut [u32]),
    U64(&'a mut [u64]),
}

impl<'a> OutputBuffer<'a> {
    pub fn from_slice<T: Element>(values: &'a mut [T]) -> Self {
        T::output_buffer(values)
    }

    /// Wraps engine-owned memory as an output buffer.
    ///
    /// # Safety
    /// `ptr` must be non-null, aligned for `T`, valid for reads and writes of
    /// `len` elements, and not accessed through any other path for `'a`.
    pub unsafe fn from_raw_parts<T: Element>(ptr: *mut T, len: usize) -> Self {
        // SAFETY: upheld by the caller.
        let values = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
        T::output_buffer(values)
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            OutputBuffer::Bool(_) => ElementType::Bool,
            OutputBuffer::F16(_) => ElementType::F16,
            OutputBuffer::BF16(_) => ElementType::BF16,
            OutputBuffer::F32(_) => ElementType::F32,
            OutputBuffer::F64(_) => ElementType::F64,
            OutputBuffer::I8(_) => ElementType::I8,
            OutputBuffer::I16(_) => ElementType::I16,
            OutputBuffer::I32(_) => ElementType::I32,
            OutputBuffer::I64(_) => ElementType::I64,
            OutputBuffer::U8(_) => ElementType::U8,
            OutputBuffer::U16(_) => ElementType::U16,
            OutputBuffer::U32(_) => ElementType::U32,
            OutputBuffer::U64(_) => ElementType::U64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OutputBuffer::Bool(values) => values.len(),
            OutputBuffer::F16(values) => values.len(),
            OutputBuffer::BF16(values) => values.len(),
            OutputBuffer::F32(values) => values.len(),
            OutputBuffer::F64(values) => values.len(),
            OutputBuffer::I8(values) => values.len(),
            OutputBuffer::I16(values) => values.len(),
            OutputBuffer::I32(values) => values.len(),
            OutputBuffer::I64(values) => values.len(),
            OutputBuffer::U8(values) => values.len(),
            OutputBuffer::U16(values) => values.len(),
            OutputBuffer::U32(values) => values.len(),
            OutputBuffer::U64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
