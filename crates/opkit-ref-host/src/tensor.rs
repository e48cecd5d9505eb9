//! Owned host tensors fed to and collected from the reference host.

use anyhow::{bail, ensure, Result};
use half::{bf16, f16};
use opkit::tensor::element_count;
use opkit::{Element, ElementType, InputData, OutputBuffer, StringContent};

/// Strings packed the way the engine hands them to operators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackedStrings {
    blob: String,
    offsets: Vec<usize>,
}

impl PackedStrings {
    pub fn pack<S: AsRef<str>>(strings: &[S]) -> Self {
        let mut packed = PackedStrings::default();
        for value in strings {
            packed.offsets.push(packed.blob.len());
            packed.blob.push_str(value.as_ref());
        }
        packed
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn content(&self) -> StringContent<'_> {
        StringContent {
            content_length: self.blob.len(),
            offsets: &self.offsets,
            blob: self.blob.as_bytes(),
        }
    }

    pub fn unpack(&self) -> Vec<&str> {
        let ends = self.offsets.iter().skip(1).copied().chain([self.blob.len()]);
        self.offsets
            .iter()
            .zip(ends)
            .map(|(&start, end)| &self.blob[start..end])
            .collect()
    }
}

/// Element storage of a [`HostTensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Bool(Vec<bool>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    String(PackedStrings),
}

/// Numeric element that can live in [`HostData`].
pub trait HostElement: Element {
    fn wrap(values: Vec<Self>) -> HostData;

    fn values(data: &HostData) -> Option<&[Self]>;
}

macro_rules! impl_host_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl HostElement for $ty {
                fn wrap(values: Vec<Self>) -> HostData {
                    HostData::$variant(values)
                }

                fn values(data: &HostData) -> Option<&[Self]> {
                    match data {
                        HostData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_host_element! {
    bool => Bool,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}

impl HostData {
    /// Zero-filled storage for `len` numeric elements; `None` for strings.
    pub fn zeros(element: ElementType, len: usize) -> Option<Self> {
        Some(match element {
            ElementType::Bool => HostData::Bool(vec![false; len]),
            ElementType::F16 => HostData::F16(vec![f16::ZERO; len]),
            ElementType::BF16 => HostData::BF16(vec![bf16::ZERO; len]),
            ElementType::F32 => HostData::F32(vec![0.0; len]),
            ElementType::F64 => HostData::F64(vec![0.0; len]),
            ElementType::I8 => HostData::I8(vec![0; len]),
            ElementType::I16 => HostData::I16(vec![0; len]),
            ElementType::I32 => HostData::I32(vec![0; len]),
            ElementType::I64 => HostData::I64(vec![0; len]),
            ElementType::U8 => HostData::U8(vec![0; len]),
            ElementType::U16 => HostData::U16(vec![0; len]),
            ElementType::U32 => HostData::U32(vec![0; len]),
            ElementType::U64 => HostData::U64(vec![0; len]),
            ElementType::String => return None,
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            HostData::Bool(_) => ElementType::Bool,
            HostData::F16(_) => ElementType::F16,
            HostData::BF16(_) => ElementType::BF16,
            HostData::F32(_) => ElementType::F32,
            HostData::F64(_) => ElementType::F64,
            HostData::I8(_) => ElementType::I8,
            HostData::I16(_) => ElementType::I16,
            HostData::I32(_) => ElementType::I32,
            HostData::I64(_) => ElementType::I64,
            HostData::U8(_) => ElementType::U8,
            HostData::U16(_) => ElementType::U16,
            HostData::U32(_) => ElementType::U32,
            HostData::U64(_) => ElementType::U64,
            HostData::String(_) => ElementType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::Bool(values) => values.len(),
            HostData::F16(values) => values.len(),
            HostData::BF16(values) => values.len(),
            HostData::F32(values) => values.len(),
            HostData::F64(values) => values.len(),
            HostData::I8(values) => values.len(),
            HostData::I16(values) => values.len(),
            HostData::I32(values) => values.len(),
            HostData::I64(values) => values.len(),
            HostData::U8(values) => values.len(),
            HostData::U16(values) => values.len(),
            HostData::U32(values) => values.len(),
            HostData::U64(values) => values.len(),
            HostData::String(strings) => strings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn input_data(&self) -> InputData<'_> {
        match self {
            HostData::Bool(values) => InputData::Bool(values),
            HostData::F16(values) => InputData::F16(values),
            HostData::BF16(values) => InputData::BF16(values),
            HostData::F32(values) => InputData::F32(values),
            HostData::F64(values) => InputData::F64(values),
            HostData::I8(values) => InputData::I8(values),
            HostData::I16(values) => InputData::I16(values),
            HostData::I32(values) => InputData::I32(values),
            HostData::I64(values) => InputData::I64(values),
            HostData::U8(values) => InputData::U8(values),
            HostData::U16(values) => InputData::U16(values),
            HostData::U32(values) => InputData::U32(values),
            HostData::U64(values) => InputData::U64(values),
            HostData::String(strings) => InputData::String(strings.content()),
        }
    }

    /// Mutable view of numeric storage whose lifetime is chosen by the caller.
    ///
    /// # Safety
    /// The heap buffer behind `self` must stay allocated and must not be read
    /// or written through any other path while the returned buffer is alive.
    /// Moving the `HostData` value itself is fine; its heap buffer does not move.
    pub(crate) unsafe fn detach<'a>(&mut self) -> Option<OutputBuffer<'a>> {
        unsafe fn raw<'a, T: Element>(values: &mut Vec<T>) -> OutputBuffer<'a> {
            // SAFETY: forwarded from `detach`.
            unsafe { OutputBuffer::from_raw_parts(values.as_mut_ptr(), values.len()) }
        }
        // SAFETY: forwarded to the caller.
        unsafe {
            Some(match self {
                HostData::Bool(values) => raw(values),
                HostData::F16(values) => raw(values),
                HostData::BF16(values) => raw(values),
                HostData::F32(values) => raw(values),
                HostData::F64(values) => raw(values),
                HostData::I8(values) => raw(values),
                HostData::I16(values) => raw(values),
                HostData::I32(values) => raw(values),
                HostData::I64(values) => raw(values),
                HostData::U8(values) => raw(values),
                HostData::U16(values) => raw(values),
                HostData::U32(values) => raw(values),
                HostData::U64(values) => raw(values),
                HostData::String(_) => return None,
            })
        }
    }
}

/// Owned tensor living on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    shape: Vec<i64>,
    data: HostData,
}

impl HostTensor {
    pub fn from_vec<T: HostElement>(shape: Vec<i64>, values: Vec<T>) -> Result<Self> {
        Self::new(shape, T::wrap(values))
    }

    pub fn from_strings<S: AsRef<str>>(shape: Vec<i64>, strings: &[S]) -> Result<Self> {
        Self::new(shape, HostData::String(PackedStrings::pack(strings)))
    }

    /// Single-element tensor with an empty shape.
    pub fn scalar<T: HostElement>(value: T) -> Self {
        HostTensor {
            shape: Vec::new(),
            data: T::wrap(vec![value]),
        }
    }

    pub fn new(shape: Vec<i64>, data: HostData) -> Result<Self> {
        let expected = element_count(&shape)?;
        ensure!(
            expected == data.len(),
            "shape {shape:?} needs {expected} elements, got {}",
            data.len()
        );
        Ok(HostTensor { shape, data })
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn data(&self) -> &HostData {
        &self.data
    }

    pub fn as_slice<T: HostElement>(&self) -> Option<&[T]> {
        T::values(&self.data)
    }

    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match &self.data {
            HostData::String(strings) => Some(strings.unpack()),
            _ => None,
        }
    }

    /// Typed copy of the elements, failing on an element type mismatch.
    pub fn to_vec<T: HostElement>(&self) -> Result<Vec<T>> {
        match self.as_slice::<T>() {
            Some(values) => Ok(values.to_vec()),
            None => bail!(
                "tensor holds {} elements, requested {}",
                self.element_type(),
                T::TYPE
            ),
        }
    }

    pub(crate) fn from_parts(shape: Vec<i64>, data: HostData) -> Self {
        HostTensor { shape, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_strings_with_start_offsets() {
        let packed = PackedStrings::pack(&["a", "bb", "ccc"]);
        let content = packed.content();
        assert_eq!(content.blob, b"abbccc");
        assert_eq!(content.offsets, &[0, 1, 3]);
        assert_eq!(content.content_length, 6);
        assert_eq!(packed.unpack(), vec!["a", "bb", "ccc"]);
    }

    #[test]
    fn shape_must_cover_the_data() -> Result<()> {
        let tensor = HostTensor::from_vec(vec![2, 2], vec![1i32, 2, 3, 4])?;
        assert_eq!(tensor.element_type(), ElementType::I32);
        assert_eq!(tensor.to_vec::<i32>()?, vec![1, 2, 3, 4]);
        assert!(tensor.to_vec::<f32>().is_err());
        assert!(HostTensor::from_vec(vec![3], vec![1.0f32]).is_err());
        Ok(())
    }

    #[test]
    fn scalars_have_empty_shape() {
        let tensor = HostTensor::scalar(7u8);
        assert!(tensor.shape().is_empty());
        assert_eq!(tensor.as_slice::<u8>(), Some(&[7u8][..]));
    }
}
