//! Enumerates the scalar element types an operator can consume or produce.

use std::fmt;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::binder::BoundTensor;
use crate::context::{InputData, OutputBuffer};
use crate::tensor::Tensor;

/// Element type tag shared between the engine and operator schemas.
///
/// The numeric codes match the engine's tensor element enumeration.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit IEEE-754 floating point.
    F32,
    U8,
    I8,
    U16,
    I16,
    I32,
    I64,
    /// Variable-length UTF-8 strings.
    String,
    Bool,
    /// 16-bit floating point (fp16).
    F16,
    /// 64-bit IEEE-754 floating point.
    F64,
    U32,
    U64,
    /// 16-bit bfloat16.
    BF16,
}

impl ElementType {
    pub const ALL: [ElementType; 14] = [
        ElementType::F32,
        ElementType::U8,
        ElementType::I8,
        ElementType::U16,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
        ElementType::String,
        ElementType::Bool,
        ElementType::F16,
        ElementType::F64,
        ElementType::U32,
        ElementType::U64,
        ElementType::BF16,
    ];

    /// Returns the engine's numeric code for this element type.
    pub fn code(self) -> u32 {
        match self {
            ElementType::F32 => 1,
            ElementType::U8 => 2,
            ElementType::I8 => 3,
            ElementType::U16 => 4,
            ElementType::I16 => 5,
            ElementType::I32 => 6,
            ElementType::I64 => 7,
            ElementType::String => 8,
            ElementType::Bool => 9,
            ElementType::F16 => 10,
            ElementType::F64 => 11,
            ElementType::U32 => 12,
            ElementType::U64 => 13,
            ElementType::BF16 => 16,
        }
    }

    /// Reconstructs an element type from the engine's numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        ElementType::ALL.into_iter().find(|ty| ty.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::F16 => "f16",
            ElementType::F64 => "f64",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
            ElementType::BF16 => "bf16",
        }
    }

    /// Returns the number of bytes per element, or `None` for strings.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            ElementType::Bool | ElementType::U8 | ElementType::I8 => Some(1),
            ElementType::U16 | ElementType::I16 | ElementType::F16 | ElementType::BF16 => Some(2),
            ElementType::F32 | ElementType::I32 | ElementType::U32 => Some(4),
            ElementType::F64 | ElementType::I64 | ElementType::U64 => Some(8),
            ElementType::String => None,
        }
    }

    pub fn is_string(self) -> bool {
        self == ElementType::String
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric scalar type that can back a [`Tensor`].
///
/// Implemented for every fixed-width element type; strings go through
/// [`crate::tensor::StringTensor`] instead. The hidden methods map between the
/// typed world and the per-type variants of the context and binder enums.
pub trait Element: Copy + Send + Sync + fmt::Debug + 'static {
    const TYPE: ElementType;

    #[doc(hidden)]
    fn input_slice<'a>(data: &InputData<'a>) -> Option<&'a [Self]>;

    #[doc(hidden)]
    fn output_slice(buffer: OutputBuffer<'_>) -> Option<&'_ mut [Self]>;

    #[doc(hidden)]
    fn output_buffer(values: &mut [Self]) -> OutputBuffer<'_>;

    #[doc(hidden)]
    fn into_bound(tensor: Tensor<'_, Self>) -> BoundTensor<'_>;

    #[doc(hidden)]
    fn bound_ref<'b, 'a>(bound: &'b BoundTensor<'a>) -> Option<&'b Tensor<'a, Self>>;

    #[doc(hidden)]
    fn bound_mut<'b, 'a>(bound: &'b mut BoundTensor<'a>) -> Option<&'b mut Tensor<'a, Self>>;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                fn input_slice<'a>(data: &InputData<'a>) -> Option<&'a [Self]> {
                    match data {
                        InputData::$variant(values) => Some(*values),
                        _ => None,
                    }
                }

                fn output_slice(buffer: OutputBuffer<'_>) -> Option<&'_ mut [Self]> {
                    match buffer {
                        OutputBuffer::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn output_buffer(values: &mut [Self]) -> OutputBuffer<'_> {
                    OutputBuffer::$variant(values)
                }

                fn into_bound(tensor: Tensor<'_, Self>) -> BoundTensor<'_> {
                    BoundTensor::$variant(tensor)
                }

                fn bound_ref<'b, 'a>(bound: &'b BoundTensor<'a>) -> Option<&'b Tensor<'a, Self>> {
                    match bound {
                        BoundTensor::$variant(tensor) => Some(tensor),
                        _ => None,
                    }
                }

                fn bound_mut<'b, 'a>(
                    bound: &'b mut BoundTensor<'a>,
                ) -> Option<&'b mut Tensor<'a, Self>> {
                    match bound {
                        BoundTensor::$variant(tensor) => Some(tensor),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_element! {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for ty in ElementType::ALL {
            assert_eq!(ElementType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ElementType::F32.code(), 1);
        assert_eq!(ElementType::BF16.code(), 16);
        assert_eq!(ElementType::from_code(14), None);
    }

    #[test]
    fn element_tags_match_rust_types() {
        assert_eq!(<f32 as Element>::TYPE, ElementType::F32);
        assert_eq!(<half::f16 as Element>::TYPE, ElementType::F16);
        assert_eq!(<bool as Element>::TYPE, ElementType::Bool);
        assert_eq!(<u64 as Element>::TYPE, ElementType::U64);
    }

    #[test]
    fn sizes_and_names() {
        assert_eq!(ElementType::BF16.size_in_bytes(), Some(2));
        assert_eq!(ElementType::I64.size_in_bytes(), Some(8));
        assert_eq!(ElementType::String.size_in_bytes(), None);
        assert_eq!(ElementType::F64.to_string(), "f64");
    }

    #[test]
    fn input_views_reject_other_types() {
        let values = [1.0f32, 2.0];
        let data = InputData::F32(&values);
        assert_eq!(f32::input_slice(&data), Some(&values[..]));
        assert_eq!(i32::input_slice(&data), None);
    }
}
