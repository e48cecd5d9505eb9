//! Call-scoped tensor views handed to operator bodies.
//!
//! [`Tensor`] wraps one numeric input or output, [`Span`] is a flat read-only
//! view of a rank-1 input, and [`StringTensor`] carries string elements. All of
//! them borrow from the execution context and cannot outlive the call.

mod container;
pub mod shape;
mod span;
mod strings;

pub use container::Tensor;
pub use shape::element_count;
pub use span::Span;
pub use strings::StringTensor;
