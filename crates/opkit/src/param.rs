//! Maps Rust parameter types onto slots and turns bound values into arguments.
//!
//! [`ComputeParam`] is implemented for every supported parameter type and
//! answers two questions: which slot the parameter occupies (evaluated once
//! when the operator is built) and how to derive the argument from its bound
//! value (evaluated on every call). [`ComputeFn`] and [`KernelMethod`] lift
//! that to whole functions of up to twelve parameters.

use half::{bf16, f16};

use crate::binder::{BoundTensor, BoundValue};
use crate::context::ExecutionContext;
use crate::element::{Element, ElementType};
use crate::error::{OpError, OpResult};
use crate::schema::{Access, SlotDescriptor};
use crate::tensor::{Span, StringTensor, Tensor};

/// A type that can appear in a compute function's parameter list.
pub trait ComputeParam {
    /// The argument handed to the function for a call bound at `'a`.
    type Item<'a>;

    fn descriptor() -> SlotDescriptor;

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>>;
}

/// Argument type of parameter `P` for a call bound at `'a`.
pub type ParamItem<'a, P> = <P as ComputeParam>::Item<'a>;

fn unexpected(value: &BoundValue<'_>, wanted: &str) -> OpError {
    OpError::schema(format!("bound value {value:?} cannot feed a {wanted} parameter"))
}

fn typed_ref<'a, T: Element>(value: &'a mut BoundValue<'a>) -> OpResult<Option<&'a Tensor<'a, T>>> {
    match value {
        BoundValue::Absent => Ok(None),
        BoundValue::Tensor(tensor) => {
            let found = tensor.element_type();
            T::bound_ref(tensor).map(Some).ok_or_else(|| {
                OpError::schema(format!(
                    "bound {found} tensor cannot feed a {} parameter",
                    T::TYPE
                ))
            })
        }
        other => Err(unexpected(other, T::TYPE.name())),
    }
}

fn typed_mut<'a, T: Element>(
    value: &'a mut BoundValue<'a>,
) -> OpResult<Option<&'a mut Tensor<'a, T>>> {
    match value {
        BoundValue::Absent => Ok(None),
        BoundValue::Tensor(tensor) => {
            let found = tensor.element_type();
            T::bound_mut(tensor).map(Some).ok_or_else(|| {
                OpError::schema(format!(
                    "bound {found} tensor cannot feed a {} parameter",
                    T::TYPE
                ))
            })
        }
        other => Err(unexpected(other, T::TYPE.name())),
    }
}

fn strings_ref<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Option<&'a StringTensor<'a>>> {
    match value {
        BoundValue::Absent => Ok(None),
        BoundValue::Tensor(BoundTensor::String(tensor)) => Ok(Some(tensor)),
        other => Err(unexpected(other, "string")),
    }
}

fn strings_mut<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Option<&'a mut StringTensor<'a>>> {
    match value {
        BoundValue::Absent => Ok(None),
        BoundValue::Tensor(BoundTensor::String(tensor)) => Ok(Some(tensor)),
        other => Err(unexpected(other, "string")),
    }
}

fn required<T>(item: Option<T>, what: &str) -> OpResult<T> {
    item.ok_or_else(|| OpError::schema(format!("required {what} parameter bound as absent")))
}

impl<'x> ComputeParam for &'x dyn ExecutionContext {
    type Item<'a> = &'a dyn ExecutionContext;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::context()
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        match value {
            BoundValue::Context(ctx) => Ok(*ctx),
            other => Err(unexpected(other, "context")),
        }
    }
}

impl<'x, 'y, T: Element> ComputeParam for &'x Tensor<'y, T> {
    type Item<'a> = &'a Tensor<'a, T>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(T::TYPE, Access::Tensor, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(typed_ref(value)?, "input tensor")
    }
}

impl<'x, 'y, T: Element> ComputeParam for Option<&'x Tensor<'y, T>> {
    type Item<'a> = Option<&'a Tensor<'a, T>>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(T::TYPE, Access::Tensor, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        typed_ref(value)
    }
}

impl<'x, 'y, T: Element> ComputeParam for &'x mut Tensor<'y, T> {
    type Item<'a> = &'a mut Tensor<'a, T>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::output(T::TYPE, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(typed_mut(value)?, "output tensor")
    }
}

impl<'x, 'y, T: Element> ComputeParam for Option<&'x mut Tensor<'y, T>> {
    type Item<'a> = Option<&'a mut Tensor<'a, T>>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::output(T::TYPE, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        typed_mut(value)
    }
}

impl<'x, T: Element> ComputeParam for Span<'x, T> {
    type Item<'a> = Span<'a, T>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(T::TYPE, Access::Span, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(typed_ref::<T>(value)?, "span")?.as_span()
    }
}

impl<'x, T: Element> ComputeParam for Option<Span<'x, T>> {
    type Item<'a> = Option<Span<'a, T>>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(T::TYPE, Access::Span, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        typed_ref::<T>(value)?.map(Tensor::as_span).transpose()
    }
}

macro_rules! impl_scalar_param {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ComputeParam for $ty {
                type Item<'a> = $ty;

                fn descriptor() -> SlotDescriptor {
                    SlotDescriptor::input(<$ty as Element>::TYPE, Access::Scalar, false)
                }

                fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
                    required(typed_ref::<$ty>(value)?, "scalar")?.as_scalar()
                }
            }

            impl ComputeParam for Option<$ty> {
                type Item<'a> = Option<$ty>;

                fn descriptor() -> SlotDescriptor {
                    SlotDescriptor::input(<$ty as Element>::TYPE, Access::Scalar, true)
                }

                fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
                    typed_ref::<$ty>(value)?.map(Tensor::as_scalar).transpose()
                }
            }
        )*
    };
}

impl_scalar_param!(bool, f16, bf16, f32, f64, i8, i16, i32, i64, u8, u16, u32, u64);

impl<'x, 'y> ComputeParam for &'x StringTensor<'y> {
    type Item<'a> = &'a StringTensor<'a>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(ElementType::String, Access::Tensor, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(strings_ref(value)?, "string input")
    }
}

impl<'x, 'y> ComputeParam for Option<&'x StringTensor<'y>> {
    type Item<'a> = Option<&'a StringTensor<'a>>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(ElementType::String, Access::Tensor, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        strings_ref(value)
    }
}

impl<'x, 'y> ComputeParam for &'x mut StringTensor<'y> {
    type Item<'a> = &'a mut StringTensor<'a>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::output(ElementType::String, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(strings_mut(value)?, "string output")
    }
}

impl<'x, 'y> ComputeParam for Option<&'x mut StringTensor<'y>> {
    type Item<'a> = Option<&'a mut StringTensor<'a>>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::output(ElementType::String, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        strings_mut(value)
    }
}

impl<'x> ComputeParam for &'x str {
    type Item<'a> = &'a str;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(ElementType::String, Access::Scalar, false)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        required(strings_ref(value)?, "string scalar")?.as_scalar()
    }
}

impl<'x> ComputeParam for Option<&'x str> {
    type Item<'a> = Option<&'a str>;

    fn descriptor() -> SlotDescriptor {
        SlotDescriptor::input(ElementType::String, Access::Scalar, true)
    }

    fn fetch<'a>(value: &'a mut BoundValue<'a>) -> OpResult<Self::Item<'a>> {
        strings_ref(value)?.map(StringTensor::as_scalar).transpose()
    }
}

/// Return types accepted from compute functions.
pub trait IntoOpResult {
    fn into_op_result(self) -> OpResult<()>;
}

impl IntoOpResult for () {
    fn into_op_result(self) -> OpResult<()> {
        Ok(())
    }
}

impl<E: Into<OpError>> IntoOpResult for Result<(), E> {
    fn into_op_result(self) -> OpResult<()> {
        self.map_err(Into::into)
    }
}

/// A free function or closure usable as an operator body.
///
/// `Marker` is the function's signature; it only disambiguates the impls.
pub trait ComputeFn<Marker>: Send + Sync + 'static {
    /// One descriptor per parameter, in declaration order.
    fn descriptors() -> Vec<SlotDescriptor>;

    fn invoke<'a>(&self, bound: &'a mut [BoundValue<'a>]) -> OpResult<()>;
}

/// A method `fn(&K, params...)` invoked on per-kernel state `K`.
pub trait KernelMethod<K, Marker>: Send + Sync + 'static {
    fn descriptors() -> Vec<SlotDescriptor>;

    fn invoke<'a>(&self, state: &K, bound: &'a mut [BoundValue<'a>]) -> OpResult<()>;
}

fn next_value<'a>(
    values: &mut std::slice::IterMut<'a, BoundValue<'a>>,
) -> OpResult<&'a mut BoundValue<'a>> {
    values
        .next()
        .ok_or_else(|| OpError::schema("fewer bound values than declared parameters"))
}

macro_rules! impl_compute_fn {
    ($($param:ident),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<Out, Func, $($param: ComputeParam),*> ComputeFn<fn($($param,)*) -> Out> for Func
        where
            Func: Send + Sync + 'static,
            for<'f> &'f Func: Fn($($param),*) -> Out + Fn($(ParamItem<'_, $param>),*) -> Out,
            Out: IntoOpResult,
        {
            fn descriptors() -> Vec<SlotDescriptor> {
                vec![$(<$param as ComputeParam>::descriptor()),*]
            }

            fn invoke<'a>(&self, bound: &'a mut [BoundValue<'a>]) -> OpResult<()> {
                fn call_inner<Out, $($param,)*>(f: impl Fn($($param,)*) -> Out, $($param: $param,)*) -> Out {
                    f($($param,)*)
                }
                let mut values = bound.iter_mut();
                $(
                    let $param = <$param as ComputeParam>::fetch(next_value(&mut values)?)?;
                )*
                call_inner(self, $($param),*).into_op_result()
            }
        }

        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<K, Out, Func, $($param: ComputeParam),*> KernelMethod<K, fn(&K, $($param,)*) -> Out> for Func
        where
            K: 'static,
            Func: Send + Sync + 'static,
            for<'f> &'f Func: Fn(&K, $($param),*) -> Out + Fn(&K, $(ParamItem<'_, $param>),*) -> Out,
            Out: IntoOpResult,
        {
            fn descriptors() -> Vec<SlotDescriptor> {
                vec![$(<$param as ComputeParam>::descriptor()),*]
            }

            fn invoke<'a>(&self, state: &K, bound: &'a mut [BoundValue<'a>]) -> OpResult<()> {
                fn call_inner<K, Out, $($param,)*>(
                    f: impl Fn(&K, $($param,)*) -> Out,
                    state: &K,
                    $($param: $param,)*
                ) -> Out {
                    f(state, $($param,)*)
                }
                let mut values = bound.iter_mut();
                $(
                    let $param = <$param as ComputeParam>::fetch(next_value(&mut values)?)?;
                )*
                call_inner(self, state, $($param),*).into_op_result()
            }
        }
    };
}

impl_compute_fn!();
impl_compute_fn!(P0);
impl_compute_fn!(P0, P1);
impl_compute_fn!(P0, P1, P2);
impl_compute_fn!(P0, P1, P2, P3);
impl_compute_fn!(P0, P1, P2, P3, P4);
impl_compute_fn!(P0, P1, P2, P3, P4, P5);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6, P7);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6, P7, P8);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10);
impl_compute_fn!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SlotKind;

    fn descriptors<M, F: ComputeFn<M>>(_: &F) -> Vec<SlotDescriptor> {
        F::descriptors()
    }

    fn run<M, F: ComputeFn<M>>(func: &F) -> OpResult<()> {
        ComputeFn::<M>::invoke(func, &mut [])
    }

    #[test]
    fn parameter_types_map_to_slot_kinds() {
        fn body(
            _ctx: &dyn ExecutionContext,
            _x: &Tensor<f32>,
            _bias: Option<&Tensor<f32>>,
            _n: i64,
            _label: Option<&str>,
            _y: &mut Tensor<f32>,
            _aux: Option<&mut StringTensor>,
        ) {
        }
        let kinds: Vec<_> = descriptors(&body).into_iter().map(|slot| slot.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SlotKind::Context,
                SlotKind::Input,
                SlotKind::OptionalInput,
                SlotKind::Input,
                SlotKind::OptionalInput,
                SlotKind::Output,
                SlotKind::OptionalOutput,
            ]
        );
    }

    #[test]
    fn access_modes_are_recorded() {
        fn body(_s: Span<i32>, _v: u8, _t: &Tensor<f64>) {}
        let access: Vec<_> = descriptors(&body).into_iter().map(|slot| slot.access).collect();
        assert_eq!(access, vec![Access::Span, Access::Scalar, Access::Tensor]);
    }

    #[test]
    fn zero_argument_functions_are_accepted() {
        fn body() -> OpResult<()> {
            Ok(())
        }
        assert!(descriptors(&body).is_empty());
        assert!(run(&body).is_ok());
    }

    #[test]
    fn missing_bound_values_are_reported() {
        fn body(_x: &Tensor<f32>) {}
        assert!(run(&body).unwrap_err().is_schema_violation());
    }
}
