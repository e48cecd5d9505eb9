use crate::context::ExecutionContext;
use crate::element::Element;
use crate::error::{OpError, OpResult};
use crate::tensor::shape::element_count;
use crate::tensor::Span;

/// Typed view of one operator input or output for the duration of a call.
///
/// Inputs borrow engine memory read-only. Outputs start without a shape and
/// receive their buffer from the execution context on the first
/// [`allocate`](Tensor::allocate).
pub struct Tensor<'a, T: Element> {
    index: usize,
    shape: Option<Vec<i64>>,
    storage: Storage<'a, T>,
}

enum Storage<'a, T> {
    Input(&'a [T]),
    Output {
        ctx: &'a dyn ExecutionContext,
        data: Option<&'a mut [T]>,
    },
}

impl<'a, T: Element> Tensor<'a, T> {
    pub(crate) fn input(index: usize, shape: Vec<i64>, data: &'a [T]) -> OpResult<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(OpError::shape(format!(
                "input {index} has shape {shape:?} ({expected} elements) but {} {} values",
                data.len(),
                T::TYPE
            )));
        }
        Ok(Tensor {
            index,
            shape: Some(shape),
            storage: Storage::Input(data),
        })
    }

    pub(crate) fn output(ctx: &'a dyn ExecutionContext, index: usize) -> Self {
        Tensor {
            index,
            shape: None,
            storage: Storage::Output { ctx, data: None },
        }
    }

    /// Position of this tensor among the node's inputs or outputs.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_input(&self) -> bool {
        matches!(self.storage, Storage::Input(_))
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self.storage, Storage::Output { data: Some(_), .. })
    }

    /// Returns the bound shape; outputs have none until allocated.
    pub fn shape(&self) -> OpResult<&[i64]> {
        self.shape.as_deref().ok_or_else(|| {
            OpError::shape(format!(
                "shape of output {} is read before allocation",
                self.index
            ))
        })
    }

    /// Product of the dimensions, or 0 while the shape is unset.
    pub fn num_elements(&self) -> usize {
        match &self.shape {
            Some(dims) => dims.iter().map(|&dim| dim.max(0) as usize).product(),
            None => 0,
        }
    }

    /// Input data, or the allocated output buffer (empty before allocation).
    pub fn data(&self) -> &[T] {
        match &self.storage {
            Storage::Input(data) => data,
            Storage::Output {
                data: Some(data), ..
            } => data,
            Storage::Output { data: None, .. } => &[],
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::Output { data, .. } => data.as_deref_mut(),
            Storage::Input(_) => None,
        }
    }

    /// Provisions the output buffer for `shape` and returns it.
    ///
    /// Only the first call reaches the execution context. Later calls return
    /// the same buffer and keep the first shape, whatever shape they pass.
    pub fn allocate(&mut self, shape: &[i64]) -> OpResult<&mut [T]> {
        let index = self.index;
        let Storage::Output { ctx, data } = &mut self.storage else {
            return Err(OpError::schema(format!(
                "input {index} is read-only and cannot be allocated"
            )));
        };
        if data.is_none() {
            let expected = element_count(shape)?;
            let ctx: &'a dyn ExecutionContext = *ctx;
            let buffer = ctx.output(index, T::TYPE, shape)?;
            let provided = buffer.element_type();
            let values = T::output_slice(buffer).ok_or_else(|| {
                OpError::allocation(
                    index,
                    format!("context returned a {provided} buffer for a {} output", T::TYPE),
                )
            })?;
            if values.len() != expected {
                return Err(OpError::allocation(
                    index,
                    format!(
                        "context returned {} elements for shape {shape:?}, expected {expected}",
                        values.len()
                    ),
                ));
            }
            self.shape = Some(shape.to_vec());
            *data = Some(values);
        }
        data.as_deref_mut()
            .ok_or_else(|| OpError::allocation(index, "output buffer missing after allocation"))
    }

    /// Reads the single element of a one-element tensor.
    pub fn as_scalar(&self) -> OpResult<T> {
        match (self.num_elements(), self.data().first()) {
            (1, Some(value)) => Ok(*value),
            _ => Err(OpError::shape(format!(
                "tensor {} with shape {:?} is not a single-element tensor",
                self.index, self.shape
            ))),
        }
    }

    /// Flat view of a rank-1 input.
    pub fn as_span(&self) -> OpResult<Span<'a, T>> {
        match (&self.shape, &self.storage) {
            (Some(dims), Storage::Input(data)) if dims.len() == 1 => Ok(Span::new(*data)),
            (_, Storage::Input(_)) => Err(OpError::shape(format!(
                "span requires a rank-1 input, input {} has shape {:?}",
                self.index, self.shape
            ))),
            (_, Storage::Output { .. }) => Err(OpError::shape(format!(
                "span requested for output {}",
                self.index
            ))),
        }
    }
}

impl<T: Element> std::fmt::Debug for Tensor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("index", &self.index)
            .field("element", &T::TYPE)
            .field("shape", &self.shape)
            .field("input", &self.is_input())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::context::{InputValue, OutputBuffer};
    use crate::element::ElementType;

    /// Hands out leaked buffers and remembers every request.
    #[derive(Default)]
    struct LeakingContext {
        requests: RefCell<Vec<Vec<i64>>>,
    }

    impl ExecutionContext for LeakingContext {
        fn input_count(&self) -> usize {
            0
        }

        fn output_count(&self) -> usize {
            1
        }

        fn input(&self, index: usize) -> OpResult<InputValue<'_>> {
            Err(OpError::engine(format!("no input {index}")))
        }

        fn output(
            &self,
            _index: usize,
            element: ElementType,
            shape: &[i64],
        ) -> OpResult<OutputBuffer<'_>> {
            assert_eq!(element, ElementType::F32);
            self.requests.borrow_mut().push(shape.to_vec());
            let len = element_count(shape)?;
            let values: &'static mut [f32] = Box::leak(vec![0.0f32; len].into_boxed_slice());
            Ok(OutputBuffer::from_slice(values))
        }

        fn output_strings(&self, _: usize, _: &[i64], _: &[&str]) -> OpResult<()> {
            Ok(())
        }
    }

    #[test]
    fn num_elements_follows_shape() {
        let ctx = LeakingContext::default();
        let output = Tensor::<f32>::output(&ctx, 0);
        assert_eq!(output.num_elements(), 0);
        assert!(output.shape().unwrap_err().is_shape_violation());

        let values = [0.0f32; 6];
        let input = Tensor::input(0, vec![2, 3], &values[..]).unwrap();
        assert_eq!(input.num_elements(), 6);

        let scalar = [1.5f32];
        let input = Tensor::input(0, vec![], &scalar[..]).unwrap();
        assert_eq!(input.num_elements(), 1);
        assert_eq!(input.as_scalar().unwrap(), 1.5);
    }

    #[test]
    fn first_allocation_wins() {
        let ctx = LeakingContext::default();
        let mut output = Tensor::<f32>::output(&ctx, 0);
        output.allocate(&[2, 2]).unwrap().fill(1.0);
        let again = output.allocate(&[8]).unwrap();
        assert_eq!(again, &[1.0; 4]);
        assert_eq!(output.shape().unwrap(), &[2, 2]);
        assert_eq!(ctx.requests.borrow().len(), 1);
    }

    #[test]
    fn inputs_cannot_be_allocated() {
        let values = [1i32, 2];
        let mut input = Tensor::input(0, vec![2], &values[..]).unwrap();
        assert!(input.allocate(&[2]).unwrap_err().is_schema_violation());
        assert!(input.data_mut().is_none());
    }

    #[test]
    fn data_length_must_match_shape() {
        let values = [1i32, 2, 3];
        let err = Tensor::input(1, vec![2, 2], &values[..]).unwrap_err();
        assert!(err.is_shape_violation());
    }

    #[test]
    fn scalar_and_span_require_matching_shapes() {
        let values = [1.0f64, 2.0, 3.0, 4.0];
        let pair = Tensor::input(0, vec![2], &values[..2]).unwrap();
        assert!(pair.as_scalar().unwrap_err().is_shape_violation());
        assert_eq!(pair.as_span().unwrap().as_slice(), &[1.0, 2.0]);

        let matrix = Tensor::input(0, vec![2, 2], &values[..]).unwrap();
        assert!(matrix.as_span().unwrap_err().is_shape_violation());
    }
}
