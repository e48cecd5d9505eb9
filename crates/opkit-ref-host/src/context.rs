//! Recording execution context over owned host tensors.

use std::cell::RefCell;
use std::collections::BTreeSet;

use opkit::tensor::element_count;
use opkit::{ElementType, ExecutionContext, InputValue, OpError, OpResult, OutputBuffer};

use crate::tensor::{HostData, HostTensor, PackedStrings};

/// One output provisioning request seen by a [`HostContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub index: usize,
    pub element: ElementType,
    pub shape: Vec<i64>,
}

/// Execution context for a single call, backed by host memory.
///
/// Every output index can be provisioned once. Provisioned buffers stay
/// untouched until [`into_outputs`](HostContext::into_outputs) consumes the
/// context, so the buffers handed to the operator are never aliased.
pub struct HostContext {
    inputs: Vec<HostTensor>,
    outputs: Vec<RefCell<Option<HostTensor>>>,
    requests: RefCell<Vec<AllocationRecord>>,
    failing: BTreeSet<usize>,
}

impl HostContext {
    pub fn new(inputs: Vec<HostTensor>, output_count: usize) -> Self {
        HostContext {
            inputs,
            outputs: (0..output_count).map(|_| RefCell::new(None)).collect(),
            requests: RefCell::new(Vec::new()),
            failing: BTreeSet::new(),
        }
    }

    /// Makes every provisioning request for `index` fail.
    pub fn fail_output(mut self, index: usize) -> Self {
        self.failing.insert(index);
        self
    }

    /// Provisioning requests in the order they were made.
    pub fn requests(&self) -> Vec<AllocationRecord> {
        self.requests.borrow().clone()
    }

    /// Produced outputs by index; unprovisioned outputs are `None`.
    pub fn into_outputs(self) -> Vec<Option<HostTensor>> {
        self.outputs.into_iter().map(RefCell::into_inner).collect()
    }

    fn record(&self, index: usize, element: ElementType, shape: &[i64]) -> OpResult<()> {
        if index >= self.outputs.len() {
            return Err(OpError::allocation(
                index,
                format!("node has only {} outputs", self.outputs.len()),
            ));
        }
        let mut requests = self.requests.borrow_mut();
        if requests.iter().any(|request| request.index == index) {
            log::warn!("output {index} requested twice in one call");
            return Err(OpError::allocation(index, "output already provisioned"));
        }
        requests.push(AllocationRecord {
            index,
            element,
            shape: shape.to_vec(),
        });
        if self.failing.contains(&index) {
            log::warn!("refusing to provision output {index}");
            return Err(OpError::allocation(index, "provisioning disabled for this output"));
        }
        Ok(())
    }
}

impl ExecutionContext for HostContext {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn input(&self, index: usize) -> OpResult<InputValue<'_>> {
        let tensor = self.inputs.get(index).ok_or_else(|| {
            OpError::engine(format!(
                "input {index} requested but the call has {}",
                self.inputs.len()
            ))
        })?;
        Ok(InputValue {
            shape: tensor.shape().to_vec(),
            data: tensor.data().input_data(),
        })
    }

    fn output(
        &self,
        index: usize,
        element: ElementType,
        shape: &[i64],
    ) -> OpResult<OutputBuffer<'_>> {
        // Rejected before `record` so the slot stays free for `output_strings`.
        if element == ElementType::String {
            return Err(OpError::allocation(
                index,
                "string outputs are written with output_strings",
            ));
        }
        let len = element_count(shape)?;
        self.record(index, element, shape)?;
        let mut data = HostData::zeros(element, len).ok_or_else(|| {
            OpError::allocation(index, format!("no numeric buffer for {element}"))
        })?;
        // SAFETY: `record` admits each index once, so this buffer is handed out
        // once. The cell below is not accessed again before `into_outputs`,
        // which takes the context by value and so outlives every borrow of it.
        let buffer = unsafe { data.detach() };
        let buffer = buffer.ok_or_else(|| OpError::allocation(index, "buffer is not numeric"))?;
        *self.outputs[index].borrow_mut() = Some(HostTensor::from_parts(shape.to_vec(), data));
        log::trace!("provisioned output {index}: {element} {shape:?}");
        Ok(buffer)
    }

    fn output_strings(&self, index: usize, shape: &[i64], strings: &[&str]) -> OpResult<()> {
        self.record(index, ElementType::String, shape)?;
        let expected = element_count(shape)?;
        if expected != strings.len() {
            return Err(OpError::shape(format!(
                "string output {index} has shape {shape:?} but {} strings",
                strings.len()
            )));
        }
        let data = HostData::String(PackedStrings::pack(strings));
        *self.outputs[index].borrow_mut() = Some(HostTensor::from_parts(shape.to_vec(), data));
        Ok(())
    }
}
