use std::ops::Range;

use crate::context::{ExecutionContext, StringContent};
use crate::error::{OpError, OpResult};
use crate::tensor::shape::element_count;

/// String-typed input or output.
///
/// Inputs copy the packed character blob once and hand out `&str` views into
/// it. Outputs are written in one go through [`set_output`](StringTensor::set_output).
pub struct StringTensor<'a> {
    index: usize,
    shape: Option<Vec<i64>>,
    storage: Storage<'a>,
}

enum Storage<'a> {
    Input {
        blob: String,
        bounds: Vec<Range<usize>>,
    },
    Output {
        ctx: &'a dyn ExecutionContext,
        written: bool,
    },
}

impl<'a> StringTensor<'a> {
    pub(crate) fn input(index: usize, shape: Vec<i64>, content: StringContent<'_>) -> OpResult<Self> {
        let count = element_count(&shape)?;
        if content.offsets.len() != count {
            return Err(OpError::shape(format!(
                "string input {index} has shape {shape:?} but {} offsets",
                content.offsets.len()
            )));
        }
        let packed = content.blob.get(..content.content_length).ok_or_else(|| {
            OpError::shape(format!(
                "string input {index} declares {} bytes but carries {}",
                content.content_length,
                content.blob.len()
            ))
        })?;
        let blob = std::str::from_utf8(packed)
            .map_err(|err| OpError::shape(format!("string input {index} is not UTF-8: {err}")))?
            .to_owned();

        let mut bounds = vec![0..0; count];
        let mut end = blob.len();
        for (element, &start) in content.offsets.iter().enumerate().rev() {
            if start > end || !blob.is_char_boundary(start) {
                return Err(OpError::shape(format!(
                    "string input {index}: element {element} starts at {start}, past its end {end}"
                )));
            }
            bounds[element] = start..end;
            end = start;
        }

        Ok(StringTensor {
            index,
            shape: Some(shape),
            storage: Storage::Input { blob, bounds },
        })
    }

    pub(crate) fn output(ctx: &'a dyn ExecutionContext, index: usize) -> Self {
        StringTensor {
            index,
            shape: None,
            storage: Storage::Output {
                ctx,
                written: false,
            },
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_input(&self) -> bool {
        matches!(self.storage, Storage::Input { .. })
    }

    pub fn shape(&self) -> OpResult<&[i64]> {
        self.shape.as_deref().ok_or_else(|| {
            OpError::shape(format!(
                "shape of string output {} is read before it is written",
                self.index
            ))
        })
    }

    pub fn num_elements(&self) -> usize {
        match &self.shape {
            Some(dims) => dims.iter().map(|&dim| dim.max(0) as usize).product(),
            None => 0,
        }
    }

    /// Number of readable strings; always 0 for outputs.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Input { bounds, .. } => bounds.len(),
            Storage::Output { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        match &self.storage {
            Storage::Input { blob, bounds } => bounds.get(index).map(|range| &blob[range.clone()]),
            Storage::Output { .. } => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }

    pub fn as_scalar(&self) -> OpResult<&str> {
        match (self.num_elements(), self.get(0)) {
            (1, Some(value)) => Ok(value),
            _ => Err(OpError::shape(format!(
                "string tensor {} with shape {:?} is not a single-element tensor",
                self.index, self.shape
            ))),
        }
    }

    /// Writes the output strings with the given dims.
    ///
    /// The first successful call fixes the output; later calls are no-ops.
    pub fn set_output<S: AsRef<str>>(&mut self, strings: &[S], dims: &[i64]) -> OpResult<()> {
        let index = self.index;
        let Storage::Output { ctx, written } = &mut self.storage else {
            return Err(OpError::schema(format!(
                "string input {index} is read-only and cannot be written"
            )));
        };
        if *written {
            return Ok(());
        }
        let expected = element_count(dims)?;
        if strings.len() != expected {
            return Err(OpError::shape(format!(
                "string output {index} has shape {dims:?} ({expected} elements) but {} strings",
                strings.len()
            )));
        }
        let views: Vec<&str> = strings.iter().map(AsRef::as_ref).collect();
        ctx.output_strings(index, dims, &views)?;
        *written = true;
        self.shape = Some(dims.to_vec());
        Ok(())
    }
}

impl std::fmt::Debug for StringTensor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTensor")
            .field("index", &self.index)
            .field("shape", &self.shape)
            .field("input", &self.is_input())
            .finish()
    }
}
