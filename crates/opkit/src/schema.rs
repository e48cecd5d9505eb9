//! Ordered descriptor table derived from a compute function's parameter list.
//!
//! Every parameter contributes one [`SlotDescriptor`]. Context handles consume
//! no slot; every other parameter consumes the next input or output slot, and
//! the input/output element type lists the engine sees are read off in order.

use serde::{Deserialize, Serialize};

use crate::binder::{bind_fn, BindFn};
use crate::element::ElementType;
use crate::error::{OpError, OpResult};

/// How a parameter participates in the node's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// The execution context itself; consumes no slot.
    Context,
    Input,
    OptionalInput,
    Output,
    OptionalOutput,
}

impl SlotKind {
    pub fn is_input(self) -> bool {
        matches!(self, SlotKind::Input | SlotKind::OptionalInput)
    }

    pub fn is_output(self) -> bool {
        matches!(self, SlotKind::Output | SlotKind::OptionalOutput)
    }

    pub fn is_optional(self) -> bool {
        matches!(self, SlotKind::OptionalInput | SlotKind::OptionalOutput)
    }
}

/// Shape in which a bound value reaches the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Context,
    Tensor,
    Span,
    Scalar,
}

/// Whether the engine must connect a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Characteristic {
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    pub kind: SlotKind,
    pub element: Option<ElementType>,
    pub access: Access,
}

impl SlotDescriptor {
    pub const fn context() -> Self {
        SlotDescriptor {
            kind: SlotKind::Context,
            element: None,
            access: Access::Context,
        }
    }

    pub const fn input(element: ElementType, access: Access, optional: bool) -> Self {
        SlotDescriptor {
            kind: if optional {
                SlotKind::OptionalInput
            } else {
                SlotKind::Input
            },
            element: Some(element),
            access,
        }
    }

    pub const fn output(element: ElementType, optional: bool) -> Self {
        SlotDescriptor {
            kind: if optional {
                SlotKind::OptionalOutput
            } else {
                SlotKind::Output
            },
            element: Some(element),
            access: Access::Tensor,
        }
    }

    /// Routine that builds this slot's tensor; `None` for the context slot.
    pub fn binder(&self) -> Option<BindFn> {
        self.element.map(bind_fn)
    }

    fn validate(&self, position: usize) -> OpResult<()> {
        let consistent = match (self.kind, self.element, self.access) {
            (SlotKind::Context, None, Access::Context) => true,
            (SlotKind::Context, _, _) => false,
            (_, None, _) | (_, _, Access::Context) => false,
            (_, Some(ElementType::String), Access::Span) => false,
            (kind, Some(_), access) if kind.is_output() => access == Access::Tensor,
            _ => true,
        };
        if consistent {
            Ok(())
        } else {
            Err(OpError::schema(format!(
                "parameter {position} has no supported element mapping: {self:?}"
            )))
        }
    }
}

/// Element-type schema of one operator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    slots: Vec<SlotDescriptor>,
    input_types: Vec<ElementType>,
    output_types: Vec<ElementType>,
    input_kinds: Vec<Characteristic>,
    output_kinds: Vec<Characteristic>,
}

impl Schema {
    /// Builds the schema from parameter descriptors in declaration order.
    pub fn from_slots(slots: Vec<SlotDescriptor>) -> OpResult<Self> {
        let mut input_types = Vec::new();
        let mut output_types = Vec::new();
        let mut input_kinds = Vec::new();
        let mut output_kinds = Vec::new();

        for (position, slot) in slots.iter().enumerate() {
            slot.validate(position)?;
            let (Some(element), kind) = (slot.element, slot.kind) else {
                continue;
            };
            let characteristic = if kind.is_optional() {
                Characteristic::Optional
            } else {
                Characteristic::Required
            };
            if kind.is_input() {
                input_types.push(element);
                input_kinds.push(characteristic);
            } else if kind.is_output() {
                output_types.push(element);
                output_kinds.push(characteristic);
            }
        }

        Ok(Schema {
            slots,
            input_types,
            output_types,
            input_kinds,
            output_kinds,
        })
    }

    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    pub fn input_types(&self) -> &[ElementType] {
        &self.input_types
    }

    pub fn output_types(&self) -> &[ElementType] {
        &self.output_types
    }

    pub fn input_count(&self) -> usize {
        self.input_types.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_types.len()
    }

    pub fn input_characteristic(&self, index: usize) -> Option<Characteristic> {
        self.input_kinds.get(index).copied()
    }

    pub fn output_characteristic(&self, index: usize) -> Option<Characteristic> {
        self.output_kinds.get(index).copied()
    }

    /// Smallest input count that reaches every required input slot.
    pub fn mandatory_inputs(&self) -> usize {
        required_prefix(&self.input_kinds)
    }

    /// Smallest output count that reaches every required output slot.
    pub fn mandatory_outputs(&self) -> usize {
        required_prefix(&self.output_kinds)
    }

    /// Rejects nodes that leave a required slot unconnected.
    pub fn check_arity(&self, inputs: usize, outputs: usize) -> OpResult<()> {
        if inputs < self.mandatory_inputs() {
            return Err(OpError::schema(format!(
                "node has {inputs} inputs but {} are required",
                self.mandatory_inputs()
            )));
        }
        if outputs < self.mandatory_outputs() {
            return Err(OpError::schema(format!(
                "node has {outputs} outputs but {} are required",
                self.mandatory_outputs()
            )));
        }
        Ok(())
    }
}

fn required_prefix(kinds: &[Characteristic]) -> usize {
    kinds
        .iter()
        .rposition(|kind| *kind == Characteristic::Required)
        .map_or(0, |last| last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_slots_consume_nothing() {
        let schema = Schema::from_slots(vec![
            SlotDescriptor::context(),
            SlotDescriptor::input(ElementType::F32, Access::Tensor, false),
            SlotDescriptor::input(ElementType::I64, Access::Scalar, true),
            SlotDescriptor::output(ElementType::F32, false),
        ])
        .unwrap();
        assert_eq!(schema.input_types(), &[ElementType::F32, ElementType::I64]);
        assert_eq!(schema.output_types(), &[ElementType::F32]);
        assert_eq!(schema.input_characteristic(1), Some(Characteristic::Optional));
        assert_eq!(schema.input_characteristic(2), None);
        assert_eq!(schema.mandatory_inputs(), 1);
        assert_eq!(schema.mandatory_outputs(), 1);
    }

    #[test]
    fn required_slot_after_optional_raises_the_minimum() {
        let schema = Schema::from_slots(vec![
            SlotDescriptor::input(ElementType::F32, Access::Tensor, true),
            SlotDescriptor::input(ElementType::F32, Access::Tensor, false),
        ])
        .unwrap();
        assert_eq!(schema.mandatory_inputs(), 2);
        assert!(schema.check_arity(1, 0).unwrap_err().is_schema_violation());
        assert!(schema.check_arity(2, 0).is_ok());
    }

    #[test]
    fn rejects_inconsistent_descriptors() {
        let string_span = SlotDescriptor::input(ElementType::String, Access::Span, false);
        assert!(Schema::from_slots(vec![string_span]).unwrap_err().is_schema_violation());

        let untyped = SlotDescriptor {
            kind: SlotKind::Input,
            element: None,
            access: Access::Tensor,
        };
        assert!(Schema::from_slots(vec![untyped]).unwrap_err().is_schema_violation());
    }
}
