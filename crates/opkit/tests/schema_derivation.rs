use anyhow::Result;
use half::f16;
use opkit::{
    Characteristic, CustomOp, ElementType, ExecutionContext, FnOp, OpResult, Span, StringTensor,
    Tensor,
};

#[test]
fn context_handles_are_not_slots() -> Result<()> {
    fn body(
        _ctx: &dyn ExecutionContext,
        _x: &Tensor<f32>,
        _y: &mut Tensor<i64>,
    ) -> OpResult<()> {
        Ok(())
    }
    let op = FnOp::new("Body", body)?;
    assert_eq!(op.input_type_count(), 1);
    assert_eq!(op.output_type_count(), 1);
    assert_eq!(op.input_type(0), Some(ElementType::F32));
    assert_eq!(op.output_type(0), Some(ElementType::I64));
    assert_eq!(op.schema().slots().len(), 3);
    Ok(())
}

#[test]
fn interleaved_parameters_keep_declaration_order() -> Result<()> {
    fn body(
        _a: &Tensor<u8>,
        _out0: &mut Tensor<f16>,
        _b: Span<i32>,
        _ctx: &dyn ExecutionContext,
        _c: f64,
        _out1: &mut StringTensor,
        _d: &str,
        _e: Option<bool>,
    ) {
    }
    let op = FnOp::new("Interleaved", body)?;
    assert_eq!(
        op.schema().input_types(),
        &[
            ElementType::U8,
            ElementType::I32,
            ElementType::F64,
            ElementType::String,
            ElementType::Bool,
        ]
    );
    assert_eq!(
        op.schema().output_types(),
        &[ElementType::F16, ElementType::String]
    );
    assert_eq!(op.input_characteristic(4), Some(Characteristic::Optional));
    assert_eq!(op.input_characteristic(3), Some(Characteristic::Required));
    assert_eq!(op.schema().mandatory_inputs(), 4);
    Ok(())
}

#[test]
fn optional_parameters_report_optional_characteristics() -> Result<()> {
    fn body(
        _x: &Tensor<f32>,
        _bias: Option<&Tensor<f32>>,
        _scale: Option<Span<f32>>,
        _label: Option<&StringTensor>,
        _y: &mut Tensor<f32>,
        _mask: Option<&mut Tensor<bool>>,
    ) {
    }
    let op = FnOp::new("Optional", body)?;
    let inputs: Vec<_> = (0..op.input_type_count())
        .map(|i| op.input_characteristic(i))
        .collect();
    assert_eq!(
        inputs,
        vec![
            Some(Characteristic::Required),
            Some(Characteristic::Optional),
            Some(Characteristic::Optional),
            Some(Characteristic::Optional),
        ]
    );
    assert_eq!(op.output_characteristic(0), Some(Characteristic::Required));
    assert_eq!(op.output_characteristic(1), Some(Characteristic::Optional));
    assert_eq!(op.output_characteristic(2), None);
    assert_eq!(op.schema().mandatory_inputs(), 1);
    assert_eq!(op.schema().mandatory_outputs(), 1);
    Ok(())
}

#[test]
fn twelve_parameters_are_supported() -> Result<()> {
    #[allow(clippy::too_many_arguments)]
    fn body(
        _p0: &Tensor<f32>,
        _p1: &Tensor<f32>,
        _p2: &Tensor<f32>,
        _p3: &Tensor<f32>,
        _p4: &Tensor<f32>,
        _p5: &Tensor<f32>,
        _p6: &Tensor<f32>,
        _p7: &Tensor<f32>,
        _p8: &Tensor<f32>,
        _p9: &Tensor<f32>,
        _p10: &Tensor<f32>,
        _p11: &mut Tensor<f32>,
    ) {
    }
    let op = FnOp::new("Wide", body)?;
    assert_eq!(op.input_type_count(), 11);
    assert_eq!(op.output_type_count(), 1);
    Ok(())
}

#[test]
fn fixed_engine_queries() -> Result<()> {
    fn body(_x: &Tensor<i8>) {}
    let op = FnOp::new("Fixed", body)?;
    assert_eq!(op.input_memory_type(0), opkit::MemoryType::Default);
    assert_eq!(op.variadic_input_min_arity(), 0);
    assert_eq!(op.variadic_output_min_arity(), 0);
    assert!(!op.variadic_input_homogeneity());
    assert!(!op.variadic_output_homogeneity());
    assert_eq!(op.output_type_count(), 0);
    assert_eq!(op.output_type(0), None);
    Ok(())
}
