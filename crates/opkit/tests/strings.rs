use std::sync::Arc;

use anyhow::Result;
use opkit::{CustomOp, ElementType, FnOp, OpResult, StringTensor, Tensor};
use opkit_ref_host::{HostContext, HostSession, HostTensor, NodeInfo};

fn upper(words: &StringTensor, out: &mut StringTensor) -> OpResult<()> {
    let upper: Vec<String> = words.iter().map(str::to_uppercase).collect();
    out.set_output(&upper, words.shape()?)
}

fn join(words: &StringTensor, separator: Option<&str>, out: &mut StringTensor) -> OpResult<()> {
    let joined = words.to_vec().join(separator.unwrap_or(" "));
    out.set_output(&[joined], &[])
}

fn lengths(words: &StringTensor, out: &mut Tensor<i64>) -> OpResult<()> {
    let shape = words.shape()?.to_vec();
    for (len, word) in out.allocate(&shape)?.iter_mut().zip(words.iter()) {
        *len = word.len() as i64;
    }
    Ok(())
}

fn open(op: impl CustomOp + 'static, node: NodeInfo) -> Result<HostSession> {
    let op: Arc<dyn CustomOp> = Arc::new(op);
    Ok(HostSession::create(op, node)?)
}

#[test]
fn strings_round_trip_through_the_host() -> Result<()> {
    let session = open(FnOp::new("Upper", upper)?, NodeInfo::new(1, 1))?;
    assert_eq!(session.op().input_type(0), Some(ElementType::String));

    let words = HostTensor::from_strings(vec![3], &["a", "bb", "ccc"])?;
    let run = session.run_with(HostContext::new(vec![words], 1))?;
    assert_eq!(run.requests.len(), 1);
    assert_eq!(run.requests[0].element, ElementType::String);

    let out = run.outputs[0].as_ref().expect("output 0 produced");
    assert_eq!(out.shape(), &[3]);
    assert_eq!(out.as_strings(), Some(vec!["A", "BB", "CCC"]));
    Ok(())
}

#[test]
fn empty_strings_survive() -> Result<()> {
    let session = open(FnOp::new("Upper", upper)?, NodeInfo::new(1, 1))?;
    let words = HostTensor::from_strings(vec![2, 2], &["", "x", "", "yz"])?;
    let outputs = session.run(vec![words])?;
    let out = outputs[0].as_ref().expect("output 0 produced");
    assert_eq!(out.shape(), &[2, 2]);
    assert_eq!(out.as_strings(), Some(vec!["", "X", "", "YZ"]));
    Ok(())
}

#[test]
fn optional_string_scalar() -> Result<()> {
    let words = HostTensor::from_strings(vec![2], &["left", "right"])?;

    let session = open(FnOp::new("Join", join)?, NodeInfo::new(1, 1))?;
    let outputs = session.run(vec![words.clone()])?;
    let out = outputs[0].as_ref().expect("output 0 produced");
    assert!(out.shape().is_empty());
    assert_eq!(out.as_strings(), Some(vec!["left right"]));

    let session = open(FnOp::new("Join", join)?, NodeInfo::new(2, 1))?;
    let separator = HostTensor::from_strings(Vec::new(), &["+"])?;
    let outputs = session.run(vec![words.clone(), separator])?;
    let out = outputs[0].as_ref().expect("output 0 produced");
    assert_eq!(out.as_strings(), Some(vec!["left+right"]));

    let two = HostTensor::from_strings(vec![2], &["+", "-"])?;
    let err = session.run(vec![words, two]).unwrap_err();
    assert!(err.is_shape_violation());
    Ok(())
}

#[test]
fn string_inputs_feed_numeric_outputs() -> Result<()> {
    let session = open(FnOp::new("Lengths", lengths)?, NodeInfo::new(1, 1))?;
    let words = HostTensor::from_strings(vec![3], &["a", "", "four"])?;
    let outputs = session.run(vec![words])?;
    let out = outputs[0].as_ref().expect("output 0 produced");
    assert_eq!(out.to_vec::<i64>()?, vec![1, 0, 4]);
    Ok(())
}

#[test]
fn numeric_input_for_a_string_slot_is_rejected() -> Result<()> {
    let session = open(FnOp::new("Lengths", lengths)?, NodeInfo::new(1, 1))?;
    let err = session
        .run(vec![HostTensor::from_vec(vec![1], vec![1u8])?])
        .unwrap_err();
    assert!(err.is_schema_violation());
    Ok(())
}
