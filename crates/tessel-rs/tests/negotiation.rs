mod common;

use std::sync::Arc;

use tessel_rs::backend::{is_operation_supported, SupportQuery};
use tessel_rs::layers::{
    ActivationDescriptor, ElementwiseUnaryDescriptor, LayerDescriptor, PoolingAlgorithm,
    Pooling2dDescriptor, UnaryOperation,
};
use tessel_rs::tensor::{DimSymbol, Dimension, Shape};
use tessel_rs::{
    BackendId, BindingId, DType, EngineConfig, EngineError, OperationKind, Session, TensorInfo,
    ValidationError,
};

use common::{f32_info, init_tracing, registry_with, StubBackend};

fn pooling() -> LayerDescriptor {
    LayerDescriptor::from(Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2))
}

#[test]
fn empty_priority_list_is_unsupported_with_a_reason() {
    init_tracing();
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "Any",
        &[OperationKind::Pooling2d],
    ))]);
    let descriptor = pooling();
    let inputs = [f32_info([1, 4, 4, 1])];
    let outputs = [f32_info([1, 2, 2, 1])];
    let outcome =
        is_operation_supported(&registry, &[], &SupportQuery::new(&descriptor, &inputs, &outputs))
            .unwrap();
    assert!(!outcome.is_supported());
    assert!(!outcome.reason().is_empty());
}

#[test]
fn first_supporting_backend_in_priority_order_wins() {
    let registry = registry_with(vec![
        Arc::new(StubBackend::new("Gpu", &[OperationKind::Activation])),
        Arc::new(StubBackend::new("Cpu", &[OperationKind::Pooling2d])),
        Arc::new(StubBackend::new("Cpu2", &[OperationKind::Pooling2d])),
    ]);
    let descriptor = pooling();
    let inputs = [f32_info([1, 4, 4, 1])];
    let outputs = [f32_info([1, 2, 2, 1])];
    let priority = [
        BackendId::new("Missing"),
        BackendId::new("Gpu"),
        BackendId::new("Cpu"),
        BackendId::new("Cpu2"),
    ];
    let outcome = is_operation_supported(
        &registry,
        &priority,
        &SupportQuery::new(&descriptor, &inputs, &outputs),
    )
    .unwrap();
    assert_eq!(outcome.selected(), Some(&BackendId::new("Cpu")));
    let rejected: Vec<_> = outcome
        .rejections()
        .iter()
        .map(|r| r.backend.as_str())
        .collect();
    assert_eq!(rejected, ["Missing", "Gpu"]);
    assert_eq!(outcome.rejections()[0].reason, "backend not registered");
}

#[test]
fn unsupported_kind_keeps_every_backend_reason() {
    let registry = registry_with(vec![
        Arc::new(StubBackend::new("A", &[OperationKind::Pooling2d])),
        Arc::new(StubBackend::new("B", &[OperationKind::Pooling2d]).silent()),
    ]);
    let descriptor = LayerDescriptor::from(ElementwiseUnaryDescriptor::new(UnaryOperation::Exp));
    let infos = [f32_info([1, 2, 2, 1])];
    let outcome = is_operation_supported(
        &registry,
        &[BackendId::new("A"), BackendId::new("B")],
        &SupportQuery::new(&descriptor, &infos, &infos),
    )
    .unwrap();
    assert!(!outcome.is_supported());
    assert_eq!(outcome.rejections().len(), 2);
    assert!(outcome.rejections().iter().all(|r| !r.reason.is_empty()));

    match outcome.into_result() {
        Err(EngineError::Unsupported { operation, reasons }) => {
            assert_eq!(operation, OperationKind::ElementwiseUnary);
            assert_eq!(reasons.len(), 2);
        }
        other => panic!("expected Unsupported, got {other:?}"),
    }
}

#[test]
fn dynamic_shapes_fail_before_any_backend_is_asked() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Activation],
    ))]);
    let shape = Shape::new(vec![
        Dimension::Dynamic(DimSymbol::new("batch")),
        Dimension::Static(4),
    ]);
    let infos = [TensorInfo::new(shape, DType::Float32).unwrap()];
    let descriptor = LayerDescriptor::from(ActivationDescriptor::relu());
    let err = is_operation_supported(
        &registry,
        &[BackendId::new("A")],
        &SupportQuery::new(&descriptor, &infos, &infos),
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::DynamicShape { .. }));
}

#[test]
fn arity_mismatch_is_a_validation_error() {
    let registry = registry_with(vec![]);
    let descriptor = LayerDescriptor::from(ActivationDescriptor::relu());
    let inputs = [f32_info([1, 2, 2, 1]), f32_info([1, 2, 2, 1])];
    let outputs = [f32_info([1, 2, 2, 1])];
    let err = is_operation_supported(
        &registry,
        &[],
        &SupportQuery::new(&descriptor, &inputs, &outputs),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ValidationError::ArityMismatch {
            operation: OperationKind::Activation,
            expected_inputs: 1,
            actual_inputs: 2,
            expected_outputs: 1,
            actual_outputs: 1,
        }
    );
}

#[test]
fn probing_support_never_changes_the_network() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Pooling2d],
    ))]);
    let mut session = Session::new(registry, EngineConfig::new(["A"]));
    session
        .add_input(BindingId(0), f32_info([1, 4, 4, 1]), "input")
        .unwrap();
    let before = session.network().layer_count();

    let descriptor = pooling();
    let inputs = [f32_info([1, 4, 4, 1])];
    let outputs = [f32_info([1, 2, 2, 1])];
    assert!(session.is_supported(&descriptor, &inputs, &outputs).unwrap().is_supported());
    let unsupported = LayerDescriptor::from(ActivationDescriptor::relu());
    assert!(!session
        .is_supported(&unsupported, &inputs, &inputs)
        .unwrap()
        .is_supported());

    assert_eq!(session.network().layer_count(), before);
}

#[test]
fn unsupported_operation_is_not_added() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Pooling2d],
    ))]);
    let mut session = Session::new(registry, EngineConfig::new(["A"]));
    let input = session
        .add_input(BindingId(0), f32_info([1, 4, 4, 1]), "input")
        .unwrap();
    let err = session
        .add_activation(ActivationDescriptor::relu(), input.output(0), "relu")
        .unwrap_err();
    assert!(matches!(err, EngineError::Unsupported { .. }));
    assert!(err.to_string().contains("A:"));
    assert_eq!(session.network().layer_count(), 1);
}
