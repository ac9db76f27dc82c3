mod common;

use std::sync::Arc;

use tessel_rs::fused_activation::apply_fused_activation;
use tessel_rs::layers::{
    ActivationFunction, ElementwiseUnaryDescriptor, PoolingAlgorithm, Pooling2dDescriptor,
    UnaryOperation,
};
use tessel_rs::{
    BackendId, BindingId, EngineConfig, EngineError, FusedActivation, FusionOutcome, Network,
    OperationKind, Session, ValidationError,
};

use common::{f32_info, init_tracing, registry_with, StubBackend};

#[test]
fn none_requests_nothing() {
    let registry = registry_with(vec![]);
    let mut net = Network::new();
    let pool = net
        .add_pooling2d_layer(Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2), "pool")
        .unwrap();
    let outcome =
        apply_fused_activation(&mut net, &registry, &[], pool, 0, FusedActivation::None).unwrap();
    assert_eq!(outcome, FusionOutcome::NotRequested);
    assert_eq!(net.layer_count(), 1);
}

#[test]
fn activation_is_spliced_between_producer_and_consumers() {
    init_tracing();
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Pooling2d, OperationKind::Activation],
    ))]);
    let priority = [BackendId::new("A")];

    let mut net = Network::new();
    let input = net.add_input_layer(BindingId(0), "in").unwrap();
    net.set_tensor_info(input.output(0), f32_info([1, 4, 4, 1])).unwrap();
    let pool = net
        .add_pooling2d_layer(Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2), "pool")
        .unwrap();
    net.bind(pool, BackendId::new("A")).unwrap();
    net.set_tensor_info(pool.output(0), f32_info([1, 2, 2, 1])).unwrap();
    net.connect(input.output(0), pool.input(0)).unwrap();
    let out = net.add_output_layer(BindingId(0), "out").unwrap();
    net.connect(pool.output(0), out.input(0)).unwrap();

    let outcome =
        apply_fused_activation(&mut net, &registry, &priority, pool, 0, FusedActivation::Relu6)
            .unwrap();
    let FusionOutcome::Inserted(activation) = outcome else {
        panic!("expected an inserted layer, got {outcome:?}");
    };

    assert_eq!(net.source_of(out.input(0)).unwrap(), Some(activation.output(0)));
    assert_eq!(net.source_of(activation.input(0)).unwrap(), Some(pool.output(0)));
    let layer = net.layer(activation).unwrap();
    assert_eq!(layer.backend(), Some(&BackendId::new("A")));
    assert_eq!(layer.descriptor().kind(), OperationKind::Activation);
    assert!(net.layer(pool).unwrap().fused_activation().is_none());
    assert_eq!(net.tensor_info(activation.output(0)), Some(&f32_info([1, 2, 2, 1])));
}

#[test]
fn unsupported_activation_leaves_the_network_unchanged() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Pooling2d],
    ))]);
    let priority = [BackendId::new("A")];

    let mut net = Network::new();
    let pool = net
        .add_pooling2d_layer(Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2), "pool")
        .unwrap();
    net.bind(pool, BackendId::new("A")).unwrap();
    net.set_tensor_info(pool.output(0), f32_info([1, 2, 2, 1])).unwrap();
    let before = net.layer_count();

    let err =
        apply_fused_activation(&mut net, &registry, &priority, pool, 0, FusedActivation::Sigmoid)
            .unwrap_err();
    assert!(matches!(err, EngineError::Construction { source: Some(_), .. }));
    assert_eq!(net.layer_count(), before);
    assert!(net.layer(pool).unwrap().outputs()[0].consumers().is_empty());
}

#[test]
fn session_rolls_back_the_producer_when_the_activation_fails() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::Pooling2d],
    ))]);
    let mut session = Session::new(registry, EngineConfig::new(["A"]));
    let input = session
        .add_input(BindingId(0), f32_info([1, 4, 4, 1]), "in")
        .unwrap();

    let err = session
        .add_pooling2d(
            Pooling2dDescriptor::new(PoolingAlgorithm::Average, 2, 2),
            input.output(0),
            FusedActivation::Tanh,
            "pool",
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Construction { .. }));
    assert_eq!(session.network().layer_count(), 1);
    assert!(session.network().layer(input).unwrap().outputs()[0]
        .consumers()
        .is_empty());
}

#[test]
fn fused_kinds_map_to_activation_descriptors() {
    let relu6 = FusedActivation::Relu6.descriptor().unwrap();
    assert_eq!(relu6.function, ActivationFunction::BoundedReLu);
    assert_eq!((relu6.a, relu6.b), (6.0, 0.0));
    assert_eq!(
        FusedActivation::Tanh.descriptor().unwrap().function,
        ActivationFunction::TanH
    );
    assert!(FusedActivation::None.descriptor().is_none());
}

#[test]
fn operations_without_fusion_support_reject_a_fused_activation() {
    let registry = registry_with(vec![Arc::new(StubBackend::new(
        "A",
        &[OperationKind::ElementwiseUnary, OperationKind::Activation],
    ))]);
    let mut session = Session::new(registry, EngineConfig::new(["A"]));
    let input = session
        .add_input(BindingId(0), f32_info([1, 4, 4, 1]), "in")
        .unwrap();
    let err = session
        .add_operation(
            ElementwiseUnaryDescriptor::new(UnaryOperation::Abs),
            &[input.output(0)],
            FusedActivation::Relu,
            "abs",
        )
        .unwrap_err();
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::InvalidDescriptor { .. })
    ));
}
