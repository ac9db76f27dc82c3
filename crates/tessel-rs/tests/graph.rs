use tessel_rs::layers::{
    ActivationDescriptor, Convolution2dDescriptor, ElementwiseUnaryDescriptor,
    L2NormalizationDescriptor, PoolingAlgorithm, Pooling2dDescriptor, UnaryOperation,
};
use tessel_rs::tensor::ConstTensor;
use tessel_rs::{
    BackendId, BindingId, DType, DataLayout, LayerDescriptor, LayerId, Network, OperationKind,
    TensorInfo, ValidationError,
};

fn info() -> TensorInfo {
    TensorInfo::new([1, 2, 2, 1], DType::Float32).unwrap()
}

fn described_unary(net: &mut Network, name: &str) -> LayerId {
    let id = net
        .add_elementwise_unary_layer(ElementwiseUnaryDescriptor::new(UnaryOperation::Neg), name)
        .unwrap();
    net.set_tensor_info(id.output(0), info()).unwrap();
    id
}

#[test]
fn connecting_an_undescribed_slot_fails() {
    let mut net = Network::new();
    let input = net.add_input_layer(BindingId(0), "in").unwrap();
    let relu = net
        .add_activation_layer(ActivationDescriptor::relu(), "relu")
        .unwrap();
    let err = net.connect(input.output(0), relu.input(0)).unwrap_err();
    assert_eq!(err, ValidationError::TensorInfoNotSet(input.output(0)));
    assert_eq!(net.source_of(relu.input(0)).unwrap(), None);
}

#[test]
fn cycles_are_rejected() {
    let mut net = Network::new();
    let a = described_unary(&mut net, "a");
    let b = described_unary(&mut net, "b");
    net.connect(a.output(0), b.input(0)).unwrap();
    let err = net.connect(b.output(0), a.input(0)).unwrap_err();
    assert!(matches!(err, ValidationError::Cycle { .. }));

    let c = described_unary(&mut net, "c");
    assert!(matches!(
        net.connect(c.output(0), c.input(0)),
        Err(ValidationError::Cycle { .. })
    ));
}

#[test]
fn an_input_slot_accepts_one_source() {
    let mut net = Network::new();
    let a = described_unary(&mut net, "a");
    let b = described_unary(&mut net, "b");
    let c = described_unary(&mut net, "c");
    net.connect(a.output(0), c.input(0)).unwrap();
    assert_eq!(
        net.connect(b.output(0), c.input(0)),
        Err(ValidationError::AlreadyConnected {
            input: c.input(0),
            producer: a.output(0),
        })
    );
    assert_eq!(net.disconnect(c.input(0)), Ok(a.output(0)));
    net.connect(b.output(0), c.input(0)).unwrap();
}

#[test]
fn descriptors_may_change_until_finalized() {
    let mut net = Network::new();
    let input = net.add_input_layer(BindingId(0), "in").unwrap();
    net.set_tensor_info(input.output(0), info()).unwrap();
    net.set_tensor_info(
        input.output(0),
        TensorInfo::new([1, 3, 3, 1], DType::Float32).unwrap(),
    )
    .unwrap();
    let output = net.add_output_layer(BindingId(0), "out").unwrap();
    net.connect(input.output(0), output.input(0)).unwrap();

    net.finalize().unwrap();
    assert!(net.is_finalized());
    assert_eq!(
        net.set_tensor_info(input.output(0), info()),
        Err(ValidationError::Finalized)
    );
    assert_eq!(
        net.add_input_layer(BindingId(1), "late"),
        Err(ValidationError::Finalized)
    );
}

#[test]
fn finalize_requires_every_input_connected() {
    let mut net = Network::new();
    let a = described_unary(&mut net, "a");
    assert_eq!(net.finalize(), Err(ValidationError::Unconnected(a.input(0))));
    assert!(!net.is_finalized());
}

#[test]
fn bindings_are_unique_per_direction() {
    let mut net = Network::new();
    net.add_input_layer(BindingId(0), "in").unwrap();
    net.add_output_layer(BindingId(0), "out").unwrap();
    assert_eq!(
        net.add_input_layer(BindingId(0), "again"),
        Err(ValidationError::DuplicateBinding(BindingId(0)))
    );
    assert_eq!(net.input_layers().len(), 1);
    assert_eq!(net.output_layers().len(), 1);
}

#[test]
fn a_layer_is_bound_once() {
    let mut net = Network::new();
    let a = described_unary(&mut net, "a");
    net.bind(a, BackendId::new("CpuRef")).unwrap();
    assert!(matches!(
        net.bind(a, BackendId::new("GpuAcc")),
        Err(ValidationError::AlreadyBound { .. })
    ));
    assert_eq!(net.layer(a).unwrap().backend(), Some(&BackendId::new("CpuRef")));
}

/// Builds `input -> layer -> output` with `declared` as the layer's output descriptor.
fn single_layer(
    input: TensorInfo,
    layer: impl Into<LayerDescriptor>,
    declared: TensorInfo,
) -> (Network, LayerId) {
    let mut net = Network::new();
    let source = net.add_input_layer(BindingId(0), "in").unwrap();
    net.set_tensor_info(source.output(0), input).unwrap();
    let id = net.add_layer(layer, "layer").unwrap();
    net.set_tensor_info(id.output(0), declared).unwrap();
    net.connect(source.output(0), id.input(0)).unwrap();
    let sink = net.add_output_layer(BindingId(0), "out").unwrap();
    net.connect(id.output(0), sink.input(0)).unwrap();
    (net, id)
}

#[test]
fn finalize_rejects_outputs_the_layer_cannot_produce() {
    let input = TensorInfo::new([1, 2, 2, 2], DType::Float32).unwrap();
    let (mut net, norm) = single_layer(
        input.clone(),
        L2NormalizationDescriptor::default(),
        TensorInfo::new([1, 1, 1, 1], DType::Float32).unwrap(),
    );
    assert!(matches!(
        net.finalize(),
        Err(ValidationError::ShapeInference {
            operation: OperationKind::L2Normalization,
            ..
        })
    ));
    assert!(!net.is_finalized());

    net.set_tensor_info(norm.output(0), input).unwrap();
    net.finalize().unwrap();
}

#[test]
fn finalize_rejects_convolution_channel_mismatch() {
    let weights = ConstTensor::from_f32([1, 1, 1, 1], &[2.0]).unwrap();
    let (mut net, _) = single_layer(
        TensorInfo::new([1, 3, 3, 1], DType::Float32).unwrap(),
        Convolution2dDescriptor::new(weights, None),
        TensorInfo::new([1, 3, 3, 4], DType::Float32).unwrap(),
    );
    assert!(matches!(
        net.finalize(),
        Err(ValidationError::ShapeInference {
            operation: OperationKind::Convolution2d,
            ..
        })
    ));
}

#[test]
fn finalize_rejects_output_in_another_layout() {
    let (mut net, _) = single_layer(
        TensorInfo::new([1, 4, 4, 3], DType::Float32).unwrap(),
        Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2),
        TensorInfo::new([1, 2, 2, 3], DType::Float32)
            .unwrap()
            .with_layout(DataLayout::Nchw),
    );
    assert!(matches!(
        net.finalize(),
        Err(ValidationError::ShapeInference { .. })
    ));
}
