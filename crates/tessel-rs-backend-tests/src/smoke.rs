use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use approx::assert_abs_diff_eq;
use tessel_rs::layers::{
    Convolution2dDescriptor, ElementwiseUnaryDescriptor, L2NormalizationDescriptor,
    PoolingAlgorithm, Pooling2dDescriptor, UnaryOperation,
};
use tessel_rs::padding::{Padding2d, PaddingMode};
use tessel_rs::tensor::{codec, ConstTensor};
use tessel_rs::{
    Backend, BackendRegistry, BindingId, DType, EngineConfig, ExecutionMode, FusedActivation,
    FusionOutcome, LoadedNetwork, QuantizationInfo, Session, TensorInfo,
};

const INPUT: BindingId = BindingId(0);
const OUTPUT: BindingId = BindingId(0);

fn session_for<B: Backend + 'static>(backend: &Arc<B>, mode: ExecutionMode) -> Session {
    let mut registry = BackendRegistry::default();
    let id = backend.id().clone();
    registry.register(Arc::clone(backend) as Arc<dyn Backend>);
    Session::new(
        Arc::new(registry),
        EngineConfig::new([id]).with_execution_mode(mode),
    )
}

fn pooling_network<B: Backend + 'static>(
    backend: &Arc<B>,
    input: TensorInfo,
    descriptor: Pooling2dDescriptor,
) -> Result<LoadedNetwork> {
    let mut session = session_for(backend, ExecutionMode::Sync);
    let input = session.add_input(INPUT, input, "input")?;
    let pool = session.add_pooling2d(descriptor, input.output(0), FusedActivation::None, "pool")?;
    session.add_output(OUTPUT, pool.output(), "output")?;
    Ok(session.load()?)
}

/// Convolution followed by normalization and an elementwise op: three workloads, two
/// intermediate tensors.
fn conv_chain<B: Backend + 'static>(backend: &Arc<B>, mode: ExecutionMode) -> Result<LoadedNetwork> {
    let weights: Vec<f32> = (0..3 * 3 * 3 * 2)
        .map(|i| ((i * 7) % 11) as f32 * 0.1 - 0.5)
        .collect();
    let weights = ConstTensor::from_f32([3, 3, 3, 2], &weights)?;
    let bias = ConstTensor::from_f32([3], &[0.1, -0.2, 0.3])?;
    let conv = Convolution2dDescriptor::new(weights, Some(bias))
        .with_padding(Padding2d::Implicit(PaddingMode::Same));

    let mut session = session_for(backend, mode);
    let input = session.add_input(INPUT, TensorInfo::new([1, 5, 5, 2], DType::Float32)?, "input")?;
    let conv = session.add_convolution2d(conv, input.output(0), FusedActivation::None, "conv")?;
    let norm = session.add_l2_normalization(
        L2NormalizationDescriptor::default(),
        conv.output(),
        "norm",
    )?;
    let abs = session.add_elementwise_unary(
        ElementwiseUnaryDescriptor::new(UnaryOperation::Abs),
        norm.output(),
        "abs",
    )?;
    session.add_output(OUTPUT, abs.output(), "output")?;
    Ok(session.load()?)
}

fn chain_input(seed: usize) -> Vec<f32> {
    (0..50).map(|i| ((i + seed * 13) % 17) as f32 * 0.25 - 2.0).collect()
}

fn run_async(network: &LoadedNetwork, values: &[f32]) -> Result<Vec<u8>> {
    let input = codec::from_f32_slice(network.input_info(INPUT)?, values)?;
    let len = network
        .output_info(OUTPUT)?
        .num_bytes()
        .ok_or_else(|| anyhow!("output shape is not static"))?;
    let mut output = vec![0u8; len];
    let mut memory = network.create_working_memory();
    network.execute_async(
        &mut memory,
        &[(INPUT, input.as_slice())],
        &mut [(OUTPUT, output.as_mut_slice())],
    )?;
    Ok(output)
}

pub fn pooling_output_shape<B: Backend + 'static>(backend: &Arc<B>) {
    let input = TensorInfo::new([1, 10, 10, 3], DType::Float32).unwrap();
    let mut network = pooling_network(
        backend,
        input,
        Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2),
    )
    .unwrap();
    assert_eq!(
        network.output_info(OUTPUT).unwrap().static_dims(),
        Some(vec![1, 5, 5, 3])
    );
    network.set_input_f32(INPUT, &[1.0; 300]).unwrap();
    network.execute().unwrap();
    assert_eq!(network.read_output_f32(OUTPUT).unwrap(), vec![1.0; 75]);
}

pub fn max_pooling_matches_expected<B: Backend + 'static>(backend: &Arc<B>) {
    let input = TensorInfo::new([1, 4, 4, 1], DType::Float32).unwrap();
    let mut network = pooling_network(
        backend,
        input,
        Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2),
    )
    .unwrap();
    let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
    network.set_input_f32(INPUT, &values).unwrap();
    network.execute().unwrap();
    assert_eq!(
        network.read_output_f32(OUTPUT).unwrap(),
        vec![5.0, 7.0, 13.0, 15.0]
    );
}

pub fn average_pooling_same_padding_excludes_padding<B: Backend + 'static>(backend: &Arc<B>) {
    let input = TensorInfo::new([1, 3, 3, 1], DType::Float32).unwrap();
    let descriptor = Pooling2dDescriptor::new(PoolingAlgorithm::Average, 2, 1)
        .with_padding(Padding2d::Implicit(PaddingMode::Same));
    let mut network = pooling_network(backend, input, descriptor).unwrap();
    let values: Vec<f32> = (1..=9).map(|v| v as f32).collect();
    network.set_input_f32(INPUT, &values).unwrap();
    network.execute().unwrap();

    let output = network.read_output_f32(OUTPUT).unwrap();
    let expected = [3.0, 4.0, 4.5, 6.0, 7.0, 7.5, 7.5, 8.5, 9.0];
    assert_eq!(output.len(), expected.len());
    for (actual, expected) in output.iter().zip(expected) {
        assert_abs_diff_eq!(*actual, expected, epsilon = 1e-6);
    }
}

pub fn quantized_pooling_stays_within_one_step<B: Backend + 'static>(backend: &Arc<B>) {
    let quant = QuantizationInfo::new(0.5, 10).unwrap();
    let input = TensorInfo::quantized([1, 2, 2, 1], DType::QAsymmU8, quant).unwrap();
    let mut network = pooling_network(
        backend,
        input,
        Pooling2dDescriptor::new(PoolingAlgorithm::Average, 2, 2),
    )
    .unwrap();
    network.set_input_f32(INPUT, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    network.execute().unwrap();
    let output = network.read_output_f32(OUTPUT).unwrap();
    assert_eq!(output.len(), 1);
    assert_abs_diff_eq!(output[0], 2.5, epsilon = 0.5);
}

pub fn fused_relu_clamps_negative_outputs<B: Backend + 'static>(backend: &Arc<B>) {
    let weights = ConstTensor::from_f32([1, 1, 1, 1], &[-1.0]).unwrap();
    let mut session = session_for(backend, ExecutionMode::Sync);
    let input = session
        .add_input(
            INPUT,
            TensorInfo::new([1, 2, 2, 1], DType::Float32).unwrap(),
            "input",
        )
        .unwrap();
    let conv = session
        .add_convolution2d(
            Convolution2dDescriptor::new(weights, None),
            input.output(0),
            FusedActivation::Relu,
            "conv",
        )
        .unwrap();
    assert!(matches!(
        conv.fusion,
        FusionOutcome::Fused | FusionOutcome::Inserted(_)
    ));
    session.add_output(OUTPUT, conv.output(), "output").unwrap();

    let mut network = session.load().unwrap();
    network.set_input_f32(INPUT, &[1.0, -2.0, 3.0, -4.0]).unwrap();
    network.execute().unwrap();
    assert_eq!(
        network.read_output_f32(OUTPUT).unwrap(),
        vec![0.0, 2.0, 0.0, 4.0]
    );
}

pub fn sync_and_async_agree<B: Backend + 'static>(backend: &Arc<B>) {
    let values = chain_input(0);

    let mut sync = conv_chain(backend, ExecutionMode::Sync).unwrap();
    sync.set_input_f32(INPUT, &values).unwrap();
    sync.execute().unwrap();
    let expected = sync.read_output(OUTPUT).unwrap();

    let network = conv_chain(backend, ExecutionMode::Async).unwrap();
    assert_eq!(network.workload_count(), 3);
    assert_eq!(run_async(&network, &values).unwrap(), expected);
}

pub fn concurrent_async_matches_sequential<B: Backend + 'static>(backend: &Arc<B>) {
    let network = conv_chain(backend, ExecutionMode::Async).unwrap();
    let inputs: Vec<Vec<f32>> = (0..4).map(chain_input).collect();
    let sequential: Vec<Vec<u8>> = inputs
        .iter()
        .map(|values| run_async(&network, values).unwrap())
        .collect();

    let concurrent: Vec<Vec<u8>> = thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|values| {
                let network = &network;
                scope.spawn(move || {
                    (0..8)
                        .map(|_| run_async(network, values).unwrap())
                        .last()
                        .unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(concurrent, sequential);
    assert_ne!(sequential[0], sequential[1]);
}
