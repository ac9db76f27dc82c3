use tessel_rs::layers::{LayerDescriptor, PoolingAlgorithm, Pooling2dDescriptor};
use tessel_rs::padding::{
    calc_padding, spatial_output_size, OutputShapeRounding, Padding2d, PaddingError, PaddingMode,
};
use tessel_rs::{DType, TensorInfo};

#[test]
fn valid_padding_is_zero() {
    for (input, filter, stride, dilation) in [(10, 3, 1, 1), (7, 7, 2, 3), (1, 1, 1, 1)] {
        assert_eq!(
            calc_padding(input, filter, stride, dilation, PaddingMode::Valid),
            Ok((0, 0))
        );
    }
}

#[test]
fn same_padding_splits_evenly_when_possible() {
    assert_eq!(calc_padding(10, 3, 1, 1, PaddingMode::Same), Ok((1, 1)));
    assert_eq!(calc_padding(10, 2, 2, 1, PaddingMode::Same), Ok((0, 0)));
    assert_eq!(calc_padding(11, 3, 2, 1, PaddingMode::Same), Ok((1, 1)));
}

#[test]
fn same_padding_never_goes_negative() {
    // filter smaller than stride: the formula would be negative
    assert_eq!(calc_padding(9, 1, 3, 1, PaddingMode::Same), Ok((0, 0)));
}

#[test]
fn output_size_rejects_oversized_window() {
    assert_eq!(
        spatial_output_size(2, 3, 1, 1, 0, 0, OutputShapeRounding::Floor),
        Err(PaddingError::WindowExceedsInput {
            window: 3,
            padded: 2
        })
    );
}

#[test]
fn pooling_2x2_stride_2_same_halves_spatial_extent() {
    let input = TensorInfo::new([1, 10, 10, 3], DType::Float32).unwrap();
    for mode in [PaddingMode::Same, PaddingMode::Valid] {
        let descriptor = LayerDescriptor::from(
            Pooling2dDescriptor::new(PoolingAlgorithm::Average, 2, 2)
                .with_padding(Padding2d::Implicit(mode)),
        );
        let outputs = descriptor.infer_output_infos(&[input.clone()]).unwrap();
        assert_eq!(outputs[0].static_dims(), Some(vec![1, 5, 5, 3]));
        assert_eq!(outputs[0].dtype(), DType::Float32);
    }
}

#[test]
fn ceiling_rounding_adds_a_partial_window() {
    let input = TensorInfo::new([1, 7, 7, 1], DType::Float32).unwrap();
    let floor = LayerDescriptor::from(Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2));
    let ceiling = LayerDescriptor::from(
        Pooling2dDescriptor::new(PoolingAlgorithm::Max, 2, 2)
            .with_rounding(OutputShapeRounding::Ceiling),
    );
    let floor = floor.infer_output_infos(&[input.clone()]).unwrap();
    let ceiling = ceiling.infer_output_infos(&[input]).unwrap();
    assert_eq!(floor[0].static_dims(), Some(vec![1, 3, 3, 1]));
    assert_eq!(ceiling[0].static_dims(), Some(vec![1, 4, 4, 1]));
}
