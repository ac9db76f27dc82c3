use approx::assert_abs_diff_eq;
use tessel_rs::quantization::{
    create_quantized_const, dequantize, quantize, quantize_constant, QAsymmS8Scheme,
    QAsymmU8Scheme, QSymmS8Scheme, QuantizationError, QuantizationScheme,
};
use tessel_rs::tensor::ConstTensor;
use tessel_rs::DType;

const RANGES: [(f64, f64); 6] = [
    (-1.0, 1.0),
    (0.0, 6.0),
    (-3.5, -0.25),
    (0.1, 100.0),
    (-1000.0, 3.0),
    (2.0, 2.0),
];

fn schemes() -> Vec<Box<dyn QuantizationScheme>> {
    vec![
        Box::new(QAsymmU8Scheme),
        Box::new(QAsymmS8Scheme),
        Box::new(QSymmS8Scheme),
    ]
}

#[test]
fn scale_is_positive_and_offset_in_range() {
    for scheme in schemes() {
        let (lo, hi) = scheme.dtype().quantized_range().unwrap();
        for (min, max) in RANGES {
            let (scale, offset) = scheme.compute_scheme(min, max);
            assert!(scale > 0.0, "{:?} gave scale {scale}", (min, max));
            assert!((lo..=hi).contains(&i64::from(offset)));
        }
    }
}

#[test]
fn round_trip_error_is_within_one_step() {
    let (scale, offset) = QAsymmU8Scheme.compute_scheme(-2.0, 6.0);
    for i in 0..=80 {
        let value = -2.0 + i as f32 * 0.1;
        let restored = dequantize(quantize::<u8>(value, scale, offset), scale, offset);
        assert_abs_diff_eq!(restored, value, epsilon = scale);
    }

    let (scale, offset) = QAsymmS8Scheme.compute_scheme(-2.0, 6.0);
    for i in 0..=80 {
        let value = -2.0 + i as f32 * 0.1;
        let restored = dequantize(quantize::<i8>(value, scale, offset), scale, offset);
        assert_abs_diff_eq!(restored, value, epsilon = scale);
    }
}

#[test]
fn degenerate_range_still_has_positive_scale() {
    for scheme in schemes() {
        let (scale, _) = scheme.compute_scheme(0.0, 0.0);
        assert!(scale > 0.0);
    }
}

#[test]
fn zero_is_exactly_representable() {
    for (min, max) in RANGES {
        let (scale, offset) = QAsymmU8Scheme.compute_scheme(min, max);
        let zero = dequantize(quantize::<u8>(0.0, scale, offset), scale, offset);
        assert_eq!(zero, 0.0);
    }
}

#[test]
fn symmetric_scheme_has_zero_offset() {
    for (min, max) in RANGES {
        assert_eq!(QSymmS8Scheme.compute_scheme(min, max).1, 0);
    }
}

#[test]
fn quantize_constant_is_deterministic() {
    let source: Vec<f32> = (0..257).map(|i| (i as f32 * 0.37).sin() * 4.0).collect();
    let first = quantize_constant(&QAsymmS8Scheme, &source).unwrap();
    let second = quantize_constant(&QAsymmS8Scheme, &source).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.dtype, DType::QAsymmS8);
    assert_eq!(first.bytes.len(), source.len());
}

#[test]
fn quantize_constant_rejects_empty_and_non_finite_input() {
    let empty: [f32; 0] = [];
    assert_eq!(
        quantize_constant(&QAsymmU8Scheme, &empty),
        Err(QuantizationError::EmptyInput)
    );
    assert!(matches!(
        quantize_constant(&QAsymmU8Scheme, &[1.0, f32::INFINITY]),
        Err(QuantizationError::NonFiniteRange { .. })
    ));
}

#[test]
fn half_precision_sources_are_accepted() {
    let values = [half::f16::from_f32(-1.0), half::f16::from_f32(3.0)];
    let quantized = quantize_constant(&QAsymmU8Scheme, &values).unwrap();
    assert_eq!(quantized.bytes[0], 0);
    assert_eq!(quantized.bytes[1], 255);
}

#[test]
fn quantized_const_keeps_shape_and_carries_parameters() {
    let weights = ConstTensor::from_f32([2, 1, 1, 2], &[-0.5, 0.25, 1.0, -1.0]).unwrap();
    let quantized = create_quantized_const(&weights, &QSymmS8Scheme).unwrap();
    assert_eq!(quantized.info().shape(), weights.info().shape());
    assert_eq!(quantized.info().dtype(), DType::QSymmS8);
    let q = quantized.info().quantization().unwrap();
    assert_eq!(q.offset(), 0);
    assert_eq!(quantized.bytes()[3] as i8, -127);
}
