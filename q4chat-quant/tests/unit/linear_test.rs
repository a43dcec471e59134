use super::*;
use crate::error::CodecError;

/// Integer weights with group max 7 quantize exactly (scale = 1), so the
/// forward pass must match the dense affine result to float precision.
#[test]
fn test_forward_matches_dense_affine() {
    let params = Q4Params::new(4).unwrap();
    let weights = vec![
        1.0, -2.0, 3.0, 7.0, // row 0
        0.0, 5.0, -7.0, 4.0, // row 1
    ];
    let bias = vec![0.5, -1.5];
    let layer = QuantizedLinear::from_dense(&weights, Some(bias.clone()), 2, 4, params).unwrap();

    let input = vec![1.0, 2.0, -1.0, 0.5];
    let output = layer.forward(&input).unwrap();

    assert_eq!(output.len(), 2);
    for (row, expected) in output.iter().zip([
        1.0 * 1.0 + (-2.0) * 2.0 + 3.0 * (-1.0) + 7.0 * 0.5 + 0.5,
        0.0 * 1.0 + 5.0 * 2.0 + (-7.0) * (-1.0) + 4.0 * 0.5 + (-1.5),
    ]) {
        assert!((row - expected).abs() < 1e-4, "{row} != {expected}");
    }
}

#[test]
fn test_forward_without_bias() {
    let params = Q4Params::new(2).unwrap();
    let layer = QuantizedLinear::from_dense(&[7.0, 0.0, 0.0, 7.0], None, 2, 2, params).unwrap();

    let output = layer.forward(&[2.0, -3.0]).unwrap();
    assert!((output[0] - 14.0).abs() < 1e-4);
    assert!((output[1] + 21.0).abs() < 1e-4);
}

#[test]
fn test_serialize_deserialize_preserves_forward() {
    let params = Q4Params::new(4).unwrap();
    let weights = vec![0.4, -1.3, 2.2, 0.9, -0.1, 1.7, -2.6, 0.3];
    let bias = vec![0.25, -0.75];
    let layer = QuantizedLinear::from_dense(&weights, Some(bias), 2, 4, params).unwrap();

    let mut buffer = Vec::new();
    layer.serialize(&mut buffer).unwrap();
    let restored = QuantizedLinear::deserialize(&mut buffer.as_slice()).unwrap();

    assert_eq!(restored.in_features(), 4);
    assert_eq!(restored.out_features(), 2);

    let input = vec![0.1, 0.2, 0.3, 0.4];
    assert_eq!(layer.forward(&input).unwrap(), restored.forward(&input).unwrap());
}

#[test]
fn test_from_dense_rejects_bad_bias() {
    let params = Q4Params::new(2).unwrap();
    let result = QuantizedLinear::from_dense(&[1.0, 2.0, 3.0, 4.0], Some(vec![0.0]), 2, 2, params);
    assert!(matches!(result, Err(CodecError::CorruptData(_))));
}

#[test]
#[should_panic(expected = "input length must match in_features")]
fn test_forward_panics_on_input_length_mismatch() {
    let params = Q4Params::new(2).unwrap();
    let layer = QuantizedLinear::from_dense(&[1.0, 2.0], None, 1, 2, params).unwrap();
    let _ = layer.forward(&[1.0]);
}
