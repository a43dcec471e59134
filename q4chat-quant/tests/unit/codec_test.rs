use super::*;

#[test]
fn test_pack_unpack_roundtrip_even_length() {
    let values: Vec<i8> = vec![-8, -4, -1, 0, 1, 3, 7, -7];
    let packed = pack(&values);
    assert_eq!(packed.len(), 4);
    assert_eq!(unpack(&packed, values.len()), values);
}

#[test]
fn test_pack_unpack_roundtrip_odd_length() {
    let values: Vec<i8> = vec![7, -8, 5];
    let packed = pack(&values);
    // Odd tail padded with one implicit zero value
    assert_eq!(packed.len(), 2);
    assert_eq!(unpack(&packed, values.len()), values);
}

#[test]
fn test_pack_unpack_full_range() {
    let values: Vec<i8> = (-8..=7).collect();
    assert_eq!(unpack(&pack(&values), values.len()), values);
}

#[test]
fn test_unpack_pack_byte_roundtrip() {
    let bytes = vec![0x00, 0xFF, 0x7A, 0x85, 0x18];
    let values = unpack(&bytes, bytes.len() * 2);
    assert_eq!(pack(&values), bytes);
}

#[test]
fn test_nibble_layout() {
    // Low nibble = even index, high nibble = odd index
    let packed = pack(&[1, -1]);
    assert_eq!(packed, vec![0xF1]);
    assert_eq!(unpack(&[0xF1], 2), vec![1, -1]);
}

#[test]
fn test_quantize_known_scenario() {
    // group_size=4, weights [1,-1,2,-2] -> scale = 2/7, quantized [4,-4,7,-7]
    let params = Q4Params::new(4).unwrap();
    let tensor = quantize(&[1.0, -1.0, 2.0, -2.0], 1, 4, params).unwrap();

    assert_eq!(tensor.scales.len(), 1);
    assert!((tensor.scales[0] - 2.0 / 7.0).abs() < 1e-6);
    assert_eq!(tensor.zeros, vec![0.0]);
    assert_eq!(unpack(&tensor.packed, 4), vec![4, -4, 7, -7]);

    let approx = dequantize(&tensor).unwrap();
    assert!((approx[0] - 1.142857).abs() < 1e-4);
    assert!((approx[1] + 1.142857).abs() < 1e-4);
    assert!((approx[2] - 2.0).abs() < 1e-5);
    assert!((approx[3] + 2.0).abs() < 1e-5);
}

#[test]
fn test_quantize_invalid_group_size() {
    let result = quantize(&[1.0, 2.0], 1, 2, Q4Params { group_size: 0 });
    assert!(matches!(result, Err(CodecError::InvalidConfiguration(_))));
}

#[test]
fn test_quantize_shape_mismatch() {
    let params = Q4Params::new(4).unwrap();
    let result = quantize(&[1.0, 2.0, 3.0], 2, 2, params);
    assert!(matches!(result, Err(CodecError::CorruptData(_))));
}

#[test]
fn test_quantize_zero_group_uses_scale_floor() {
    let params = Q4Params::new(4).unwrap();
    let tensor = quantize(&[0.0; 4], 1, 4, params).unwrap();

    assert_eq!(tensor.scales[0], Q4Params::SCALE_EPSILON);
    assert!(dequantize(&tensor).unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn test_quantize_error_bound() {
    // |dequantize(quantize(w)) - w| <= scale/2 per element within each group
    let params = Q4Params::new(4).unwrap();
    let weights = vec![0.31, -0.97, 0.445, 0.02, -1.6, 0.73, 1.21, -0.08, 0.5];
    let tensor = quantize(&weights, 3, 3, params).unwrap();
    let approx = dequantize(&tensor).unwrap();

    for (i, (&w, &a)) in weights.iter().zip(&approx).enumerate() {
        let scale = tensor.scales[i / params.group_size];
        assert!(
            (w - a).abs() <= scale / 2.0 + 1e-6,
            "element {i}: |{w} - {a}| > {scale}/2"
        );
    }
}

#[test]
fn test_groups_straddle_row_boundaries() {
    // 2x3 matrix with group_size 4: groups are [0..4) and [4..6)
    let params = Q4Params::new(4).unwrap();
    let weights = vec![1.0, 2.0, 3.0, 4.0, 10.0, -10.0];
    let tensor = quantize(&weights, 2, 3, params).unwrap();

    assert_eq!(tensor.group_count(), 2);
    assert_eq!(tensor.scales.len(), 2);
    assert!((tensor.scales[0] - 4.0 / 7.0).abs() < 1e-6);
    assert!((tensor.scales[1] - 10.0 / 7.0).abs() < 1e-6);
    assert_eq!(tensor.packed.len(), 3);
}

#[test]
fn test_dequantize_rejects_packed_length_mismatch() {
    let params = Q4Params::new(4).unwrap();
    let mut tensor = quantize(&[1.0, -1.0, 2.0, -2.0], 1, 4, params).unwrap();
    tensor.packed.push(0);

    assert!(matches!(dequantize(&tensor), Err(CodecError::CorruptData(_))));
}

#[test]
fn test_dequantize_rejects_scale_length_mismatch() {
    let params = Q4Params::new(2).unwrap();
    let mut tensor = quantize(&[1.0, -1.0, 2.0, -2.0], 1, 4, params).unwrap();
    tensor.scales.pop();

    assert!(matches!(dequantize(&tensor), Err(CodecError::CorruptData(_))));
}

#[test]
fn test_round_half_to_even() {
    assert_eq!(round_half_to_even(1.4), 1.0);
    assert_eq!(round_half_to_even(1.6), 2.0);
    assert_eq!(round_half_to_even(0.5), 0.0);
    assert_eq!(round_half_to_even(1.5), 2.0);
    assert_eq!(round_half_to_even(2.5), 2.0);
    assert_eq!(round_half_to_even(-1.5), -2.0);
    assert_eq!(round_half_to_even(-2.5), -2.0);
}
