use super::*;
use crate::codec::quantize;

fn sample_tensor(bias: bool) -> QuantizedTensor {
    let params = Q4Params::new(4).unwrap();
    let weights = vec![0.5, -1.25, 2.0, 0.0, 3.5, -3.5, 0.75, 1.0, -0.5];
    let mut tensor = quantize(&weights, 3, 3, params).unwrap();
    if bias {
        tensor.bias = Some(vec![0.1, -0.2, 0.3]);
    }
    tensor
}

#[test]
fn test_roundtrip_reproduces_tensor_exactly() {
    for bias in [false, true] {
        let tensor = sample_tensor(bias);

        let mut buffer = Vec::new();
        write_tensor(&tensor, &mut buffer).unwrap();
        let restored = read_tensor(&mut buffer.as_slice()).unwrap();

        assert_eq!(restored.packed, tensor.packed);
        assert_eq!(restored.scales, tensor.scales);
        assert_eq!(restored.zeros, tensor.zeros);
        assert_eq!((restored.rows, restored.cols), (tensor.rows, tensor.cols));
        assert_eq!(restored.bias, tensor.bias);
        assert_eq!(restored.params, tensor.params);
    }
}

#[test]
fn test_rejects_bad_magic() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(false), &mut buffer).unwrap();
    buffer[0] ^= 0xFF;

    assert!(matches!(
        read_tensor(&mut buffer.as_slice()),
        Err(CodecError::FormatError(_))
    ));
}

#[test]
fn test_rejects_truncated_record() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(true), &mut buffer).unwrap();

    for len in [4, 20, 36, buffer.len() - 1] {
        assert!(
            matches!(read_tensor(&mut &buffer[..len]), Err(CodecError::FormatError(_))),
            "truncation at {len} bytes must be rejected"
        );
    }
}

#[test]
fn test_rejects_inconsistent_packed_length() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(false), &mut buffer).unwrap();
    // packed length field is the 7th u32
    buffer[24] = buffer[24].wrapping_add(1);

    assert!(matches!(
        read_tensor(&mut buffer.as_slice()),
        Err(CodecError::FormatError(_))
    ));
}

#[test]
fn test_rejects_inconsistent_group_count() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(false), &mut buffer).unwrap();
    // group count field is the 8th u32
    buffer[28] = buffer[28].wrapping_add(1);

    assert!(matches!(
        read_tensor(&mut buffer.as_slice()),
        Err(CodecError::FormatError(_))
    ));
}

#[test]
fn test_rejects_zero_group_size() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(false), &mut buffer).unwrap();
    // group size field is the 2nd u32
    buffer[4..8].copy_from_slice(&0u32.to_le_bytes());

    assert!(matches!(
        read_tensor(&mut buffer.as_slice()),
        Err(CodecError::FormatError(_))
    ));
}

#[test]
fn test_rejects_bad_bias_length() {
    let mut buffer = Vec::new();
    write_tensor(&sample_tensor(true), &mut buffer).unwrap();
    // bias length field is the 9th u32; 3 rows -> patch to 2
    buffer[32..36].copy_from_slice(&2u32.to_le_bytes());

    assert!(matches!(
        read_tensor(&mut buffer.as_slice()),
        Err(CodecError::FormatError(_))
    ));
}
