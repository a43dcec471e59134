use super::*;

#[test]
fn test_byte_vocab_shape() {
    let vocab = byte_vocab();
    assert_eq!(vocab.len(), VOCAB_SIZE);
    assert_eq!(vocab[0], vec![0u8]);
    assert_eq!(vocab[255], vec![255u8]);
    assert_eq!(vocab[EOS_TOKEN_ID], b"<|endoftext|>".to_vec());
}

#[test]
fn test_format_constants() {
    assert_eq!(MODEL_MAGIC, 0x71346D31);
    assert_eq!(MODEL_VERSION, 1);
    assert_eq!(MODEL_HEADER_SIZE, 64);
    assert_eq!(VOCAB_SIZE, 257);
    assert_eq!(EOS_TOKEN_ID, 256);
}

#[test]
fn test_export_fails_without_checkpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"dim": 4, "hidden_dim": 8, "n_layers": 1}"#,
    )
    .unwrap();

    let result = export_model(dir.path(), &dir.path().join("model.q4m"), 4);
    assert!(result.is_err());
}
