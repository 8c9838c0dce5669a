use stream_ingest::StreamBuffer;

fn reassemble(raw: &str, split_at: usize) -> String {
    let mut buffer = StreamBuffer::new();
    let _ = buffer.feed(&raw[..split_at]);
    let _ = buffer.feed(&raw[split_at..]);
    buffer.finish()
}

#[test]
fn reassembly_is_independent_of_chunk_boundaries() {
    let raw = "Alpha\\nBeta \\\\ gamma \\\"delta\\\" end";

    let mut one_shot = StreamBuffer::new();
    let _ = one_shot.feed(raw);
    let expected = one_shot.finish();

    for split_at in (0..=raw.len()).filter(|at| raw.is_char_boundary(*at)) {
        assert_eq!(
            reassemble(raw, split_at),
            expected,
            "split at byte {split_at} must not change the reassembled text"
        );
    }
}

#[test]
fn finalized_fragments_concatenate_to_the_full_resolution() {
    let raw = "one\\ntwo\\tthree";
    for split_at in 0..=raw.len() {
        let mut buffer = StreamBuffer::new();
        let mut resolved = String::new();
        resolved.push_str(&buffer.feed(&raw[..split_at]));
        resolved.push_str(&buffer.feed(&raw[split_at..]));
        assert_eq!(resolved, "one\ntwo\tthree");
    }
}

#[test]
fn escape_held_across_chunks_drops_nothing() {
    let mut buffer = StreamBuffer::new();
    let mut resolved = String::new();

    for chunk in ["The total is 10", "0\\", "0 units"] {
        resolved.push_str(&buffer.feed(chunk));
    }

    assert_eq!(resolved, "The total is 100 units");
    assert_eq!(buffer.accumulated(), "The total is 100 units");
}

#[test]
fn multibyte_text_survives_reassembly() {
    let raw = "héllo\\nwörld — 日本語";
    let mut one_shot = StreamBuffer::new();
    let expected = one_shot.feed(raw);

    for split_at in (0..=raw.len()).filter(|at| raw.is_char_boundary(*at)) {
        let mut buffer = StreamBuffer::new();
        let mut resolved = String::new();
        resolved.push_str(&buffer.feed(&raw[..split_at]));
        resolved.push_str(&buffer.feed(&raw[split_at..]));
        assert_eq!(resolved, expected);
    }
}
