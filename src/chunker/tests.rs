use super::*;

fn params(chunk_size: usize, overlap: usize) -> ChunkParams {
    ChunkParams {
        chunk_size,
        overlap,
    }
}

/// Rebuild the source from the non-overlapping prefix of each node
fn reconstruct(nodes: &[Node]) -> String {
    let mut out = String::new();
    for (i, node) in nodes.iter().enumerate() {
        match nodes.get(i + 1) {
            Some(next) => out.push_str(&node.text[..next.start - node.start]),
            None => out.push_str(&node.text),
        }
    }
    out
}

#[test]
fn empty_input_yields_zero_nodes() {
    let nodes = chunk("", "doc", &ChunkParams::default()).expect("chunk should succeed");
    assert!(nodes.is_empty());
}

#[test]
fn short_input_yields_single_node() {
    let nodes = chunk("hello world", "doc", &ChunkParams::default()).expect("chunk should succeed");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].text, "hello world");
    assert_eq!(nodes[0].start, 0);
    assert_eq!(nodes[0].end, 11);
}

#[test]
fn overlap_equal_to_chunk_size_is_rejected() {
    let result = chunk("some text", "doc", &params(10, 10));
    assert!(matches!(result, Err(GraftError::Config(_))));
}

#[test]
fn overlap_larger_than_chunk_size_is_rejected() {
    let result = chunk("some text", "doc", &params(10, 30));
    assert!(matches!(result, Err(GraftError::Config(_))));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let result = chunk("some text", "doc", &params(0, 0));
    assert!(matches!(result, Err(GraftError::Config(_))));
}

#[test]
fn boundaries_are_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog. \
                Pack my box with five dozen liquor jugs. \
                How vexingly quick daft zebras jump!";
    let p = params(40, 8);

    let first = chunk(text, "doc", &p).expect("chunk should succeed");
    let second = chunk(text, "doc", &p).expect("chunk should succeed");

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!((a.start, a.end), (b.start, b.end));
        assert_eq!(a.text, b.text);
    }
}

#[test]
fn nonoverlapping_prefixes_reconstruct_source() {
    let text = "One sentence here. Another follows it! A third, with a question? \
                Then a long run of words without any terminator to force hard cuts \
                somewhere in the middle of the stream of text.";

    for (size, overlap) in [(20, 5), (32, 10), (50, 0), (7, 3)] {
        let nodes = chunk(text, "doc", &params(size, overlap)).expect("chunk should succeed");
        assert_eq!(reconstruct(&nodes), text, "size={size} overlap={overlap}");
    }
}

#[test]
fn reconstruction_holds_for_multibyte_text() {
    let text = "Le café est ouvert. Die Straße ist naß. 你好世界。日本語のテキストです。";
    let nodes = chunk(text, "doc", &params(16, 4)).expect("chunk should succeed");
    assert!(nodes.len() > 1);
    assert_eq!(reconstruct(&nodes), text);

    for node in &nodes {
        // offsets must always land on character boundaries
        assert!(text.is_char_boundary(node.start));
        assert!(text.is_char_boundary(node.end));
        assert_eq!(&text[node.start..node.end], node.text);
    }
}

#[test]
fn wide_character_at_the_cut_does_not_panic() {
    // The 4-byte 𝄞 straddles the 5-byte hard limit, forcing the cut back
    // below the overlap width
    let text = "ab𝄞cdef";
    let nodes = chunk(text, "doc", &params(5, 4)).expect("chunk should succeed");

    assert!(!nodes.is_empty());
    assert_eq!(reconstruct(&nodes), text);
    for node in &nodes {
        assert!(text.is_char_boundary(node.start));
        assert!(text.is_char_boundary(node.end));
    }
}

#[test]
fn consecutive_nodes_share_the_overlap_region() {
    let text = "abcdefghijklmnopqrstuvwxyz0123456789";
    let nodes = chunk(text, "doc", &params(10, 4)).expect("chunk should succeed");
    assert!(nodes.len() > 1);

    for pair in nodes.windows(2) {
        assert_eq!(pair[0].end - pair[1].start, 4);
        let shared = &pair[0].text[pair[0].text.len() - 4..];
        assert!(pair[1].text.starts_with(shared));
    }
}

#[test]
fn cuts_prefer_sentence_ends() {
    let text = "The cat sat. The dog ran. The bird flew.";
    let nodes = chunk(text, "doc", &params(20, 5)).expect("chunk should succeed");

    assert!(nodes.len() >= 2);
    assert_eq!(nodes[0].text, "The cat sat.");
    assert_eq!(reconstruct(&nodes), text);
}

#[test]
fn offsets_are_monotonic_and_cover_the_source() {
    let text = "word ".repeat(200);
    let nodes = chunk(&text, "doc", &params(48, 12)).expect("chunk should succeed");

    assert_eq!(nodes[0].start, 0);
    assert_eq!(nodes.last().expect("at least one node").end, text.len());
    for pair in nodes.windows(2) {
        assert!(pair[1].start > pair[0].start);
        // no gap between consecutive nodes
        assert!(pair[1].start <= pair[0].end);
    }
}

#[test]
fn nodes_record_their_chunk_parameters() {
    let nodes = chunk("some short text", "doc-7", &params(100, 10)).expect("chunk should succeed");
    assert_eq!(nodes[0].source_id, "doc-7");
    assert_eq!(nodes[0].chunk_size, 100);
    assert_eq!(nodes[0].overlap, 10);
    assert!(!nodes[0].id.is_empty());
}

#[test]
fn node_ids_are_unique() {
    let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
    let nodes = chunk(text, "doc", &params(12, 3)).expect("chunk should succeed");
    let mut ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), nodes.len());
}
