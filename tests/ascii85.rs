//! Black-box round-trip and safe-alphabet checks for the Tcl-safe ASCII85
//! variant (spec §8 invariants 1-2).

use tbcwriter::ascii85::{decode, encode, LINE_WIDTH};

const UNSAFE_BYTES: [u8; 7] = [b'"', b'$', b'{', b'}', b'[', b']', b'\\'];

#[test]
fn every_length_mod_four_round_trips() {
    for len in 0..=64usize {
        let bytes: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
        let encoded = encode(&bytes);
        let decoded = decode(&encoded).expect("decode should succeed");
        assert_eq!(decoded, bytes, "mismatch at length {len}");
    }
}

#[test]
fn encoded_text_never_contains_an_unsafe_byte() {
    let bytes: Vec<u8> = (0..=255u16).flat_map(|b| [b as u8; 3]).collect();
    let encoded = encode(&bytes);
    for &b in UNSAFE_BYTES.iter() {
        assert!(!encoded.contains(&b), "unsafe byte {b:#x} appeared in encoded output");
    }
}

#[test]
fn long_runs_wrap_at_the_configured_line_width() {
    let bytes = vec![0x42u8; 4096];
    let encoded = encode(&bytes);
    for line in encoded.split(|&b| b == b'\n') {
        assert!(line.len() <= LINE_WIDTH);
    }
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded, bytes);
}

#[test]
fn all_zero_runs_collapse_to_z_and_still_round_trip() {
    let bytes = vec![0u8; 400];
    let encoded = encode(&bytes);
    assert!(encoded.iter().filter(|&&b| b == b'z').count() >= 90);
    assert_eq!(decode(&encoded).unwrap(), bytes);
}

#[test]
fn decode_rejects_a_byte_outside_the_safe_alphabet() {
    let err = decode(b"\"\n").unwrap_err();
    assert!(format!("{err}").contains("not in the ASCII85 safe alphabet"));
}
