//! Pane-content fingerprinting.
//!
//! Captured pane tails are normalized and hashed so the monitor can detect
//! curses-style screen refreshes that never reach the pane log file.

/// Default number of tail lines sampled per pane.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Normalize a raw pane capture to its comparable tail.
///
/// Strips CR, right-trims each line, drops trailing blank lines, and keeps
/// the last `lines` lines. Idempotent: normalizing a normalized tail is a
/// no-op.
pub fn normalize_tail(raw: &str, lines: usize) -> String {
    if lines == 0 {
        return String::new();
    }

    let mut tail: Vec<String> = raw
        .split('\n')
        .map(|l| l.replace('\r', "").trim_end().to_owned())
        .collect();
    while tail.last().is_some_and(String::is_empty) {
        tail.pop();
    }
    if tail.len() > lines {
        tail.drain(..tail.len() - lines);
    }
    tail.join("\n")
}

/// Hash of the normalized tail, as a fixed-width hex string.
pub fn fingerprint(raw: &str, lines: usize) -> String {
    format!("{:016x}", fnv1a64(normalize_tail(raw, lines).as_bytes()))
}

/// FNV-1a 64-bit. Stable across runs and platforms, which the on-disk
/// server key derivation also relies on.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_cr_and_trailing_whitespace() {
        let raw = "prompt> \r\noutput line   \r\n";
        assert_eq!(normalize_tail(raw, 20), "prompt>\noutput line");
    }

    #[test]
    fn drops_trailing_blank_lines() {
        let raw = "a\nb\n\n\n\n";
        assert_eq!(normalize_tail(raw, 20), "a\nb");
    }

    #[test]
    fn keeps_interior_blank_lines() {
        let raw = "a\n\nb\n";
        assert_eq!(normalize_tail(raw, 20), "a\n\nb");
    }

    #[test]
    fn collapses_to_tail_lines() {
        let raw = (1..=30).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let tail = normalize_tail(&raw, 20);
        assert_eq!(tail.lines().count(), 20);
        assert!(tail.starts_with("line11"));
        assert!(tail.ends_with("line30"));
    }

    #[test]
    fn zero_lines_is_empty() {
        assert_eq!(normalize_tail("a\nb", 0), "");
    }

    #[test]
    fn fingerprint_differs_on_content_change() {
        let a = fingerprint("prompt> thinking...", 20);
        let b = fingerprint("prompt> done", 20);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_ignores_trailing_noise() {
        let a = fingerprint("prompt> done\n\n\n", 20);
        let b = fingerprint("prompt> done   \r\n", 20);
        assert_eq!(a, b);
    }

    #[test]
    fn fnv_known_vectors() {
        // Published FNV-1a test vectors.
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(
            raw_lines in prop::collection::vec("[ -~]{0,24}", 0..32),
            lines in 1usize..40,
        ) {
            let raw = raw_lines.join("\n");
            let once = normalize_tail(&raw, lines);
            let twice = normalize_tail(&once, lines);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalized_never_exceeds_line_budget(
            raw_lines in prop::collection::vec("[ -~]{0,24}", 0..32),
            lines in 1usize..10,
        ) {
            let raw = raw_lines.join("\n");
            let tail = normalize_tail(&raw, lines);
            prop_assert!(tail.lines().count() <= lines);
        }
    }
}
