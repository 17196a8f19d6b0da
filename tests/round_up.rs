use anyhow::Result;
use pretty_assertions::assert_eq;

use shelltrace::memory::{round_up, stage, WORD_SIZE};
use shelltrace::TRAP;

const SIZES: &[usize] = &[1, 2, 4, 8, WORD_SIZE];

#[test]
fn test_round_up_laws() {
    for &m in SIZES {
        for n in 0..(8 * m) {
            let r = round_up(n, m).unwrap();

            assert_eq!(r % m, 0, "round_up({n}, {m}) = {r}");
            assert!(r >= n, "round_up({n}, {m}) = {r}");
            assert!(r < n + m, "round_up({n}, {m}) = {r}");
        }
    }
}

#[test]
fn test_round_up_boundaries() {
    for &m in SIZES {
        assert_eq!(round_up(0, m), Some(0));

        for k in 1..16 {
            assert_eq!(round_up(k * m, m), Some(k * m));
            assert_eq!(round_up(k * m + 1, m), Some((k + 1) * m));
        }
    }
}

#[test]
fn test_round_up_out_of_range() {
    assert_eq!(round_up(0, 0), None);
    assert_eq!(round_up(17, 0), None);

    assert_eq!(round_up(usize::MAX, 1), Some(usize::MAX));
    assert_eq!(round_up(usize::MAX, WORD_SIZE), None);
    assert_eq!(round_up(usize::MAX - WORD_SIZE + 2, WORD_SIZE), None);

    let last = usize::MAX - usize::MAX % WORD_SIZE;
    assert_eq!(round_up(last, WORD_SIZE), Some(last));
    assert_eq!(round_up(last - 1, WORD_SIZE), Some(last));
}

#[test]
fn test_stage_preserves_payload() -> Result<()> {
    for len in 0..=(3 * WORD_SIZE + 1) {
        let payload: Vec<u8> = (0..len).map(|i| i as u8 ^ 0x5a).collect();
        let image = stage(&payload)?;

        assert_eq!(Some(image.len()), round_up(len + TRAP.len(), WORD_SIZE));
        assert_eq!(&image[..len], &payload[..]);
    }

    Ok(())
}

#[test]
fn test_stage_trap_tail() -> Result<()> {
    for len in 0..=(3 * WORD_SIZE + 1) {
        let payload = vec![0x90; len];
        let image = stage(&payload)?;

        // At least one whole marker follows the payload, even when it is word-aligned.
        assert!(image.len() - len >= TRAP.len());

        for (i, byte) in image.iter().enumerate().skip(len) {
            assert_eq!(*byte, TRAP[i % TRAP.len()], "len = {len}, i = {i}");
        }
    }

    Ok(())
}

#[test]
fn test_stage_aligned_payload_gets_extra_word() -> Result<()> {
    let payload = vec![0x90; WORD_SIZE];
    let image = stage(&payload)?;

    assert_eq!(image.len(), 2 * WORD_SIZE);

    Ok(())
}
