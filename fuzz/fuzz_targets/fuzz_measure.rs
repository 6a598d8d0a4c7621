#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use simstring::Measure;

#[derive(Arbitrary, Debug)]
struct Input {
    measure: u8,
    k: u16,
    m: u16,
    o: u16,
    threshold: u16,
}

// Any (m, o) that passes must lie within the planned size range and meet the
// minimum overlap
fuzz_target!(|input: Input| {
    let measure = Measure::ALL[usize::from(input.measure) % Measure::ALL.len()];
    let k = u32::from(input.k % 512) + 1;
    let m = u32::from(input.m % 512) + 1;
    let o = u32::from(input.o) % (k.min(m) + 1);
    let threshold = f64::from(input.threshold) / f64::from(u16::MAX);

    if measure.is_match(k, m, o, threshold) {
        assert!(measure.size_range(k, threshold).contains(m));
        assert!(o >= measure.min_overlap(k, m, threshold));
    }
});
