#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use simstring::{CharWidth, NgramGenerator};

#[derive(Arbitrary, Debug)]
struct Input {
    n: u8,
    wide: bool,
    text: String,
}

fuzz_target!(|input: Input| {
    let width = if input.wide { CharWidth::Wide } else { CharWidth::Narrow };
    let Ok(generator) = NgramGenerator::new(usize::from(input.n % 8), width) else {
        return;
    };

    let grams = generator.generate(&input.text);
    assert!(grams.size() >= 1);
    assert_eq!(grams.iter().map(|(_, c)| c).sum::<u32>(), grams.size());
    assert_eq!(grams.overlap(&grams), grams.size());
    assert_eq!(grams, generator.generate(&input.text));
});
