#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trustcheck::iam::{matches, BaseOperator, PatternMatcher};

#[derive(Arbitrary, Debug)]
struct Input {
    operator: u8,
    value: String,
    pattern: String,
}

fuzz_target!(|input: Input| {
    let base = BaseOperator::ALL[input.operator as usize % BaseOperator::ALL.len()];
    let _ = matches(&input.value, &input.pattern, base.as_str());

    // A pattern without wildcards matches exactly itself
    if !PatternMatcher::has_wildcard(&input.pattern) {
        assert_eq!(
            PatternMatcher::matches(&input.pattern, &input.value),
            input.pattern == input.value
        );
    }
});
