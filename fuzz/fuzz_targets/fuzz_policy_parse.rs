#![no_main]
use libfuzzer_sys::fuzz_target;
use trustcheck::{serializer, Validator};

// Arbitrary bytes must never panic the parser or validator, and anything that
// seals must survive a canonical round trip
fuzz_target!(|data: &[u8]| {
    let doc = match serializer::deserialize(data) {
        Ok(doc) => doc,
        Err(_) => return,
    };

    let validator = Validator::default();
    let _ = validator.validate(&doc);

    if let Ok(policy) = validator.seal(&doc) {
        let bytes = serializer::serialize(&policy).expect("sealed policy serializes");
        let parsed = serializer::deserialize(&bytes).expect("canonical output parses");
        assert_eq!(parsed, doc);
    }
});
