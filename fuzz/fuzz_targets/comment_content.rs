#![no_main]

use ember_core::model::comment::validate_content;
use libfuzzer_sys::fuzz_target;

const MAX_CHARS: usize = 500;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(clean) = validate_content(raw, MAX_CHARS) {
        assert!(!clean.is_empty());
        assert!(clean.chars().count() <= MAX_CHARS);
        assert_eq!(clean.trim(), clean);
        assert_eq!(validate_content(&clean, MAX_CHARS).as_deref(), Ok(clean.as_str()));
    }
});
