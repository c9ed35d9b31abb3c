//! Fuzz testing for request-input validation.
//!
//! Every function here sees raw attacker-controlled input (cookie values,
//! query parameters, form fields) before anything else does. The target
//! checks that none of them panic and that their outputs keep their
//! guarantees.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `is_well_formed_token`: session cookie pre-check
//! - `sanitize_redirect_target`: post-login redirect must stay on-site
//! - `validate_display_name`: settings form input

#![no_main]

use libfuzzer_sys::fuzz_target;
use session_gate::validation::{
    DEFAULT_REDIRECT, MAX_DISPLAY_NAME_LENGTH, is_well_formed_token, sanitize_redirect_target,
    validate_display_name,
};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if is_well_formed_token(s) {
        assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    let target = sanitize_redirect_target(Some(s));
    assert!(target == DEFAULT_REDIRECT || target == s);
    assert!(target.starts_with('/'));
    assert!(!target.starts_with("//"));
    assert!(!target.starts_with("/\\"));

    if let Ok(name) = validate_display_name(s) {
        let length = name.chars().count();
        assert!((1..=MAX_DISPLAY_NAME_LENGTH).contains(&length));
        assert_eq!(name, name.trim());
    }
});
