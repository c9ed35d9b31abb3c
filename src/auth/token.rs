use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Bytes of entropy in every session token and OAuth state value.
pub const TOKEN_BYTES: usize = 32;

/// Generate a cryptographically random, URL-safe token.
///
/// 32 random bytes encode to 43 base64url characters without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::validation::is_well_formed_token;

    #[test]
    fn test_token_length_and_alphabet() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(is_well_formed_token(&token));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..256).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 256);
    }
}
