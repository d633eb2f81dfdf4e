//! Opaque secret generation.
//!
//! All values come from the thread-local CSPRNG and are safe to generate
//! from any task concurrently.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::session::{CopyPasteToken, SessionId};

/// Random bytes behind a session id.
const SESSION_ID_BYTES: usize = 32;

/// Length of copy-paste and CSRF tokens.
const ALNUM_TOKEN_LEN: usize = 22;

/// Generates a session id: 32 random bytes, URL-safe base64 with padding.
#[must_use]
pub fn generate_session_id() -> SessionId {
    let bytes: [u8; SESSION_ID_BYTES] = rand::rng().random();
    SessionId::new(URL_SAFE.encode(bytes))
}

/// Generates a single-use copy-paste token.
#[must_use]
pub fn generate_copy_paste_token() -> CopyPasteToken {
    CopyPasteToken::new(secret_alnum_string(ALNUM_TOKEN_LEN))
}

/// Generates a double-submit CSRF token.
#[must_use]
pub fn generate_csrf_token() -> String {
    secret_alnum_string(ALNUM_TOKEN_LEN)
}

fn secret_alnum_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_ID_LEN;
    use std::collections::HashSet;

    #[test]
    fn session_ids_have_fixed_length() {
        for _ in 0..64 {
            let id = generate_session_id();
            assert_eq!(id.as_str().len(), SESSION_ID_LEN);
            assert!(id.as_str().ends_with('='));
        }
    }

    #[test]
    fn session_ids_are_url_safe() {
        let id = generate_session_id();
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '='))
        );
    }

    #[test]
    fn copy_paste_tokens_are_alphanumeric() {
        let token = generate_copy_paste_token();
        assert_eq!(token.as_str().len(), 22);
        assert!(token.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let ids: HashSet<String> = (0..256)
            .map(|_| generate_session_id().as_str().to_string())
            .collect();
        assert_eq!(ids.len(), 256);
        assert_ne!(generate_csrf_token(), generate_csrf_token());
    }
}
