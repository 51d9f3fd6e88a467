use anyhow::anyhow;
use rand::Rng;

use crate::accounts::AccountRepository;
use crate::errors::AppError;

const NAME_PREFIX_LEN: usize = 5;
const RANDOM_SUFFIX_LEN: usize = 6;
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_ATTEMPTS: usize = 16;

/// Builds a referral code: the first five alphanumeric characters of the
/// name, uppercased, followed by six random `[A-Z0-9]` characters.
pub fn generate_referral_code(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(NAME_PREFIX_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();

    format!("{prefix}{suffix}")
}

/// Generates codes until one is not held by any existing user.
pub async fn unique_referral_code(
    accounts: &dyn AccountRepository,
    name: &str,
) -> Result<String, AppError> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate_referral_code(name);
        if !accounts.referral_code_exists(&code).await? {
            return Ok(code);
        }
        tracing::debug!("Referral code {code} already taken, regenerating");
    }
    Err(AppError::Internal(anyhow!(
        "could not generate a unique referral code after {MAX_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix_is_valid(code: &str, prefix_len: usize) -> bool {
        code[prefix_len..]
            .bytes()
            .all(|b| SUFFIX_CHARSET.contains(&b))
    }

    #[test]
    fn test_prefix_is_sanitized_name() {
        let code = generate_referral_code("Jane Doe");
        assert_eq!(code.len(), 11);
        assert!(code.starts_with("JANED"));
        assert!(suffix_is_valid(&code, 5));
    }

    #[test]
    fn test_short_name_uses_whole_name() {
        let code = generate_referral_code("Al");
        assert_eq!(code.len(), 8);
        assert!(code.starts_with("AL"));
        assert!(suffix_is_valid(&code, 2));
    }

    #[test]
    fn test_punctuation_and_non_ascii_are_dropped() {
        let code = generate_referral_code("O'Brien-Ñandú");
        assert!(code.starts_with("OBRIE"));
    }

    #[test]
    fn test_codes_differ() {
        let a = generate_referral_code("Jane Doe");
        let b = generate_referral_code("Jane Doe");
        // 36^6 possible suffixes
        assert_ne!(a, b);
    }
}
