use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;

use crate::Error;

/// One-way hash with a fresh random salt. The returned PHC string embeds
/// algorithm, cost and salt, so verification needs nothing else.
pub fn hash_password(plaintext: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Pbkdf2.hash_password(plaintext.as_bytes(), &salt)?;
    Ok(digest.to_string())
}

/// Constant behavior on bad input: a digest that does not parse verifies
/// as `false` rather than erroring.
pub fn verify_password(plaintext: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Pbkdf2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
