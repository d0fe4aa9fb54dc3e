//! ---
//! mcctl_section: "06-security-access-control"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Password key derivation and salt generation."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use mcctl_common::config::MIN_SALT_LEN;
use mcctl_persistence::KdfParams;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::credentials::CredentialError;

/// Salt used for the decoy derivation when a username is unknown.
pub const DUMMY_SALT: &[u8; MIN_SALT_LEN] = b"mcctl-dummy-salt";

/// Memory/CPU-hard password derivation.
pub trait PasswordKdf: Send + Sync {
    /// Derive `params.key_len` bytes from `password` and `salt`.
    fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError>;
}

/// scrypt derivation via the RustCrypto implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScryptKdf;

impl PasswordKdf for ScryptKdf {
    fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, params.key_len)
            .map_err(|err| CredentialError::InvalidParams(err.to_string()))?;
        let mut output = Zeroizing::new(vec![0u8; params.key_len]);
        scrypt::scrypt(password, salt, &scrypt_params, output.as_mut_slice())
            .map_err(|err| CredentialError::InvalidParams(err.to_string()))?;
        Ok(output)
    }
}

/// Fresh random salt, never shorter than 16 bytes.
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len.max(MIN_SALT_LEN)];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
