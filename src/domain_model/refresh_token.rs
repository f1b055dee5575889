use constant_time_eq::constant_time_eq;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const TOKEN_PREFIX: &str = "rt";
const FAMILY_ID_BYTES: usize = 8;
const SECRET_BYTES: usize = 16;

/// Identity of one refresh-token chain. Survives rotation.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(String);

impl FamilyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for FamilyId {
    type Err = TokenFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_hex_of_len(s, FAMILY_ID_BYTES * 2) {
            Ok(FamilyId(s.to_owned()))
        } else {
            Err(TokenFormatError::MalformedToken)
        }
    }
}

/// Hex-encoded SHA-256 of a refresh token. The only form in which a token is persisted.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHash(pub String);

impl TokenHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

impl RefreshToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum TokenFormatError {
    #[error("malformed refresh token")]
    MalformedToken,
}

/// Wire format: `rt_{family_id: 16 hex}_{secret: 32 hex}`.
///
/// The family id is plaintext so the store can be addressed by key; the secret
/// part never leaves the codec except inside the token and its hash.
pub struct RefreshTokenCodec;

impl RefreshTokenCodec {
    pub fn generate() -> (RefreshToken, FamilyId) {
        let family_id = FamilyId(random_hex(FAMILY_ID_BYTES));
        let token = Self::generate_with_family(&family_id);
        (token, family_id)
    }

    pub fn generate_with_family(family_id: &FamilyId) -> RefreshToken {
        RefreshToken(format!(
            "{}_{}_{}",
            TOKEN_PREFIX,
            family_id,
            random_hex(SECRET_BYTES)
        ))
    }

    pub fn extract_family_id(token: &str) -> Result<FamilyId, TokenFormatError> {
        let mut parts = token.split('_');
        let (Some(prefix), Some(family), Some(secret), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenFormatError::MalformedToken);
        };

        if prefix != TOKEN_PREFIX || !is_hex_of_len(secret, SECRET_BYTES * 2) {
            return Err(TokenFormatError::MalformedToken);
        }
        family.parse()
    }

    pub fn hash(token: &str) -> TokenHash {
        TokenHash(hex::encode(Sha256::digest(token.as_bytes())))
    }

    pub fn compare_hashes(a: &TokenHash, b: &TokenHash) -> bool {
        if a.0.len() != b.0.len() {
            return false;
        }
        constant_time_eq(a.0.as_bytes(), b.0.as_bytes())
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && hex::decode(s).is_ok()
}
