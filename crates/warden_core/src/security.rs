//! Password hashing collaborator.
//!
//! # Responsibility
//! - Turn plaintext passwords into opaque adaptive hashes.
//! - Verify plaintext candidates against stored hashes.
//!
//! # Invariants
//! - Plaintext never leaves this module except as hasher input.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lowest cost accepted by bcrypt.
pub const MIN_BCRYPT_COST: u32 = 4;
/// Highest cost accepted by bcrypt.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Hashing contract consumed by the user repository.
pub trait PasswordHasher: Send + Sync {
    /// Hashes `plaintext` into an opaque string.
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// Returns whether `plaintext` matches `hashed`.
    fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordError>;
}

/// Password hashing failure.
#[derive(Debug)]
pub enum PasswordError {
    InvalidCost(u32),
    Bcrypt(bcrypt::BcryptError),
}

impl Display for PasswordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCost(cost) => write!(
                f,
                "bcrypt cost {cost} is outside {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}"
            ),
            Self::Bcrypt(err) => write!(f, "password hashing failed: {err}"),
        }
    }
}

impl Error for PasswordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidCost(_) => None,
            Self::Bcrypt(err) => Some(err),
        }
    }
}

impl From<bcrypt::BcryptError> for PasswordError {
    fn from(value: bcrypt::BcryptError) -> Self {
        Self::Bcrypt(value)
    }
}

/// `bcrypt`-backed password hasher.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Creates a hasher with an explicit work factor.
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(plaintext, hashed)?)
    }
}
