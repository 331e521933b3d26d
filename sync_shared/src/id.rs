//! Participant identifiers.
//!
//! Ids are opaque strings chosen by the client when a session starts. The
//! coordinator never assigns them; it trusts whatever id an `update` carries.

use std::{collections::HashSet, fmt};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Identifies one participant for the lifetime of its connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Source of fresh participant ids.
pub trait IdGenerator {
    fn generate(&mut self) -> ParticipantId;
}

/// Generates 128-bit random tokens rendered as 32 lowercase hex digits.
///
/// Tokens already handed out by this generator are never returned again.
pub struct RandomIdGenerator {
    rng: StdRng,
    issued: HashSet<u128>,
}

impl RandomIdGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            issued: HashSet::new(),
        }
    }

    /// Deterministic generator for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            issued: HashSet::new(),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&mut self) -> ParticipantId {
        loop {
            let token: u128 = self.rng.gen();
            if self.issued.insert(token) {
                return ParticipantId(format!("{token:032x}"));
            }
        }
    }
}
