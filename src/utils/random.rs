use std::collections::VecDeque;
use std::fmt;

/// Failure to obtain randomness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomError(pub String);

impl fmt::Display for RandomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "random source failed: {}", self.0)
    }
}

impl std::error::Error for RandomError {}

/// Uniform randomness in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> Result<f64, RandomError>;

    /// Picks an index uniformly from `0..len`. `len` must be non-zero.
    fn pick_index(&mut self, len: usize) -> Result<usize, RandomError> {
        let roll = self.next_f64()?;
        Ok(((roll * len as f64) as usize).min(len.saturating_sub(1)))
    }
}

/// Operating-system randomness via `getrandom`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_f64(&mut self) -> Result<f64, RandomError> {
        let mut bytes = [0u8; 8];
        getrandom::fill(&mut bytes).map_err(|err| RandomError(err.to_string()))?;
        // 53 random bits fill an f64 mantissa exactly.
        let bits = u64::from_le_bytes(bytes) >> 11;
        Ok(bits as f64 / (1u64 << 53) as f64)
    }
}

/// Replays a fixed list of rolls, failing once exhausted.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRandom {
    rolls: VecDeque<f64>,
}

impl ScriptedRandom {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> Result<f64, RandomError> {
        self.rolls
            .pop_front()
            .ok_or_else(|| RandomError("scripted rolls exhausted".to_string()))
    }
}
