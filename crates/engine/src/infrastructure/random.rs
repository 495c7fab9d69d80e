//! Randomness implementations.

use rand::Rng;

use crate::infrastructure::ports::RandomPort;

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn d100(&self) -> i64 {
        rand::thread_rng().gen_range(1..=100)
    }
}

/// Fixed roll for testing.
#[cfg(test)]
pub struct FixedRandom(pub i64);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn d100(&self) -> i64 {
        self.0
    }
}

/// Scripted roll sequence for testing; repeats the last roll when drained.
#[cfg(test)]
pub struct ScriptedRandom {
    rolls: std::sync::Mutex<std::collections::VecDeque<i64>>,
    last: std::sync::Mutex<i64>,
}

#[cfg(test)]
impl ScriptedRandom {
    pub fn new(rolls: impl IntoIterator<Item = i64>) -> Self {
        Self {
            rolls: std::sync::Mutex::new(rolls.into_iter().collect()),
            last: std::sync::Mutex::new(50),
        }
    }
}

#[cfg(test)]
impl RandomPort for ScriptedRandom {
    fn d100(&self) -> i64 {
        let mut rolls = self.rolls.lock().expect("rolls lock");
        if let Some(roll) = rolls.pop_front() {
            *self.last.lock().expect("last lock") = roll;
            roll
        } else {
            *self.last.lock().expect("last lock")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_random_stays_in_d100_range() {
        let random = SystemRandom::new();
        for _ in 0..200 {
            let roll = random.d100();
            assert!((1..=100).contains(&roll));
        }
    }

    #[test]
    fn scripted_random_replays_and_then_repeats() {
        let random = ScriptedRandom::new([20, 80]);
        assert_eq!(random.d100(), 20);
        assert_eq!(random.d100(), 80);
        assert_eq!(random.d100(), 80);
    }
}
