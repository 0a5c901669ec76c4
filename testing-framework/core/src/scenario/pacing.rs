use std::time::Duration;

use rand::{Rng, thread_rng};
use tokio::time::sleep;

/// Uniformly random pause between two consecutive tasks of one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitBetween {
    pub min: Duration,
    pub max: Duration,
}

impl WaitBetween {
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let spread = (self.max - self.min).as_secs_f64();
        let offset = rng.gen_range(0.0..=spread);
        self.min
            .checked_add(Duration::from_secs_f64(offset))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub async fn wait(&self) {
        let delay = self.sample(&mut thread_rng());
        sleep(delay).await;
    }
}

impl Default for WaitBetween {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;

    #[test]
    fn samples_stay_within_bounds() {
        let pacing = WaitBetween::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1_000 {
            let delay = pacing.sample(&mut rng);
            assert!(delay >= pacing.min && delay <= pacing.max);
        }
    }

    #[test]
    fn inverted_range_uses_minimum() {
        let pacing = WaitBetween::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(pacing.sample(&mut StdRng::seed_from_u64(0)), Duration::from_secs(2));
    }
}
