use std::env;
use std::time::Duration;
use tracing::debug;

/// Randomized, bounded pause between browser actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDelay {
    /// Lower bound in milliseconds
    pub min_ms: u64,
    /// Upper bound in milliseconds
    pub max_ms: u64,
}

impl RequestDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms > max_ms {
            (max_ms, min_ms)
        } else {
            (min_ms, max_ms)
        };
        Self { min_ms, max_ms }
    }

    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Random delay within the configured range, with ±20% jitter clamped back into range
    pub fn random_delay(&self) -> u64 {
        use rand::prelude::*;
        if self.max_ms == 0 {
            return 0;
        }
        let mut rng = rand::rng();
        let base_delay = rng.random_range(self.min_ms..=self.max_ms);

        let jitter_range = (base_delay as f64 * 0.2) as i64;
        let jitter = rng.random_range(-jitter_range..=jitter_range);

        (base_delay as i64 + jitter).clamp(self.min_ms as i64, self.max_ms as i64) as u64
    }

    /// Sleep for one random delay. Real wall-clock time.
    pub async fn wait(&self) {
        let delay = self.random_delay();
        if delay > 0 {
            debug!("pacing: sleeping {}ms", delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Delay presets for the different kinds of browser interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Between fields or small clicks.
    pub short: RequestDelay,
    /// After a click that changes page content.
    pub medium: RequestDelay,
    /// After navigation or a modal step.
    pub long: RequestDelay,
    /// Between wheel steps while "reading" a page.
    pub scroll: RequestDelay,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::human()
    }
}

impl Pacing {
    /// Default human-like pacing: 0.5-1.5s / 1-2s / 2-4s, scroll steps 0.3-0.7s.
    pub fn human() -> Self {
        Self {
            short: RequestDelay::new(500, 1500),
            medium: RequestDelay::new(1000, 2000),
            long: RequestDelay::new(2000, 4000),
            scroll: RequestDelay::new(300, 700),
        }
    }

    pub fn fast() -> Self {
        Self {
            short: RequestDelay::new(100, 300),
            medium: RequestDelay::new(300, 700),
            long: RequestDelay::new(700, 1500),
            scroll: RequestDelay::new(100, 200),
        }
    }

    pub fn conservative() -> Self {
        Self {
            short: RequestDelay::new(1000, 2500),
            medium: RequestDelay::new(2000, 4000),
            long: RequestDelay::new(4000, 8000),
            scroll: RequestDelay::new(500, 1200),
        }
    }

    /// No waiting at all (scripted pages in tests).
    pub fn instant() -> Self {
        Self {
            short: RequestDelay::zero(),
            medium: RequestDelay::zero(),
            long: RequestDelay::zero(),
            scroll: RequestDelay::zero(),
        }
    }

    pub async fn short(&self) {
        self.short.wait().await
    }

    pub async fn medium(&self) {
        self.medium.wait().await
    }

    pub async fn long(&self) {
        self.long.wait().await
    }

    pub async fn scroll_step(&self) {
        self.scroll.wait().await
    }
}

/// `JOBSCOUT_PACING` = `fast` | `conservative` | anything else (human).
pub fn pacing_from_env() -> Pacing {
    let preset = env::var("JOBSCOUT_PACING").ok().map(|v| v.to_lowercase());
    match preset.as_deref() {
        Some("fast") => Pacing::fast(),
        Some("conservative") => Pacing::conservative(),
        Some("instant") => Pacing::instant(),
        _ => Pacing::human(),
    }
}
