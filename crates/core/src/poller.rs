use std::time::Duration;

use anyhow::Result;

use crate::error::GenerationError;
use crate::logger;
use crate::settings::HostProfile;
use crate::sleep::{sleep_cancellable, CancelToken, Clock};
use crate::snapshot::{image_delta, MediaProbe};
use crate::types::{GenerationMode, MediaBaseline, PollOutcome};

/// Log a progress line every this many checks.
const PROGRESS_EVERY: u32 = 5;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Consecutive equal readings required.
    pub stable_checks: u32,
    pub timeout: Duration,
    /// Extra wait after stabilizing, for final assets to load.
    pub grace: Duration,
    /// Images per generation. Image deltas below this are still arriving.
    pub batch_size: usize,
}

impl PollConfig {
    pub fn from_profile(profile: &HostProfile, mode: GenerationMode) -> Self {
        Self {
            interval: profile.poll_interval(mode),
            stable_checks: profile.stable_checks(mode),
            timeout: profile.timeout(mode),
            grace: profile.grace(mode),
            batch_size: profile.images_per_generation,
        }
    }
}

/// One reading of new media against the baseline
enum Delta {
    Images(Vec<String>),
    Videos(usize),
}

impl Delta {
    fn size(&self) -> usize {
        match self {
            Delta::Images(urls) => urls.len(),
            Delta::Videos(n) => *n,
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            Delta::Images(_) => "images",
            Delta::Videos(_) => "video(s)",
        }
    }

    /// Whether this reading counts towards stabilization at all.
    fn qualifies(&self, batch_size: usize) -> bool {
        match self {
            Delta::Images(urls) => !urls.is_empty() && urls.len() >= batch_size,
            Delta::Videos(n) => *n > 0,
        }
    }
}

fn read_delta(probe: &mut dyn MediaProbe, baseline: &MediaBaseline) -> Result<Delta> {
    Ok(match baseline {
        MediaBaseline::Images(before) => Delta::Images(image_delta(&probe.image_urls()?, before)),
        MediaBaseline::Videos(before) => Delta::Videos(probe.video_count()?.saturating_sub(*before)),
    })
}

/// Resolve a delta to URLs. Images keep the first batch; videos take the
/// first N of the current list, since the page prepends new ones.
fn collect(probe: &mut dyn MediaProbe, delta: Delta, batch_size: usize) -> Result<Vec<String>> {
    Ok(match delta {
        Delta::Images(urls) => urls.into_iter().take(batch_size).collect(),
        Delta::Videos(n) => probe.video_urls()?.into_iter().take(n).collect(),
    })
}

/// Wait for new media to appear and settle. The page never signals done, so
/// the delta is trusted only once its size holds across several readings.
///
/// Returns `Stable` once the delta size held for `stable_checks` readings,
/// `Partial` if the timeout hit with some new media present, `Cancelled` if
/// `cancel` was set, and `GenerationTimeout` if nothing new showed up.
pub fn wait_for_new_media(
    probe: &mut dyn MediaProbe,
    baseline: &MediaBaseline,
    config: &PollConfig,
    clock: &dyn Clock,
    cancel: &CancelToken,
) -> Result<PollOutcome> {
    let mode = match baseline {
        MediaBaseline::Images(_) => GenerationMode::Image,
        MediaBaseline::Videos(_) => GenerationMode::Video,
    };
    logger::info(&format!("waiting for new {} to appear...", mode));

    let started = clock.elapsed();
    let mut last_size = 0usize;
    let mut stable = 0u32;
    let mut checks = 0u32;

    while clock.elapsed().saturating_sub(started) < config.timeout {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }

        let delta = read_delta(probe, baseline)?;
        checks += 1;

        if checks % PROGRESS_EVERY == 0 {
            let secs = clock.elapsed().saturating_sub(started).as_secs();
            logger::info(&format!(
                "[{}s] check #{}: {} new {} (baseline {})",
                secs,
                checks,
                delta.size(),
                delta.noun(),
                baseline.len()
            ));
        }

        if delta.qualifies(config.batch_size) {
            if delta.size() == last_size {
                stable += 1;
                if stable >= config.stable_checks {
                    logger::success(&format!("found {} new {}", delta.size(), delta.noun()));
                    if !sleep_cancellable(clock, config.grace, cancel) {
                        return Ok(PollOutcome::Cancelled);
                    }
                    return Ok(PollOutcome::Stable(collect(probe, delta, config.batch_size)?));
                }
            } else {
                stable = 0;
            }
            last_size = delta.size();
        }

        if !sleep_cancellable(clock, config.interval, cancel) {
            return Ok(PollOutcome::Cancelled);
        }
    }

    let delta = read_delta(probe, baseline)?;
    if delta.size() > 0 {
        logger::warn(&format!("timeout, but found {} new {}", delta.size(), delta.noun()));
        return Ok(PollOutcome::Partial(collect(probe, delta, config.batch_size)?));
    }

    Err(GenerationError::GenerationTimeout { mode, after: config.timeout }.into())
}
