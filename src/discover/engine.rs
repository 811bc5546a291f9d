//! Candidate discovery across listing views.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::Config;
use crate::discover::listing::{page_url, parse_listing_page, LISTING_VIEWS};
use crate::discover::Candidate;
use crate::error::Result;
use crate::events::EngineEvent;

/// Input for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoverRequest {
    pub account_id: String,
    /// Stop once this many unprocessed candidates are buffered.
    pub target_count: usize,
    /// URLs already promoted in earlier runs; skipped but counted.
    pub already_processed: HashSet<String>,
}

/// In-run accumulator: dedup, scan counting, early-stop decisions.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    seen: HashSet<String>,
    scanned: usize,
    found: Vec<Candidate>,
}

impl RunState {
    /// Fold one page of candidates into the run.
    pub(crate) fn absorb(&mut self, candidates: Vec<Candidate>, processed: &HashSet<String>) {
        for candidate in candidates {
            if !self.seen.insert(candidate.url.clone()) {
                continue;
            }
            self.scanned += 1;
            if processed.contains(&candidate.url) {
                continue;
            }
            self.found.push(candidate);
        }
    }

    /// Whether the run has gathered or scanned enough.
    pub(crate) fn is_satisfied(&self, target: usize, buffer_multiplier: u32) -> bool {
        self.found.len() >= target || self.scanned >= target * buffer_multiplier as usize
    }

    pub(crate) fn found_count(&self) -> usize {
        self.found.len()
    }

    fn into_candidates(mut self, target: usize) -> Vec<Candidate> {
        self.found.truncate(target);
        self.found
    }
}

/// Scan the configured listing views for unprocessed candidates.
///
/// Emits incremental progress on `events` and returns at most
/// `target_count` candidates.
pub async fn discover(
    client: &Client,
    cookies: &str,
    config: &Config,
    request: &DiscoverRequest,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<Vec<Candidate>> {
    let limits = &config.limits;
    let total_pages = (LISTING_VIEWS.len() as u32 * limits.max_pages_per_view).max(1);
    let mut pages_done = 0u32;
    let mut state = RunState::default();

    tracing::info!(
        "Discovering up to {} candidates for {}",
        request.target_count,
        request.account_id
    );

    'views: for view in LISTING_VIEWS {
        tracing::debug!("Scanning view: {}", view.label);

        for page in 1..=limits.max_pages_per_view {
            // Rate limiting delay between page fetches
            let jitter = rand::thread_rng().gen_range(0..500);
            sleep(Duration::from_millis(limits.page_delay_ms + jitter)).await;

            let url = page_url(&config.origin.base_url, view, page);
            let html = client
                .get(&url)
                .header(reqwest::header::COOKIE, cookies)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let candidates = parse_listing_page(&html, &config.origin.base_url)?;
            pages_done += 1;

            if candidates.is_empty() {
                tracing::debug!("View {} exhausted at page {}", view.label, page);
                break;
            }

            state.absorb(candidates, &request.already_processed);

            let progress = (pages_done as f64 / total_pages as f64) * 100.0;
            let _ = events
                .send(EngineEvent::Progress {
                    video_id: request.account_id.clone(),
                    progress,
                    speed: None,
                    eta: None,
                    size: Some(state.found_count() as u64),
                })
                .await;

            if state.is_satisfied(request.target_count, limits.buffer_multiplier) {
                tracing::debug!(
                    "Discovery satisfied after {} pages ({} found)",
                    pages_done,
                    state.found_count()
                );
                break 'views;
            }
        }
    }

    let candidates = state.into_candidates(request.target_count);
    tracing::info!("Discovery complete: {} candidate(s)", candidates.len());

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.to_string(),
            title: "t".to_string(),
            thumbnail: None,
            size: None,
        }
    }

    #[test]
    fn test_absorb_deduplicates_by_url() {
        let mut state = RunState::default();
        let processed = HashSet::new();

        state.absorb(
            vec![candidate("u1"), candidate("u2"), candidate("u1")],
            &processed,
        );
        state.absorb(vec![candidate("u2"), candidate("u3")], &processed);

        assert_eq!(state.found_count(), 3);
        assert_eq!(state.scanned, 3);
    }

    #[test]
    fn test_processed_urls_are_counted_but_not_found() {
        let mut state = RunState::default();
        let processed: HashSet<String> = ["u1".to_string()].into_iter().collect();

        state.absorb(vec![candidate("u1"), candidate("u2")], &processed);

        assert_eq!(state.scanned, 2);
        assert_eq!(state.found_count(), 1);
    }

    #[test]
    fn test_early_stop_on_target() {
        let mut state = RunState::default();
        let processed = HashSet::new();
        state.absorb(vec![candidate("u1"), candidate("u2")], &processed);

        assert!(state.is_satisfied(2, 6));
        assert!(!state.is_satisfied(3, 6));
    }

    #[test]
    fn test_early_stop_on_buffer_multiple() {
        let mut state = RunState::default();
        let processed: HashSet<String> =
            (0..12).map(|i| format!("u{}", i)).collect();

        // All scanned candidates were already processed: nothing is found
        // but the buffer bound still terminates the run.
        state.absorb((0..12).map(|i| candidate(&format!("u{}", i))).collect(), &processed);

        assert_eq!(state.found_count(), 0);
        assert!(state.is_satisfied(2, 6));
    }

    #[test]
    fn test_result_truncated_to_target() {
        let mut state = RunState::default();
        let processed = HashSet::new();
        state.absorb(
            (0..5).map(|i| candidate(&format!("u{}", i))).collect(),
            &processed,
        );

        let result = state.into_candidates(3);
        assert_eq!(result.len(), 3);
    }
}
