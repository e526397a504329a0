//! Resumable HTTP transfer with stall detection and retry.
//!
//! The transfer streams into a temporary file next to the final blob
//! path. Partial bytes survive process death and are inherited by the
//! next attempt through a `Range` request, so the retry wrapper can
//! re-enter the transfer without losing progress.

use crate::config::NetworkConfig;
use crate::error::{HubError, Result};
use crate::progress::ProgressRow;
use futures::StreamExt;
use rand::Rng;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Configuration for the transfer retry envelope.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Total elapsed ceiling; once exceeded the last error surfaces.
    pub max_elapsed: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub multiplier: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: NetworkConfig::RETRY_INITIAL_DELAY,
            max_delay: NetworkConfig::RETRY_MAX_DELAY,
            max_elapsed: NetworkConfig::RETRY_MAX_ELAPSED,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = elapsed;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Multiply by a random factor between 0.5 and 1.5: average
            // delay is unchanged while concurrent retriers spread out.
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Retry an operation with exponential backoff until the elapsed
/// envelope is exhausted. Every error is retried: the transfer inherits
/// partial progress from disk, so re-entering is always safe.
pub(crate) async fn retry_transfer<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("transfer succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                let delay = policy.calculate_delay(attempt);
                if start.elapsed() + delay >= policy.max_elapsed {
                    warn!(
                        "retry envelope exhausted after {:?}: {}",
                        start.elapsed(),
                        e
                    );
                    return Err(e);
                }

                warn!("transfer attempt {} failed: {}. Retrying in {:?}", attempt + 1, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Resumable ranged GET into a temporary file.
///
/// If `tmp_path` already holds bytes they are kept and the request asks
/// for the remaining range; a server answering `200 OK` to a ranged
/// request does not support resume, so the file is truncated and the
/// transfer starts over. Returns the total number of bytes present in
/// the file on success.
pub(crate) async fn download_resumable(
    http: &reqwest::Client,
    url: &str,
    tmp_path: &Path,
    bearer: Option<&str>,
    row: &dyn ProgressRow,
) -> Result<u64> {
    let mut resume_size: u64 = match tokio::fs::metadata(tmp_path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(tmp_path)
        .await
        .map_err(|e| HubError::io_with_path(e, tmp_path))?;

    let mut request = http.get(url);
    if let Some(token) = bearer {
        request = request.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if resume_size > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={}-", resume_size));
        info!("resuming download from byte {}", resume_size);
    }

    let response = request.send().await.map_err(|e| HubError::Network {
        message: format!("download request failed: {}", e),
        cause: Some(e.to_string()),
    })?;

    let status = response.status();
    let content_length = response.content_length();

    let total_size: Option<u64> = if resume_size > 0 {
        match status {
            reqwest::StatusCode::PARTIAL_CONTENT => content_length.map(|len| resume_size + len),
            reqwest::StatusCode::OK => {
                // Server ignored the range; start over from zero.
                warn!("server does not support range requests, restarting from zero");
                file.set_len(0)
                    .await
                    .map_err(|e| HubError::io_with_path(e, tmp_path))?;
                resume_size = 0;
                content_length
            }
            _ => {
                return Err(HubError::BadStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
        }
    } else {
        if status != reqwest::StatusCode::OK {
            return Err(HubError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        content_length
    };

    row.set_position(resume_size);
    let mut writer =
        tokio::io::BufWriter::with_capacity(NetworkConfig::DOWNLOAD_CHUNK_SIZE, file);

    let mut downloaded = resume_size;
    let mut last_progress = Instant::now();
    let mut accumulated_stall = Duration::ZERO;

    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HubError::Network {
            message: format!("read failed: {}", e),
            cause: Some(e.to_string()),
        })?;
        if chunk.is_empty() {
            continue;
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| HubError::io_with_path(e, tmp_path))?;

        downloaded += chunk.len() as u64;
        row.advance(chunk.len() as u64);

        // Stall accounting: a read gap above the check threshold counts
        // toward the stall budget instead of advancing the clock.
        let now = Instant::now();
        let gap = now.duration_since(last_progress);
        if gap > NetworkConfig::STALL_CHECK_THRESHOLD {
            accumulated_stall += gap;
            if accumulated_stall > NetworkConfig::STALL_ABORT_THRESHOLD {
                return Err(HubError::Stalled {
                    threshold: NetworkConfig::STALL_ABORT_THRESHOLD,
                });
            }
        } else {
            accumulated_stall = Duration::ZERO;
            last_progress = now;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| HubError::io_with_path(e, tmp_path))?;

    if let Some(total) = total_size {
        if downloaded != total {
            return Err(HubError::SizeMismatch {
                expected: total,
                actual: downloaded,
            });
        }
    }

    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| HubError::io_with_path(e, tmp_path))?;

    Ok(downloaded)
}

/// Run the retrying resumable transfer into `tmp_path`.
pub(crate) async fn download_with_retry(
    http: &reqwest::Client,
    url: &str,
    tmp_path: &Path,
    bearer: Option<&str>,
    row: &dyn ProgressRow,
) -> Result<u64> {
    let policy = RetryPolicy::default();
    retry_transfer(&policy, || {
        download_resumable(http, url, tmp_path, bearer, row)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation_no_jitter() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(false);

        // 1 * 2^6 = 64s, capped at 30s.
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_band() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(2))
            .with_jitter(true);

        for _ in 0..20 {
            let delay = policy.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let policy = RetryPolicy::new().with_jitter(false);
        let result = retry_transfer(&policy, || async { Ok::<_, HubError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(5))
            .with_jitter(false);

        let mut attempts = 0;
        let result = retry_transfer(&policy, || {
            attempts += 1;
            let attempt = attempts;
            async move {
                if attempt < 3 {
                    Err(HubError::Network {
                        message: "temporary".into(),
                        cause: None,
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_envelope_exhaustion() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(50))
            .with_max_elapsed(Duration::from_millis(20))
            .with_jitter(false);

        let result: Result<()> = retry_transfer(&policy, || async {
            Err(HubError::Network {
                message: "always fails".into(),
                cause: None,
            })
        })
        .await;

        assert!(matches!(result.unwrap_err(), HubError::Network { .. }));
    }
}
