//! Bounded-wait helpers for multi-step page flows (login, redirects).

use std::time::Duration;

use chromiumoxide::{Element, Page};
use tokio::time::Instant;

use basket_core::errors::SessionError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Poll for an element until it appears or the timeout elapses.
pub async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, SessionError> {
    let deadline = Instant::now() + timeout;
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(error) => {
                if Instant::now() >= deadline {
                    return Err(SessionError::Script(format!(
                        "selector `{selector}` did not appear within {}s: {error}",
                        timeout.as_secs()
                    )));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

/// Race a set of candidate URL prefixes against a bounded timeout: the
/// first prefix the page reaches wins. `Ok(None)` means the timeout won,
/// which callers treat as a soft outcome, not an error.
pub async fn wait_for_url_prefix(
    page: &Page,
    prefixes: &[String],
    timeout: Duration,
) -> Result<Option<String>, SessionError> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = page
            .url()
            .await
            .map_err(|e| SessionError::Engine(e.to_string()))?
            .unwrap_or_default();
        if prefixes.iter().any(|prefix| url.starts_with(prefix.as_str())) {
            return Ok(Some(url));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Current page URL, empty when the page has none yet.
pub async fn current_url(page: &Page) -> Result<String, SessionError> {
    Ok(page
        .url()
        .await
        .map_err(|e| SessionError::Engine(e.to_string()))?
        .unwrap_or_default())
}
