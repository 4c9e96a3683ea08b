use std::future::Future;
use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use basket_core::errors::SessionError;

use crate::scripts::{apply_script, CAPTURE_CONSOLE_JS, DRAIN_CONSOLE_JS, STEALTH_JS};

/// The user agent the session advertises. Vendor HTTP clients that mimic
/// in-page fetches send the same string.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Session parameters, resolved once from application config.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Vendor base URL the fresh page navigates to.
    pub base_url: String,
    /// CDP websocket endpoint of an already-running browser; when unset a
    /// local Chromium is launched.
    pub cdp_endpoint: Option<String>,
    pub profile_dir: Option<PathBuf>,
    pub debug_dir: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cdp_endpoint: None,
            profile_dir: None,
            debug_dir: None,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// The Closed/Open state machine, generic over the session payload so the
/// transitions can be exercised without starting an engine.
enum SessionState<S> {
    Closed,
    Open(S),
}

impl<S> SessionState<S> {
    /// Open via `open` when closed; reuse the open session otherwise. The
    /// opener runs at most once per Closed-to-Open transition.
    async fn open_with<F, Fut>(&mut self, open: F) -> Result<&mut S, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, SessionError>>,
    {
        if matches!(self, SessionState::Closed) {
            *self = SessionState::Open(open().await?);
        }
        match self {
            SessionState::Open(session) => Ok(session),
            SessionState::Closed => Err(SessionError::NotOpen),
        }
    }

    /// Transition to Closed, handing the session (if any) to the caller.
    fn close(&mut self) -> Option<S> {
        match std::mem::replace(self, SessionState::Closed) {
            SessionState::Open(session) => Some(session),
            SessionState::Closed => None,
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, SessionState::Open(_))
    }

    fn current(&self) -> Option<&S> {
        match self {
            SessionState::Open(session) => Some(session),
            SessionState::Closed => None,
        }
    }
}

struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// Owns the single process-wide browser session.
///
/// `acquire` is reentrant: the first call starts the engine, opens the page
/// and navigates; later calls reuse the open session. `release` tears down
/// exactly once and tolerates a session that was never opened. The state
/// mutex is held for the whole of every operation, so no two browser-backed
/// operations ever interleave on the shared page.
pub struct SessionManager {
    config: SessionConfig,
    state: Mutex<SessionState<Session>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self { config, state: Mutex::new(SessionState::Closed) }
    }

    /// Ensure the session is open. Idempotent.
    pub async fn acquire(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.ensure_open(&mut state).await?;
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_open()
    }

    /// Evaluate a one-argument (possibly async) function script against the
    /// shared page, with console output captured and forwarded to the log.
    pub async fn run_script(&self, script: &str, args: &Value) -> Result<Value, SessionError> {
        let mut state = self.state.lock().await;
        let page = self.ensure_open(&mut state).await?.clone();

        eval(&page, CAPTURE_CONSOLE_JS.to_string()).await?;
        let result = eval(&page, apply_script(script, args)).await;
        match eval(&page, DRAIN_CONSOLE_JS.to_string()).await {
            Ok(Value::Array(lines)) => {
                for line in lines.iter().filter_map(Value::as_str) {
                    debug!(browser_console = line, "page console");
                }
            }
            Ok(_) => {}
            Err(error) => debug!(%error, "could not drain page console"),
        }
        result
    }

    /// Run a multi-step flow against the shared page while holding the
    /// session lock for the whole flow. Used by the login sequence, which
    /// must not be interleaved with cart scripts.
    pub async fn with_page<T, F, Fut>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(Page) -> Fut + Send,
        Fut: Future<Output = Result<T, SessionError>> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let page = self.ensure_open(&mut state).await?.clone();
        f(page).await
    }

    /// Reload the shared page to resynchronize lazily-fetched client state.
    pub async fn reload(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let page = self.ensure_open(&mut state).await?;
        page.reload().await.map_err(|e| SessionError::Engine(e.to_string()))?;
        Ok(())
    }

    /// Capture a debug screenshot of the current page. Requires an open
    /// session; never opens one.
    pub async fn screenshot(&self, name: &str) -> Result<PathBuf, SessionError> {
        let state = self.state.lock().await;
        let Some(session) = state.current() else {
            return Err(SessionError::NotOpen);
        };

        let dir = self
            .config
            .debug_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("basket-screenshots"));
        std::fs::create_dir_all(&dir).map_err(|e| SessionError::Engine(e.to_string()))?;
        let path = dir.join(format!("{name}.png"));

        session
            .page
            .save_screenshot(
                ScreenshotParams::builder().format(CaptureScreenshotFormat::Png).build(),
                &path,
            )
            .await
            .map_err(|e| SessionError::Engine(e.to_string()))?;
        info!(path = %path.display(), "saved debug screenshot");
        Ok(path)
    }

    /// Tear the session down. Idempotent; a never-opened manager is a no-op.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        let Some(mut session) = state.close() else {
            return;
        };

        // Reload first so pending client-side persistence is flushed.
        if let Err(error) = session.page.reload().await {
            debug!(%error, "pre-close reload failed");
        }
        if let Err(error) = session.browser.close().await {
            warn!(%error, "browser close failed");
        }
        session.handler.abort();
        info!("browser session released");
    }

    async fn ensure_open<'a>(
        &self,
        state: &'a mut SessionState<Session>,
    ) -> Result<&'a Page, SessionError> {
        let session = state.open_with(|| self.open_session()).await?;
        Ok(&session.page)
    }

    async fn open_session(&self) -> Result<Session, SessionError> {
        let (browser, mut handler) = match &self.config.cdp_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "connecting to browser over CDP");
                Browser::connect(endpoint.clone())
                    .await
                    .map_err(|e| SessionError::Engine(e.to_string()))?
            }
            None => {
                info!(headless = self.config.headless, "launching browser");
                let mut builder = ChromeConfig::builder().window_size(1920, 1080);
                if !self.config.headless {
                    builder = builder.with_head();
                }
                if let Some(dir) = &self.config.profile_dir {
                    builder = builder.user_data_dir(dir);
                }
                let config = builder.build().map_err(SessionError::Engine)?;
                Browser::launch(config).await.map_err(|e| SessionError::Engine(e.to_string()))?
            }
        };

        // The event stream must be drained for the connection to function.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Engine(e.to_string()))?;
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(SessionError::Engine)?;
        page.execute(user_agent).await.map_err(|e| SessionError::Engine(e.to_string()))?;

        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_JS)
            .build()
            .map_err(SessionError::Engine)?;
        page.execute(stealth).await.map_err(|e| SessionError::Engine(e.to_string()))?;

        page.goto(self.config.base_url.as_str())
            .await
            .map_err(|e| SessionError::Engine(e.to_string()))?;
        if let Err(error) = page.wait_for_navigation().await {
            debug!(%error, "initial navigation settle failed");
        }

        info!(base_url = %self.config.base_url, "browser session opened");
        Ok(Session { browser, page, handler: handler_task })
    }
}

/// Evaluate an expression on the page, awaiting promises and returning the
/// result by value. A thrown script maps to `SessionError::Script`.
async fn eval(page: &Page, expression: String) -> Result<Value, SessionError> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(SessionError::Engine)?;
    let result =
        page.evaluate(params).await.map_err(|e| SessionError::Script(e.to_string()))?;
    Ok(result.value().cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn second_acquire_reuses_the_open_session() {
        let mut state: SessionState<u32> = SessionState::Closed;
        let mut opens = 0;

        for _ in 0..2 {
            let session = state
                .open_with(|| {
                    opens += 1;
                    async { Ok::<_, SessionError>(7) }
                })
                .await
                .unwrap();
            assert_eq!(*session, 7);
        }

        assert!(state.is_open());
        assert_eq!(opens, 1, "the engine must be started exactly once");
    }

    #[tokio::test]
    async fn a_failed_open_leaves_the_state_closed() {
        let mut state: SessionState<u32> = SessionState::Closed;

        let result = state
            .open_with(|| async { Err::<u32, _>(SessionError::Engine("no browser".into())) })
            .await;

        assert!(result.is_err());
        assert!(!state.is_open());
    }

    #[tokio::test]
    async fn close_after_open_drops_all_handles_and_returns_to_closed() {
        struct Handle {
            _alive: Arc<()>,
        }

        let alive = Arc::new(());
        let mut state: SessionState<Handle> = SessionState::Closed;
        state
            .open_with(|| async { Ok::<_, SessionError>(Handle { _alive: alive.clone() }) })
            .await
            .unwrap();
        assert!(state.is_open());

        drop(state.close());
        assert!(!state.is_open());
        assert_eq!(Arc::strong_count(&alive), 1, "the session handle must be dropped");
        assert!(state.close().is_none(), "a second close is a no-op");
    }

    #[tokio::test]
    async fn new_manager_starts_closed() {
        let manager = SessionManager::new(SessionConfig::new("https://example.test"));
        assert!(!manager.is_open().await);
    }

    #[tokio::test]
    async fn release_on_never_opened_session_is_a_no_op() {
        let manager = SessionManager::new(SessionConfig::new("https://example.test"));
        manager.release().await;
        manager.release().await;
        assert!(!manager.is_open().await);
    }

    #[tokio::test]
    async fn screenshot_requires_an_open_session() {
        let manager = SessionManager::new(SessionConfig::new("https://example.test"));
        assert_eq!(manager.screenshot("auth_failed").await, Err(SessionError::NotOpen));
    }
}
