//! Browser-based signing using chromiumoxide.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::{Result, XhsError};

use super::{sign_with_attempts, SignRequest, SignatureBackend, SignatureHeaders};

/// Configuration for [`BrowserSigner`].
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Bounded retry count. Signing latency gates every other session
    /// operation, so exhaustion is fatal rather than retried higher up.
    pub max_attempts: u32,
    /// How long to let the page settle after the cookie-injection reload
    /// before invoking the signing script.
    pub settle_delay: Duration,
    /// Run the browser headless.
    pub headless: bool,
    /// Launch a fresh browser process for every attempt so no page state
    /// leaks between attempts. Disabling reuses one browser across the
    /// attempts of a single `sign` call, never across calls.
    pub fresh_browser_per_attempt: bool,
    /// Landing page that loads the platform's signing script.
    pub landing_url: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            settle_delay: Duration::from_secs(2),
            headless: true,
            fresh_browser_per_attempt: true,
            landing_url: "https://www.xiaohongshu.com".to_string(),
        }
    }
}

/// Signs requests by evaluating the platform's in-page signing script in a
/// disposable headless browser.
///
/// Each attempt opens the landing page, injects the `a1` identity cookie for
/// the platform domain, reloads so the page picks the identity up, and then
/// calls `window._webmsxyw(uri, payload)` to obtain the header values.
pub struct BrowserSigner {
    config: SignerConfig,
}

impl BrowserSigner {
    #[must_use]
    pub fn new(config: SignerConfig) -> Self {
        Self { config }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>)> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-dev-shm-usage"); // Avoid /dev/shm size issues in containers
        if !self.config.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| XhsError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;

        // Spawn handler task
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    async fn shutdown(mut browser: Browser, handle: JoinHandle<()>) {
        if let Err(err) = browser.close().await {
            tracing::debug!(error = %err, "browser close failed");
        }
        let _ = handle.await;
    }

    async fn sign_once_fresh(&self, request: &SignRequest) -> Result<SignatureHeaders> {
        let (browser, handle) = self.launch().await?;
        let result = self.sign_on(&browser, request).await;
        Self::shutdown(browser, handle).await;
        result
    }

    async fn sign_on(&self, browser: &Browser, request: &SignRequest) -> Result<SignatureHeaders> {
        let page = browser
            .new_page(self.config.landing_url.as_str())
            .await
            .map_err(browser_err)?;

        self.inject_identity(&page, &request.a1).await?;
        tokio::time::sleep(self.config.settle_delay).await;

        let expression = sign_expression(&request.uri, request.payload.as_ref())?;
        let value: Value = page
            .evaluate(expression)
            .await
            .map_err(browser_err)?
            .into_value()
            .map_err(|e| XhsError::Browser(format!("signing script returned no value: {e}")))?;

        parse_signature(&value)
    }

    async fn inject_identity(&self, page: &Page, a1: &str) -> Result<()> {
        let cookie = CookieParam::builder()
            .name("a1")
            .value(a1)
            .domain(".xiaohongshu.com")
            .path("/")
            .build()
            .map_err(|e| XhsError::Browser(format!("failed to build a1 cookie: {e}")))?;
        page.set_cookie(cookie).await.map_err(browser_err)?;
        // Reload so the signing script sees the injected identity.
        page.reload().await.map_err(browser_err)?;
        Ok(())
    }
}

impl Default for BrowserSigner {
    fn default() -> Self {
        Self::new(SignerConfig::default())
    }
}

#[async_trait]
impl SignatureBackend for BrowserSigner {
    async fn sign(&self, request: &SignRequest) -> Result<SignatureHeaders> {
        if self.config.fresh_browser_per_attempt {
            sign_with_attempts(self.config.max_attempts, |_| {
                Box::pin(self.sign_once_fresh(request))
            })
            .await
        } else {
            let (browser, handle) = self.launch().await?;
            let result = sign_with_attempts(self.config.max_attempts, |_| {
                Box::pin(self.sign_on(&browser, request))
            })
            .await;
            Self::shutdown(browser, handle).await;
            result
        }
    }
}

fn browser_err(err: chromiumoxide::error::CdpError) -> XhsError {
    XhsError::Browser(err.to_string())
}

/// Build the expression evaluated against the platform page. Arguments are
/// embedded as JSON literals so arbitrary URIs and payloads stay intact.
fn sign_expression(uri: &str, payload: Option<&Value>) -> Result<String> {
    let uri_json = serde_json::to_string(uri)?;
    let payload_json = match payload {
        Some(value) => serde_json::to_string(value)?,
        None => "null".to_string(),
    };
    Ok(format!("window._webmsxyw({uri_json}, {payload_json})"))
}

/// Extract the two header values from the signing script's return value.
/// `X-t` arrives as a number and is carried as a string header.
fn parse_signature(value: &Value) -> Result<SignatureHeaders> {
    let x_s = value
        .get("X-s")
        .and_then(Value::as_str)
        .ok_or_else(|| XhsError::Browser("signing script returned no X-s".to_string()))?
        .to_string();

    let x_t = match value.get("X-t") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Err(XhsError::Browser("signing script returned no X-t".to_string())),
    };

    Ok(SignatureHeaders { x_s, x_t })
}
