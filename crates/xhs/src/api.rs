//! Signed HTTP client for the platform's private web API.
//!
//! Every call asks the injected [`SignatureBackend`] for `x-s`/`x-t` header
//! values before it goes out, and carries either the session cookie or an
//! anonymous `a1` device identity. Responses share one envelope
//! (`{success, code, msg, data}`); a `success: false` envelope maps to
//! [`XhsError::Platform`].
//!
//! The wire protocol is kept deliberately coarse: request bodies carry only
//! what the named operations need, and opaque responses are returned as raw
//! JSON for the caller to interpret.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, XhsError};
use crate::sign::{SignRequest, SignatureBackend};
use crate::topics::{SuggestTopics, Topic, TopicSuggestion};

const DEFAULT_API_BASE: &str = "https://edith.xiaohongshu.com";
const DEFAULT_UPLOAD_BASE: &str = "https://ros-upload.xiaohongshu.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Response envelope shared by every platform endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Signed client for the platform's private web API.
///
/// The cookie is interior-mutable because login refreshes it mid-flight and
/// expiry clears it; the client itself is shared behind an `Arc` by the
/// session manager, topic resolver, and publisher.
pub struct ApiClient {
    http: Client,
    base_url: String,
    upload_base: String,
    signer: Arc<dyn SignatureBackend>,
    cookie: RwLock<Option<String>>,
    a1: RwLock<String>,
}

impl ApiClient {
    /// Build a client against the production API host.
    pub fn new(signer: Arc<dyn SignatureBackend>) -> Result<Self> {
        Self::with_base_url(signer, DEFAULT_API_BASE)
    }

    /// Build a client against an explicit API host. Used by tests to point at
    /// a local mock server.
    pub fn with_base_url(signer: Arc<dyn SignatureBackend>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            signer,
            cookie: RwLock::new(None),
            a1: RwLock::new(random_a1()),
        })
    }

    /// Override the image upload host. Used by tests.
    pub fn set_upload_base(&mut self, base: impl Into<String>) {
        self.upload_base = base.into();
    }

    /// Replace the session cookie. The `a1` device identity is re-derived
    /// from the cookie when present; clearing the cookie keeps the existing
    /// identity so anonymous signing stays stable.
    pub fn set_cookie(&self, cookie: Option<String>) {
        if let Some(a1) = cookie.as_deref().and_then(extract_a1) {
            *self.a1.write() = a1;
        }
        *self.cookie.write() = cookie;
    }

    #[must_use]
    pub fn cookie(&self) -> Option<String> {
        self.cookie.read().clone()
    }

    /// The `a1` device identity used as the signing seed.
    #[must_use]
    pub fn a1(&self) -> String {
        self.a1.read().clone()
    }

    fn cookie_header(&self) -> String {
        match &*self.cookie.read() {
            Some(cookie) => cookie.clone(),
            None => format!("a1={}", self.a1.read()),
        }
    }

    /// Sign and send one request. Signing failures abort the call - there is
    /// no unsigned fallback.
    async fn send(&self, method: Method, uri: &str, payload: Option<&Value>) -> Result<Response> {
        let sign_request = SignRequest {
            uri: uri.to_string(),
            payload: payload.cloned(),
            a1: self.a1(),
        };
        let signature = self.signer.sign(&sign_request).await?;

        let url = format!("{}{uri}", self.base_url);
        let mut builder = self
            .http
            .request(method, &url)
            .header("x-s", &signature.x_s)
            .header("x-t", &signature.x_t)
            .header(COOKIE, self.cookie_header());
        if let Some(body) = payload {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    async fn call(&self, method: Method, uri: &str, payload: Option<&Value>) -> Result<Value> {
        let response = self.send(method, uri, payload).await?;
        Self::into_data(response).await
    }

    /// Unwrap the response envelope. Bodies are only logged at trace level so
    /// quiet probes stay quiet under the default filter.
    async fn into_data(response: Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;
        tracing::trace!(%status, body = %body, "platform response");

        if !status.is_success() {
            return Err(XhsError::Platform {
                code: i64::from(status.as_u16()),
                msg: body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(XhsError::Platform {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    /// Dispatch an SMS verification code to `phone`.
    pub async fn send_code(&self, phone: &str) -> Result<()> {
        let uri = format!(
            "/api/sns/web/v2/login/send_code?phone={}&zone=86&type=login",
            urlencoding::encode(phone)
        );
        self.call(Method::GET, &uri, None).await?;
        Ok(())
    }

    /// Exchange the SMS code for a mobile token.
    pub async fn check_code(&self, phone: &str, code: &str) -> Result<String> {
        let uri = format!(
            "/api/sns/web/v1/login/check_code?phone={}&zone=86&code={}",
            urlencoding::encode(phone),
            urlencoding::encode(code)
        );
        let data = self.call(Method::GET, &uri, None).await?;
        data.get("mobile_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| XhsError::UnexpectedResponse("check_code returned no mobile_token".to_string()))
    }

    /// Exchange the mobile token for a session. The refreshed cookie arrives
    /// in `Set-Cookie` headers and replaces the client cookie on success.
    pub async fn login_code(&self, phone: &str, mobile_token: &str) -> Result<Value> {
        let payload = json!({
            "mobile": phone,
            "zone": "86",
            "mobile_token": mobile_token,
        });
        let response = self
            .send(Method::POST, "/api/sns/web/v1/login/code", Some(&payload))
            .await?;

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::to_string)
            .collect();
        if !cookies.is_empty() {
            self.set_cookie(Some(cookies.join("; ")));
        }

        Self::into_data(response).await
    }

    /// Lightweight authenticated probe: fetch the session's own profile.
    pub async fn get_self_info(&self) -> Result<Value> {
        self.call(Method::GET, "/api/sns/web/v1/user/selfinfo", None)
            .await
    }

    /// Look up topic suggestions for a keyword.
    pub async fn get_suggest_topic(&self, keyword: &str) -> Result<Vec<TopicSuggestion>> {
        let payload = json!({
            "keyword": keyword,
            "suggest_topic_request": { "title": "", "desc": keyword },
            "page": { "page_size": 20, "page": 1 },
        });
        let data = self
            .call(Method::POST, "/api/sns/web/v1/search/topic", Some(&payload))
            .await?;

        let suggestions = data
            .get("topic_info_dicts")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(suggestions)?)
    }

    /// Create an image note. Images are uploaded first; the note body then
    /// references their file ids. The platform response is returned verbatim.
    pub async fn create_image_note(
        &self,
        title: &str,
        desc: &str,
        images: &[PathBuf],
        topics: &[Topic],
        is_private: bool,
        post_time: &str,
    ) -> Result<Value> {
        let mut image_entries = Vec::with_capacity(images.len());
        for path in images {
            let file_id = self.upload_image(path).await?;
            image_entries.push(json!({
                "file_id": file_id,
                "metadata": { "source": -1 },
                "stickers": { "version": 2, "floating": [] },
            }));
        }

        let payload = json!({
            "common": {
                "type": "normal",
                "note_id": "",
                "title": title,
                "desc": desc,
                "source": "{\"type\":\"web\",\"ids\":\"\",\"extraInfo\":\"{\\\"systemId\\\":\\\"web\\\"}\"}",
                "business_binds": "{\"version\":1}",
                "ats": [],
                "hash_tag": topics,
                "post_loc": {},
                "privacy_info": { "op_type": 1, "type": i32::from(is_private) },
            },
            "image_info": { "images": image_entries },
            "video_info": null,
            "post_time": post_time,
        });

        self.call(Method::POST, "/api/sns/web/v1/note", Some(&payload))
            .await
    }

    /// Obtain an upload permit and push the image bytes to the upload host.
    async fn upload_image(&self, path: &Path) -> Result<String> {
        let permit = self
            .call(
                Method::GET,
                "/api/media/v1/upload/web/permit?biz_name=spectrum&scene=image&file_count=1&version=1&source=web",
                None,
            )
            .await?;

        let permit = permit
            .get("uploadTempPermits")
            .and_then(Value::as_array)
            .and_then(|permits| permits.first())
            .ok_or_else(|| XhsError::UnexpectedResponse("upload permit missing".to_string()))?;
        let file_id = permit
            .get("fileIds")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
            .ok_or_else(|| XhsError::UnexpectedResponse("upload permit has no file id".to_string()))?
            .to_string();
        let token = permit
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| XhsError::UnexpectedResponse("upload permit has no token".to_string()))?;

        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), file_id, "uploading image");

        let response = self
            .http
            .put(format!("{}/{file_id}", self.upload_base))
            .header("X-Cos-Security-Token", token)
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(XhsError::Platform {
                code: i64::from(status.as_u16()),
                msg: format!("image upload failed for {}", path.display()),
            });
        }

        Ok(file_id)
    }
}

#[async_trait]
impl SuggestTopics for ApiClient {
    async fn suggest_topic(&self, keyword: &str) -> Result<Vec<TopicSuggestion>> {
        self.get_suggest_topic(keyword).await
    }
}

/// Pull the `a1` value out of a cookie string.
fn extract_a1(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("a1=").map(str::to_string))
}

/// Generate an anonymous device identity for sessions with no cookie yet.
fn random_a1() -> String {
    use rand::Rng;
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..52).map(|_| HEX[rng.gen_range(0..HEX.len())] as char).collect()
}
