//! Cover image generation.
//!
//! The standard path is the OpenAI-compatible `images/generations` endpoint.
//! Aliyun's wanx models only offer an async submit-then-poll API, so they get
//! a dedicated branch keyed off the configured base URL and model name.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::Engine;
use serde_json::{json, Value};

const DASHSCOPE_SUBMIT_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text2image/image-synthesis";
const DASHSCOPE_TASK_URL: &str = "https://dashscope.aliyuncs.com/api/v1/tasks";
const POLL_ATTEMPTS: u32 = 60;
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Text-to-image client.
pub struct ImageGenerator {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl ImageGenerator {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Generate one image and write it to `save_path`.
    pub async fn generate(&self, prompt: &str, save_path: &Path, size: &str) -> Result<PathBuf> {
        if self.base_url.contains("dashscope") && self.model.contains("wanx") {
            self.generate_wanx(prompt, save_path, size).await
        } else {
            self.generate_standard(prompt, save_path, size).await
        }
    }

    async fn generate_standard(&self, prompt: &str, save_path: &Path, size: &str) -> Result<PathBuf> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "size": size,
            "n": 1,
        });
        let response: Value = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .context("image generation request failed")?
            .json()
            .await?;

        let item = response
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.first())
            .context("image response carried no data")?;

        if let Some(b64) = item.get("b64_json").and_then(Value::as_str) {
            return self.save_base64(b64, save_path);
        }
        let url = item
            .get("url")
            .and_then(Value::as_str)
            .context("image response carried neither b64_json nor url")?;
        self.download(url, save_path).await
    }

    /// Submit a wanx task and poll until it settles.
    async fn generate_wanx(&self, prompt: &str, save_path: &Path, size: &str) -> Result<PathBuf> {
        let body = json!({
            "model": self.model,
            "input": { "prompt": prompt },
            "parameters": { "size": size.replace('x', "*"), "n": 1 },
        });
        let submitted: Value = self
            .http
            .post(DASHSCOPE_SUBMIT_URL)
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let task_id = submitted["output"]["task_id"]
            .as_str()
            .context("wanx submission returned no task id")?
            .to_string();
        tracing::debug!(task_id, "wanx task submitted");

        for _ in 0..POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;
            let result: Value = self
                .http
                .get(format!("{DASHSCOPE_TASK_URL}/{task_id}"))
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match result["output"]["task_status"].as_str() {
                Some("SUCCEEDED") => {
                    let url = result["output"]["results"][0]["url"]
                        .as_str()
                        .context("wanx result carried no image url")?;
                    return self.download(url, save_path).await;
                }
                Some("FAILED") => {
                    let msg = result["message"].as_str().unwrap_or("unknown error");
                    bail!("image generation failed: {msg}");
                }
                _ => {}
            }
        }
        bail!("image generation timed out")
    }

    async fn download(&self, url: &str, save_path: &Path) -> Result<PathBuf> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        write_image(save_path, &bytes)?;
        Ok(save_path.to_path_buf())
    }

    fn save_base64(&self, b64: &str, save_path: &Path) -> Result<PathBuf> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .context("image payload was not valid base64")?;
        write_image(save_path, &bytes)?;
        Ok(save_path.to_path_buf())
    }
}

fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "image saved");
    Ok(())
}
