//! 隧道就绪探测

use log::debug;
use serde_json::Value;
use std::time::Duration;

/// ngrok 本地管理接口
pub const NGROK_API_URL: &str = "http://localhost:4040/api/tunnels";

/// 查询隧道是否就绪
///
/// 返回 `Ok(None)` 表示隧道还没有公网地址，调用方会继续轮询。
#[async_trait::async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn public_url(&self) -> anyhow::Result<Option<String>>;
}

/// 通过 ngrok 本地 API 获取公网地址
pub struct NgrokApiProbe {
    http: reqwest::Client,
    api_url: String,
}

impl NgrokApiProbe {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_api_url(NGROK_API_URL)
    }

    pub fn with_api_url(api_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ReadinessProbe for NgrokApiProbe {
    async fn public_url(&self) -> anyhow::Result<Option<String>> {
        let resp = self
            .http
            .get(&self.api_url)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        let url = https_public_url(&body);
        debug!("ngrok API reports public url: {:?}", url);
        Ok(url)
    }
}

/// 第一个 `proto == "https"` 的隧道的 `public_url`
pub fn https_public_url(body: &Value) -> Option<String> {
    body.get("tunnels")?
        .as_array()?
        .iter()
        .find(|t| t.get("proto").and_then(Value::as_str) == Some("https"))?
        .get("public_url")?
        .as_str()
        .map(str::to_string)
}
