use reqwest::Url;

use crate::client::ClientError;

/// 规范化用户输入的服务器地址
///
/// - 没有 `http://` / `https://` 前缀时补上 `https://`
/// - 去掉一个结尾的 `/`
pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    let mut url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    if url.ends_with('/') {
        url.pop();
    }
    url
}

/// 在基础地址后追加路径段，每段单独做百分号编码
pub(crate) fn build_endpoint(base: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidUrl(format!("{base}: cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_https() {
        assert_eq!(normalize_server_url("example.com"), "https://example.com");
    }

    #[test]
    fn test_strips_one_trailing_slash() {
        assert_eq!(normalize_server_url("http://x/"), "http://x");
        assert_eq!(normalize_server_url("http://x//"), "http://x/");
    }

    #[test]
    fn test_keeps_existing_scheme() {
        assert_eq!(
            normalize_server_url("http://localhost:5000"),
            "http://localhost:5000"
        );
        assert_eq!(
            normalize_server_url("  https://abc.ngrok.app/ "),
            "https://abc.ngrok.app"
        );
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let url = build_endpoint("http://localhost:5000", &["files"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/files");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = build_endpoint("https://host/share", &["download", "a.txt"]).unwrap();
        assert_eq!(url.as_str(), "https://host/share/download/a.txt");
    }

    #[test]
    fn test_endpoint_encodes_filename() {
        let url = build_endpoint("http://h", &["download", "my file?#/x.txt"]).unwrap();
        assert_eq!(url.as_str(), "http://h/download/my%20file%3F%23%2Fx.txt");
    }

    #[test]
    fn test_root_endpoint() {
        let url = build_endpoint("http://h:1", &[""]).unwrap();
        assert_eq!(url.as_str(), "http://h:1/");
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(
            build_endpoint("not a url", &["files"]),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
