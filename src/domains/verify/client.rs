use async_trait::async_trait;
use serde_json::json;
use shared::{Result, ServiceClient, VerificationResult, VerifyKind, VerifyResponse};
use tracing::{info, instrument, warn};

const SERVICE_NAME: &str = "coupon-server";
const CSRF_COOKIE: &str = "csrftoken";
const VERIFY_PAGE: &str = "/coupon/verify/";

/// Remote verification of a coupon token.
///
/// `Ok` carries whatever the server decided, including rejections. `Err` is
/// reserved for transport failures and unreadable bodies.
#[async_trait]
pub trait CouponVerifier: Send + Sync {
    async fn verify(&self, kind: VerifyKind, token: &str) -> Result<VerificationResult>;
}

/// Builds `/coupon/api/verify/{uuid|manual}/{token}/` with the token as a
/// single percent-encoded path segment.
pub fn verify_endpoint(kind: VerifyKind, token: &str) -> String {
    format!(
        "/coupon/api/verify/{}/{}/",
        kind.path_segment(),
        urlencoding::encode(token)
    )
}

/// Looks up one cookie in a `name=value; other=value` string. Values are
/// percent-decoded; a value that fails to decode is returned raw.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
}

/// Verifier talking to the coupon server with the station's session cookies.
#[derive(Debug, Clone)]
pub struct HttpCouponVerifier {
    client: ServiceClient,
    cookies: String,
    csrf_token: Option<String>,
}

impl HttpCouponVerifier {
    pub fn new(base_url: String, cookies: String, timeout_seconds: u64) -> Result<Self> {
        let client = ServiceClient::new(base_url, SERVICE_NAME.to_string(), timeout_seconds)?;
        let csrf_token = cookie_value(&cookies, CSRF_COOKIE);
        if csrf_token.is_none() {
            warn!("⚠️ No {} cookie configured; verification requests will lack X-CSRFToken", CSRF_COOKIE);
        }

        Ok(Self {
            client,
            cookies,
            csrf_token,
        })
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Referer", format!("{}{}", self.client.base_url(), VERIFY_PAGE))];
        if !self.cookies.trim().is_empty() {
            headers.push(("Cookie", self.cookies.clone()));
        }
        if let Some(token) = &self.csrf_token {
            headers.push(("X-CSRFToken", token.clone()));
        }
        headers
    }
}

#[async_trait]
impl CouponVerifier for HttpCouponVerifier {
    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn verify(&self, kind: VerifyKind, token: &str) -> Result<VerificationResult> {
        let endpoint = verify_endpoint(kind, token);
        let (status, body): (_, VerifyResponse) = self
            .client
            .post_with_headers(&endpoint, &json!({}), &self.headers())
            .await?;

        let result = VerificationResult::from_response(status.is_success(), body);
        match &result {
            VerificationResult::Success { target_product, .. } => {
                info!("✅ Coupon redeemed: {}", target_product)
            }
            VerificationResult::Failure { error } => {
                warn!("❌ Coupon rejected (HTTP {}): {}", status, error)
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_finds_trimmed_entry() {
        let cookies = "sessionid=abc; csrftoken=tok%2Ben ;other=1";
        assert_eq!(cookie_value(cookies, "csrftoken").as_deref(), Some("tok+en"));
        assert_eq!(cookie_value(cookies, "other").as_deref(), Some("1"));
        assert_eq!(cookie_value(cookies, "missing"), None);
    }

    #[test]
    fn test_cookie_value_does_not_match_suffix_names() {
        assert_eq!(cookie_value("xcsrftoken=bad", "csrftoken"), None);
        assert_eq!(cookie_value("", "csrftoken"), None);
    }

    #[test]
    fn test_endpoint_encodes_token_as_one_segment() {
        assert_eq!(
            verify_endpoint(VerifyKind::Qr, "3f2b8c4e-1d2a-4f6b-9e7a-0c1d2e3f4a5b"),
            "/coupon/api/verify/uuid/3f2b8c4e-1d2a-4f6b-9e7a-0c1d2e3f4a5b/"
        );
        assert_eq!(
            verify_endpoint(VerifyKind::Manual, "A1/B 2"),
            "/coupon/api/verify/manual/A1%2FB%202/"
        );
    }

    #[test]
    fn test_headers_carry_csrf_cookie_and_referer() {
        let verifier = HttpCouponVerifier::new(
            "https://coupons.example.com".to_string(),
            "csrftoken=abc123; sessionid=s1".to_string(),
            5,
        )
        .unwrap();
        let headers = verifier.headers();
        assert!(headers.contains(&("X-CSRFToken", "abc123".to_string())));
        assert!(headers.contains(&("Cookie", "csrftoken=abc123; sessionid=s1".to_string())));
        assert!(headers.contains(&("Referer", "https://coupons.example.com/coupon/verify/".to_string())));
    }

    #[test]
    fn test_headers_without_cookies_skip_csrf() {
        let verifier =
            HttpCouponVerifier::new("http://localhost:8000".to_string(), String::new(), 5).unwrap();
        let headers = verifier.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Referer");
    }
}
