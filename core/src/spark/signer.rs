use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use url::Url;

use crate::config::Credentials;
use crate::{Result, RouletteError};

type HmacSha256 = Hmac<Sha256>;

/// IMF-fixdate as used by HTTP `Date` headers
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Host and path the signature is computed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub path: String,
    pub base_url: String,
}

impl ConnectionTarget {
    pub fn parse(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| RouletteError::Config(format!("invalid provider url {base_url:?}: {e}")))?;
        if url.host_str().is_none() {
            return Err(RouletteError::Config(format!(
                "provider url {base_url:?} has no host"
            )));
        }
        // signing appends its own query string
        if url.query().is_some() {
            return Err(RouletteError::Config(format!(
                "provider url {base_url:?} must not carry a query"
            )));
        }
        Ok(Self {
            host: authority(base_url).to_string(),
            path: url.path().to_string(),
            base_url: base_url.to_string(),
        })
    }
}

/// `host[:port]` exactly as written. `Url` drops default ports, but the
/// service signs over the authority the client sent.
fn authority(base_url: &str) -> &str {
    let rest = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority)
}

/// Connection descriptor valid for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    pub date: String,
    pub authorization: String,
}

/// Builds time-scoped signed URLs for the chat endpoint
#[derive(Clone)]
pub struct UrlSigner {
    credentials: Credentials,
    target: ConnectionTarget,
}

impl UrlSigner {
    pub fn new(credentials: Credentials, target: ConnectionTarget) -> Self {
        Self {
            credentials,
            target,
        }
    }

    /// Sign for the current second. Never cache the result across connections.
    pub fn sign(&self) -> SignedRequest {
        self.sign_at(Utc::now())
    }

    pub fn sign_at(&self, now: DateTime<Utc>) -> SignedRequest {
        let date = now.format(HTTP_DATE_FORMAT).to_string();
        let signature = self.signature(&date);
        let authorization_origin = format!(
            "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
            self.credentials.api_key, signature
        );
        let authorization = BASE64.encode(authorization_origin.as_bytes());

        let mut url = self.target.base_url.clone();
        url.push('?');
        url.push_str(
            &url::form_urlencoded::Serializer::new(String::new())
                .append_pair("authorization", &authorization)
                .append_pair("date", &date)
                .append_pair("host", &self.target.host)
                .finish(),
        );

        debug!(target: "signer", host = %self.target.host, date = %date, "Signed connection url");
        SignedRequest {
            url,
            date,
            authorization,
        }
    }

    fn signature(&self, date: &str) -> String {
        let origin = format!(
            "host: {}\ndate: {}\nGET {} HTTP/1.1",
            self.target.host, date, self.target.path
        );
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(origin.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> UrlSigner {
        UrlSigner::new(
            Credentials {
                app_id: "app".into(),
                api_key: "test-key".into(),
                api_secret: "test-secret".into(),
            },
            ConnectionTarget::parse("wss://spark-api.xf-yun.com/v4.0/chat").unwrap(),
        )
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_target_parse() {
        let t = ConnectionTarget::parse("wss://spark-api.xf-yun.com/v4.0/chat").unwrap();
        assert_eq!(t.host, "spark-api.xf-yun.com");
        assert_eq!(t.path, "/v4.0/chat");

        let t = ConnectionTarget::parse("ws://127.0.0.1:9001/v1.1/chat").unwrap();
        assert_eq!(t.host, "127.0.0.1:9001");
    }

    #[test]
    fn test_target_keeps_explicit_default_port() {
        let t = ConnectionTarget::parse("wss://spark-api.xf-yun.com:443/v4.0/chat").unwrap();
        assert_eq!(t.host, "spark-api.xf-yun.com:443");

        let s = UrlSigner::new(signer().credentials, t);
        assert!(s
            .sign_at(fixed_time())
            .url
            .ends_with("&host=spark-api.xf-yun.com%3A443"));
    }

    #[test]
    fn test_target_with_query_is_config_error() {
        let err = ConnectionTarget::parse("wss://spark-api.xf-yun.com/v4.0/chat?x=1").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_target_without_host_is_config_error() {
        let err = ConnectionTarget::parse("unix:/tmp/socket").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_date_format() {
        assert_eq!(signer().sign_at(fixed_time()).date, "Sat, 17 Oct 2026 08:30:00 GMT");
    }

    #[test]
    fn test_known_signature() {
        let req = signer().sign_at(fixed_time());
        assert_eq!(
            req.authorization,
            "YXBpX2tleT0idGVzdC1rZXkiLCBhbGdvcml0aG09ImhtYWMtc2hhMjU2IiwgaGVhZGVycz0iaG9zdCBkYXRlIHJlcXVlc3QtbGluZSIsIHNpZ25hdHVyZT0iTHc5aTdOZVk2ZWM4Y1lNT2ViSEpiclcxa1BJVWV2VFVESkREdUllcTBpRT0i"
        );
        assert_eq!(
            req.url,
            "wss://spark-api.xf-yun.com/v4.0/chat?authorization=YXBpX2tleT0idGVzdC1rZXkiLCBhbGdvcml0aG09ImhtYWMtc2hhMjU2IiwgaGVhZGVycz0iaG9zdCBkYXRlIHJlcXVlc3QtbGluZSIsIHNpZ25hdHVyZT0iTHc5aTdOZVk2ZWM4Y1lNT2ViSEpiclcxa1BJVWV2VFVESkREdUllcTBpRT0i&date=Sat%2C+17+Oct+2026+08%3A30%3A00+GMT&host=spark-api.xf-yun.com"
        );
    }

    #[test]
    fn test_authorization_decodes_to_descriptor() {
        let req = signer().sign_at(fixed_time());
        let decoded = String::from_utf8(BASE64.decode(&req.authorization).unwrap()).unwrap();
        assert!(decoded.starts_with("api_key=\"test-key\", algorithm=\"hmac-sha256\""));
        assert!(decoded.contains("headers=\"host date request-line\""));
        assert!(decoded.contains("signature=\"Lw9i7NeY6ec8cYMOebHJbrW1kPIUevTUDJDDuIeq0iE=\""));
    }

    #[test]
    fn test_deterministic_for_same_second() {
        let s = signer();
        assert_eq!(s.sign_at(fixed_time()), s.sign_at(fixed_time()));
    }

    #[test]
    fn test_signature_changes_with_time() {
        let s = signer();
        let later = fixed_time() + chrono::Duration::seconds(1);
        assert_ne!(
            s.sign_at(fixed_time()).authorization,
            s.sign_at(later).authorization
        );
    }
}
