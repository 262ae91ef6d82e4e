pub mod auth;

use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::request::Parts as ReqParts;
use http::{HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::util::env::{self, EnvErr};

pub type MiddlewareResult<T> = core::result::Result<T, MiddlewareErr>;

#[derive(Debug, Error)]
pub enum MiddlewareErr {
    #[error(transparent)]
    EnvErr(#[from] EnvErr),
}

/// `*` (or an empty list) allows any origin; anything else is matched as a suffix, so
/// `example.com` also admits `https://book.example.com`.
pub async fn cors() -> MiddlewareResult<CorsLayer> {
    let origins = env::env().await?.cors_allow_origins.clone();
    Ok(cors_layer(origins))
}

pub fn cors_layer(origins: Vec<String>) -> CorsLayer {
    let origins = origins
        .into_iter()
        .map(|o| o.trim().to_owned())
        .filter(|o| !o.is_empty())
        .collect::<Vec<_>>();

    let allowed = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::predicate(move |org: &HeaderValue, _: &ReqParts| {
            origin_allowed(&origins, org.as_bytes())
        })
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_origin(allowed)
}

fn origin_allowed(origins: &[String], origin: &[u8]) -> bool {
    origins.iter().any(|o| origin.ends_with(o.as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_origin_suffix_match() {
        let origins = vec!["example.com".to_string(), "salon.app".to_string()];

        assert!(origin_allowed(&origins, b"https://book.example.com"));
        assert!(origin_allowed(&origins, b"http://salon.app"));
        assert!(!origin_allowed(&origins, b"https://example.com.evil.io"));
        assert!(!origin_allowed(&[], b"https://example.com"));
    }
}
