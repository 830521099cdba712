//! Choosing between structured and HTML responses.

use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use vmctl_core::sxp::MIME_TYPE;

/// Decides per request whether the client wants the structured format.
pub trait ContentNegotiator: Send + Sync {
    fn use_structured(&self, headers: &HeaderMap) -> bool;
}

impl<F> ContentNegotiator for F
where
    F: Fn(&HeaderMap) -> bool + Send + Sync,
{
    fn use_structured(&self, headers: &HeaderMap) -> bool {
        self(headers)
    }
}

/// Structured when any `Accept` header lists `application/sxp` with a
/// non-zero quality. Everything else, including no `Accept` at all, is HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptHeaderNegotiator;

impl ContentNegotiator for AcceptHeaderNegotiator {
    fn use_structured(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(accepts_structured)
    }
}

fn accepts_structured(entry: &str) -> bool {
    let mut parts = entry.split(';');
    let media_type = parts.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(MIME_TYPE) {
        return false;
    }
    // A quality of zero means "not acceptable".
    !parts.any(|param| {
        param
            .trim()
            .strip_prefix("q=")
            .and_then(|q| q.trim().parse::<f32>().ok())
            .is_some_and(|q| q <= 0.0)
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn sxp_accept_is_structured() {
        let negotiator = AcceptHeaderNegotiator;
        assert!(negotiator.use_structured(&accept("application/sxp")));
        assert!(negotiator.use_structured(&accept("text/html, Application/SXP;q=0.5")));
    }

    #[test]
    fn everything_else_is_html() {
        let negotiator = AcceptHeaderNegotiator;
        assert!(!negotiator.use_structured(&HeaderMap::new()));
        assert!(!negotiator.use_structured(&accept("text/html")));
        assert!(!negotiator.use_structured(&accept("*/*")));
        assert!(!negotiator.use_structured(&accept("application/sxp;q=0")));
    }

    #[test]
    fn closures_are_negotiators() {
        let always: Box<dyn ContentNegotiator> = Box::new(|_: &HeaderMap| true);
        assert!(always.use_structured(&HeaderMap::new()));
    }
}
