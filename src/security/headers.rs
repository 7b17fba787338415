//! Security headers for HTTP responses

/// Strict Content Security Policy for JSON API responses
const STRICT_CSP: &str = "default-src 'none'; connect-src 'self'; frame-ancestors 'none';";

/// Policy for the HTML pages, which carry the inline client-side login guard
const PAGE_CSP: &str = "default-src 'self'; script-src 'self' 'unsafe-inline'; object-src 'none'; frame-ancestors 'none'; base-uri 'self';";

/// Wrap a reply with strict security headers for API endpoints
pub fn with_api_security_headers<T: warp::Reply>(reply: T) -> impl warp::Reply {
    let reply = warp::reply::with_header(reply, "X-Frame-Options", "DENY");
    let reply = warp::reply::with_header(reply, "X-Content-Type-Options", "nosniff");
    let reply = warp::reply::with_header(reply, "Referrer-Policy", "no-referrer");
    let reply = warp::reply::with_header(reply, "Content-Security-Policy", STRICT_CSP);
    warp::reply::with_header(reply, "Cache-Control", "no-cache, no-store, must-revalidate")
}

/// Wrap an HTML page with security headers
pub fn with_page_security_headers<T: warp::Reply>(reply: T) -> impl warp::Reply {
    let reply = warp::reply::with_header(reply, "X-Frame-Options", "DENY");
    let reply = warp::reply::with_header(reply, "X-Content-Type-Options", "nosniff");
    let reply = warp::reply::with_header(reply, "Referrer-Policy", "strict-origin-when-cross-origin");
    warp::reply::with_header(reply, "Content-Security-Policy", PAGE_CSP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Reply;

    #[test]
    fn test_strict_csp_for_api() {
        assert!(STRICT_CSP.contains("default-src 'none'"));
        assert!(STRICT_CSP.contains("frame-ancestors 'none'"));
    }

    #[test]
    fn test_api_headers_applied() {
        let response = with_api_security_headers(warp::reply::json(&"ok")).into_response();
        let headers = response.headers();
        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(headers["Cache-Control"], "no-cache, no-store, must-revalidate");
        assert_eq!(headers["Content-Security-Policy"], STRICT_CSP);
    }
}
