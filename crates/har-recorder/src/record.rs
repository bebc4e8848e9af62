use crate::observe::Capture;
use crate::timing::{Timed, TimingTracker};
use chrono::{DateTime, Utc};
use http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::sync::Arc;

/// RequestHead is the portion of a request which is retained for recording,
/// while the request itself is handed off to the transport.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }
}

/// ResponseHead is the portion of a response which is retained for recording,
/// while the response itself is handed back to the caller.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn from_response<B>(rsp: &http::Response<B>) -> Self {
        Self {
            status: rsp.status(),
            version: rsp.version(),
            headers: rsp.headers().clone(),
        }
    }
}

/// TripReport gathers everything known about a single recorded call,
/// from the moment it starts until its entry is delivered.
pub struct TripReport {
    pub tracker: Arc<TimingTracker>,
    pub page_ref: Option<String>,
    pub request: RequestHead,
    /// Capture of the request body, if the request had one.
    pub request_body: Option<Arc<Capture>>,
    pub response: Option<ResponseHead>,
    pub response_body: Option<Arc<Capture>>,
    /// Error of the transport, if it failed.
    pub error: Option<String>,
}

impl TripReport {
    /// Assemble the finished entry of this report.
    pub fn into_entry(self) -> har::Entry {
        let Timed {
            started_date_time,
            time,
            timings,
            server_ip_address,
            connection,
        } = self.tracker.finish();

        har::Entry {
            pageref: self.page_ref,
            started_date_time,
            time,
            request: record_request(&self.request, self.request_body.as_deref()),
            response: record_response(
                self.response.as_ref(),
                self.response_body.as_deref(),
                self.error,
            ),
            cache: har::Cache::default(),
            timings,
            server_ip_address,
            connection,
            comment: None,
        }
    }
}

fn record_request(head: &RequestHead, body: Option<&Capture>) -> har::Request {
    let query_string = head
        .uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(name, value)| har::QueryString {
                    name: name.into_owned(),
                    value: value.into_owned(),
                    comment: None,
                })
                .collect()
        })
        .unwrap_or_default();

    let post_data = body.map(|body| har::PostData {
        mime_type: header_str(&head.headers, CONTENT_TYPE).to_string(),
        text: encode_body(&body.bytes()),
        comment: None,
    });

    har::Request {
        method: head.method.to_string(),
        url: head.uri.to_string(),
        http_version: format!("{:?}", head.version),
        cookies: request_cookies(&head.headers),
        headers: record_headers(&head.headers),
        query_string,
        post_data,
        headers_size: headers_size(&head.headers),
        body_size: body.map(|b| b.len() as i64).unwrap_or(0),
        comment: None,
    }
}

fn record_response(
    head: Option<&ResponseHead>,
    body: Option<&Capture>,
    error: Option<String>,
) -> har::Response {
    let Some(head) = head else {
        // The transport failed before a response was received.
        return har::Response {
            headers_size: -1,
            body_size: -1,
            error,
            ..Default::default()
        };
    };
    let size = body.map(|b| b.len() as i64).unwrap_or(0);

    har::Response {
        status: head.status.as_u16(),
        status_text: head.status.canonical_reason().unwrap_or_default().to_string(),
        http_version: format!("{:?}", head.version),
        cookies: response_cookies(&head.headers),
        headers: record_headers(&head.headers),
        content: har::Content {
            size,
            compression: None,
            mime_type: header_str(&head.headers, CONTENT_TYPE).to_string(),
            text: body.map(|b| encode_body(&b.bytes())),
            comment: None,
        },
        redirect_url: header_str(&head.headers, LOCATION).to_string(),
        headers_size: headers_size(&head.headers),
        body_size: size,
        comment: None,
        error,
    }
}

/// Encode a captured body as text: UTF-8 bodies are used as-is,
/// and all others are standard base64.
pub fn encode_body(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => base64::encode(body),
    }
}

/// Estimate the size of a header block as it appeared on the wire:
/// "Name: Value\r\n" for each value, and a final "\r\n".
/// The start line isn't included.
pub fn headers_size(headers: &HeaderMap) -> i64 {
    let per_line = ": ".len() + "\r\n".len();

    let size: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.as_bytes().len() + per_line)
        .sum();

    (size + "\r\n".len()) as i64
}

fn record_headers(headers: &HeaderMap) -> Vec<har::Header> {
    headers
        .iter()
        .map(|(name, value)| har::Header {
            name: name.to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            comment: None,
        })
        .collect()
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Parse the cookies of all Cookie request headers.
fn request_cookies(headers: &HeaderMap) -> Vec<har::Cookie> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some(har::Cookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                ..Default::default()
            })
        })
        .collect()
}

/// Parse the cookies of all Set-Cookie response headers.
fn response_cookies(headers: &HeaderMap) -> Vec<har::Cookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

fn parse_set_cookie(line: &str) -> Option<har::Cookie> {
    let mut parts = line.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;

    let mut cookie = har::Cookie {
        name: name.trim().to_string(),
        value: value.trim().trim_matches('"').to_string(),
        ..Default::default()
    };

    for attr in parts {
        let (key, value) = match attr.trim().split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (attr.trim(), ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "path" => cookie.path = Some(value.to_string()),
            "domain" => cookie.domain = Some(value.to_string()),
            "expires" => {
                cookie.expires = DateTime::parse_from_rfc2822(value)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            "secure" => cookie.secure = Some(true),
            "httponly" => cookie.http_only = Some(true),
            _ => {}
        }
    }
    Some(cookie)
}

#[cfg(test)]
mod test {
    use super::*;
    use http::HeaderValue;

    fn head(uri: &str, headers: &[(&'static str, &'static str)]) -> RequestHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        RequestHead {
            method: Method::GET,
            uri: uri.parse().unwrap(),
            version: Version::HTTP_11,
            headers: map,
        }
    }

    #[test]
    fn test_query_string_pairs() {
        let req = record_request(&head("http://example.com/?foo=bar&baz", &[]), None);
        let mut qs: Vec<_> = req
            .query_string
            .iter()
            .map(|q| (q.name.as_str(), q.value.as_str()))
            .collect();
        qs.sort();
        assert_eq!(qs, vec![("baz", ""), ("foo", "bar")]);

        let req = record_request(&head("http://example.com/?a=1&a=2&b=%20x", &[]), None);
        let qs: Vec<_> = req
            .query_string
            .iter()
            .map(|q| (q.name.as_str(), q.value.as_str()))
            .collect();
        assert_eq!(qs, vec![("a", "1"), ("a", "2"), ("b", " x")]);
    }

    #[test]
    fn test_headers_size() {
        let mut headers = HeaderMap::new();
        headers.insert("foo", HeaderValue::from_static("Bar"));
        let expect = "foo".len() + "Bar".len() + ": ".len() + "\r\n".len() + "\r\n".len();
        assert_eq!(headers_size(&headers), expect as i64);

        assert_eq!(headers_size(&HeaderMap::new()), 2);

        headers.append("foo", HeaderValue::from_static("Baz"));
        assert_eq!(headers_size(&headers), (expect + 10) as i64);
    }

    #[test]
    fn test_encode_body() {
        assert_eq!(encode_body(b"hello"), "hello");
        assert_eq!(encode_body(&[0xff, 0xfe, 0x00]), "//4A");
        assert_eq!(encode_body(b""), "");
    }

    #[test]
    fn test_headers_are_one_pair_per_value() {
        let h = head(
            "http://example.com/",
            &[("accept", "text/html"), ("accept", "application/json"), ("x-one", "1")],
        );
        let req = record_request(&h, None);

        let mut pairs: Vec<_> = req
            .headers
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("accept", "application/json"),
                ("accept", "text/html"),
                ("x-one", "1")
            ]
        );
        assert!(req.post_data.is_none());
        assert_eq!(req.body_size, 0);
        assert_eq!(req.http_version, "HTTP/1.1");
    }

    #[test]
    fn test_request_cookies() {
        let h = head("http://example.com/", &[("cookie", "cookie1=value1; cookie2=value2")]);
        let cookies = record_request(&h, None).cookies;

        assert_eq!(cookies.len(), 2);
        assert_eq!((cookies[0].name.as_str(), cookies[0].value.as_str()), ("cookie1", "value1"));
        assert_eq!((cookies[1].name.as_str(), cookies[1].value.as_str()), ("cookie2", "value2"));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = parse_set_cookie(
            "session=abc123; Path=/; Domain=example.com; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Secure; HttpOnly",
        )
        .unwrap();

        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(
            cookie.expires.map(|t| t.to_rfc3339()),
            Some("2015-10-21T07:28:00+00:00".to_string())
        );
        assert_eq!(cookie.secure, Some(true));
        assert_eq!(cookie.http_only, Some(true));

        assert!(parse_set_cookie("malformed").is_none());
    }

    #[test]
    fn test_failed_response() {
        let rsp = record_response(None, None, Some("connection refused".to_string()));
        assert_eq!(rsp.status, 0);
        assert_eq!(rsp.error.as_deref(), Some("connection refused"));
        assert_eq!(rsp.body_size, -1);
        assert!(rsp.content.text.is_none());
    }
}
