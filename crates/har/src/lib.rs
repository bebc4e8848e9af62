//! Types of the HTTP Archive (HAR) 1.2 interchange format.
//!
//! Only the portion of the format which a recorder populates is modeled here,
//! plus the Chrome `_error` extension used to carry transport failures.
//! Optional fields which are unset are omitted from serialized output.
//!
//! The format is described at: http://www.softwareishard.com/blog/har-12-spec/
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing value used by the format for phases which don't apply to a request.
pub const NOT_APPLICABLE: f64 = -1.0;

/// Convert a Duration into fractional milliseconds, which is the unit of all
/// durations in the format.
pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// HttpArchive is the root document of a HAR file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HttpArchive {
    pub log: Log,
}

/// Log holds everything recorded during a recording session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Version number of the format.
    pub version: String,
    /// Application which created the archive.
    pub creator: Agent,
    /// Application which performed the recorded network activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<Agent>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Agent names the creator or browser of a log.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Agent {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Page groups a number of entries under a logical page load.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub started_date_time: DateTime<Utc>,
    /// Unique identifier of the page within the log.
    /// Entries refer to their page through `Entry::pageref`.
    pub id: String,
    pub title: String,
    pub page_timings: PageTimings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// PageTimings are offsets in milliseconds from `Page::started_date_time`,
/// or NOT_APPLICABLE.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageTimings {
    pub on_content_loaded: f64,
    pub on_load: f64,
}

impl Default for PageTimings {
    fn default() -> Self {
        Self {
            on_content_loaded: NOT_APPLICABLE,
            on_load: NOT_APPLICABLE,
        }
    }
}

/// Entry is a single recorded request and its response.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pageref: Option<String>,
    pub started_date_time: DateTime<Utc>,
    /// Total elapsed time of the request, in milliseconds.
    pub time: f64,
    pub request: Request,
    pub response: Response,
    /// Always present, as some viewers refuse entries with a missing cache.
    pub cache: Cache,
    pub timings: Timings,
    #[serde(
        default,
        rename = "serverIPAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_ip_address: Option<String>,
    /// Identifier of the underlying connection, typically its port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<Header>,
    pub query_string: Vec<QueryString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    /// Bytes from the start of the message through the blank line which
    /// ends the header block, or -1 if unknown.
    pub headers_size: i64,
    /// Bytes of request body, or -1 if unknown.
    pub body_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<Header>,
    pub content: Content,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    pub headers_size: i64,
    pub body_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Chrome extension: error which prevented a response from being received.
    #[serde(default, rename = "_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QueryString {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// PostData describes a request body. Despite its name it applies to
/// requests of any method.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub mime_type: String,
    /// Body text. Bodies which aren't valid UTF-8 are base64 encoded.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Content describes a response body.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<i64>,
    pub mime_type: String,
    /// Body text. Bodies which aren't valid UTF-8 are base64 encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Timings break the total time of an entry into phases, each in
/// milliseconds. Phases which didn't occur are NOT_APPLICABLE.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    /// Time spent waiting for a network connection.
    pub blocked: f64,
    /// Time spent resolving the host name.
    pub dns: f64,
    /// Time spent establishing a TCP connection.
    pub connect: f64,
    /// Time spent sending the request.
    pub send: f64,
    /// Time spent waiting for the first byte of the response.
    pub wait: f64,
    /// Time spent reading the entire response.
    pub receive: f64,
    /// Time spent negotiating TLS. Included in `connect` as well.
    pub ssl: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            blocked: NOT_APPLICABLE,
            dns: NOT_APPLICABLE,
            connect: NOT_APPLICABLE,
            send: 0.0,
            wait: 0.0,
            receive: 0.0,
            ssl: NOT_APPLICABLE,
            comment: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_millis_are_fractional() {
        assert_eq!(millis(Duration::from_micros(1500)), 1.5);
        assert_eq!(millis(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_page_serialization() {
        let page = Page {
            started_date_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            id: "page_1".to_string(),
            title: "Landing".to_string(),
            page_timings: PageTimings {
                on_load: 250.5,
                ..Default::default()
            },
            comment: None,
        };

        insta::assert_json_snapshot!(page, @r###"
        {
          "startedDateTime": "2024-03-01T12:30:00Z",
          "id": "page_1",
          "title": "Landing",
          "pageTimings": {
            "onContentLoaded": -1.0,
            "onLoad": 250.5
          }
        }
        "###);
    }

    #[test]
    fn test_entry_renames_and_omissions() {
        let entry = Entry {
            server_ip_address: Some("127.0.0.1".to_string()),
            response: Response {
                redirect_url: "/elsewhere".to_string(),
                error: Some("connection refused".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["serverIPAddress"], "127.0.0.1");
        assert_eq!(value["response"]["redirectURL"], "/elsewhere");
        assert_eq!(value["response"]["_error"], "connection refused");
        assert_eq!(value["cache"], serde_json::json!({}));
        assert!(value.get("pageref").is_none());
        assert!(value.get("connection").is_none());
        assert!(value["request"].get("postData").is_none());
        assert!(value["response"]["content"].get("text").is_none());

        let back: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
