use crate::middleware::redact_header;
use crate::receiver::{checkpoint, CheckpointReceiver, HarFileReceiver, Receiver};
use crate::{Recorder, RecorderBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Config is a declarative description of a Recorder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    /// Name of the recording application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Version of the recording application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Version of the HAR format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub har_version: Option<String>,
    /// Record every request, or only those marked for inclusion.
    #[serde(default = "include_all_default")]
    pub include_all: bool,
    /// Headers whose recorded values are replaced, keyed on header name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub redact_headers: BTreeMap<String, String>,
    /// Destination of recorded entries and pages.
    pub output: Output,
}

fn include_all_default() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
    /// Write a single HAR file, which is re-written on every flush.
    File { path: PathBuf },
    /// Write a rotated sequence of HAR files.
    Checkpoint(CheckpointConfig),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointConfig {
    /// Directory into which files are written.
    pub directory: PathBuf,
    /// Prefix of written file names.
    #[serde(default = "prefix_default")]
    pub prefix: String,
    /// Maximum serialized bytes per file. Zero disables rotation by size.
    #[serde(default = "max_bytes_default")]
    pub max_bytes: u64,
    /// Maximum age of a file, such as "5m" or "1h".
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration: Option<Duration>,
}

fn prefix_default() -> String {
    "har-recorder-".to_string()
}

fn max_bytes_default() -> u64 {
    checkpoint::DEFAULT_MAX_BYTES
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Build the Receiver of this Config's output.
    pub fn build_receiver(&self) -> Arc<dyn Receiver> {
        match &self.output {
            Output::File { path } => Arc::new(HarFileReceiver::new(path)),
            Output::Checkpoint(CheckpointConfig {
                directory,
                prefix,
                max_bytes,
                max_duration,
            }) => Arc::new(
                CheckpointReceiver::new()
                    .with_max_bytes(*max_bytes)
                    .with_max_duration(max_duration.unwrap_or_default())
                    .with_file_name_generator(checkpoint::timestamp_file_names(
                        directory,
                        prefix.clone(),
                    )),
            ),
        }
    }

    /// Returns a RecorderBuilder configured by this Config.
    pub fn into_builder(self) -> RecorderBuilder {
        let mut builder = Recorder::builder()
            .receiver(self.build_receiver())
            .include_all(self.include_all);

        if let Some(creator) = self.creator {
            builder = builder.creator(creator);
        }
        if let Some(version) = self.version {
            builder = builder.version(version);
        }
        if let Some(har_version) = self.har_version {
            builder = builder.har_version(har_version);
        }
        for (header, value) in self.redact_headers {
            builder = builder.entry_middleware(redact_header(header, value));
        }

        builder
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checkpoint_config() {
        let config = Config::from_yaml(
            r#"
creator: my-crawler
includeAll: false
redactHeaders:
  authorization: REDACTED
output:
  type: checkpoint
  directory: /var/hars
  maxDuration: 5m
"#,
        )
        .unwrap();

        assert_eq!(
            config,
            Config {
                creator: Some("my-crawler".to_string()),
                version: None,
                har_version: None,
                include_all: false,
                redact_headers: [("authorization".to_string(), "REDACTED".to_string())]
                    .into_iter()
                    .collect(),
                output: Output::Checkpoint(CheckpointConfig {
                    directory: "/var/hars".into(),
                    prefix: "har-recorder-".to_string(),
                    max_bytes: 10 * 1024 * 1024,
                    max_duration: Some(Duration::from_secs(300)),
                }),
            }
        );
    }

    #[test]
    fn test_file_config_defaults() {
        let config =
            Config::from_json(r#"{"output": {"type": "file", "path": "out.har"}}"#).unwrap();

        assert!(config.include_all);
        assert!(config.redact_headers.is_empty());
        assert_eq!(
            config.output,
            Output::File {
                path: "out.har".into()
            }
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = Config::from_yaml("output: {type: file, path: out.har}\nbogus: 1\n").unwrap_err();
        assert!(err.to_string().contains("bogus"), "{err}");

        assert!(Config::from_yaml("output: {type: carrier-pigeon}\n").is_err());
    }
}
