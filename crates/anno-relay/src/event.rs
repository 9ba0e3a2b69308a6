//! Events read from the annotation source.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One Grafana annotation.
///
/// Field names follow Grafana's annotation API. Missing fields default and
/// unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Annotation {
    /// Annotation id.
    pub id: i64,
    /// Alert that produced the annotation, if any.
    pub alert_id: i64,
    /// Dashboard the annotation belongs to.
    pub dashboard_id: i64,
    /// Panel the annotation belongs to.
    pub panel_id: i64,
    /// Author id.
    pub user_id: i64,
    /// Author login.
    pub login: String,
    /// Alert state after the transition.
    pub new_state: String,
    /// Alert state before the transition.
    pub prev_state: String,
    /// Start time, milliseconds since the Unix epoch.
    pub time: i64,
    /// End time for region annotations, milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<i64>,
    /// Free-text body. The first line is the title.
    pub text: String,
    /// Metric name.
    pub metric: String,
    /// Region id.
    pub region_id: i64,
    /// Tags attached to the annotation.
    #[serde(deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

impl Annotation {
    /// Creates an annotation with the given body, tags and time.
    #[must_use]
    pub fn new(text: impl Into<String>, tags: Vec<String>, time: i64) -> Self {
        Self {
            text: text.into(),
            tags,
            time,
            ..Self::default()
        }
    }

    /// Returns the first line of the body.
    #[must_use]
    pub fn title(&self) -> &str {
        self.text.split('\n').next().unwrap_or("")
    }

    /// Returns the body without its first line.
    #[must_use]
    pub fn message(&self) -> String {
        self.text.split('\n').skip(1).collect::<Vec<_>>().join("\n")
    }

    /// Returns the start time as a UTC timestamp.
    ///
    /// Out-of-range times map to the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.time)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Health report of the annotation source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    /// Source commit hash.
    pub commit: String,
    /// Database state, `ok` when healthy.
    pub database: String,
    /// Source version.
    pub version: String,
}

impl HealthStatus {
    /// Returns true if the source reports its database as healthy.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.database.eq_ignore_ascii_case("ok")
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
