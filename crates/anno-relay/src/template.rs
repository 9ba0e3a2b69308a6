//! Message templates.
//!
//! A template is plain text with `{{ name }}` placeholders. The names are:
//!
//! | name      | value                                        |
//! |-----------|----------------------------------------------|
//! | `title`   | first line of the annotation text            |
//! | `message` | remaining lines of the text                  |
//! | `tags`    | tags, one per line                           |
//! | `date`    | annotation time, RFC 1123 in UTC             |
//! | `text`    | the whole annotation text                    |
//! | `metric`  | metric name                                  |
//!
//! Names are case-insensitive and may carry a leading dot, so
//! `{{ .Title }}` and `{{ .JoinedTags }}` from older templates keep working.
//! Values are substituted verbatim.

use std::path::Path;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TemplateError;
use crate::event::Annotation;

static PLACEHOLDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.?[A-Za-z][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!()));

/// Formats a timestamp as RFC 1123 (`Mon, 02 Jan 2006 15:04:05 UTC`).
#[must_use]
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Message,
    Tags,
    Date,
    Text,
    Metric,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        if !PLACEHOLDER_NAME.is_match(name) {
            return None;
        }
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "title" => Some(Self::Title),
            "message" => Some(Self::Message),
            "tags" | "joinedtags" => Some(Self::Tags),
            "date" | "formatteddate" => Some(Self::Date),
            "text" => Some(Self::Text),
            "metric" => Some(Self::Metric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses template text.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Unterminated` for a `{{` without `}}` and
    /// `TemplateError::UnknownPlaceholder` for a name outside the known set.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }

            let offset = consumed + open;
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated { offset })?;

            let name = after_open[..close].trim();
            let field = Field::parse(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: name.to_string(),
                offset,
            })?;
            segments.push(Segment::Field(field));

            let advance = open + 2 + close + 2;
            consumed += advance;
            rest = &rest[advance..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Reads and parses the template file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Read` if the file cannot be read, or a parse
    /// error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&source)
    }

    /// Renders the template for `annotation`.
    #[must_use]
    pub fn render(&self, annotation: &Annotation) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Title) => out.push_str(annotation.title()),
                Segment::Field(Field::Message) => out.push_str(&annotation.message()),
                Segment::Field(Field::Tags) => out.push_str(&annotation.tags.join("\n")),
                Segment::Field(Field::Date) => out.push_str(&rfc1123(annotation.timestamp())),
                Segment::Field(Field::Text) => out.push_str(&annotation.text),
                Segment::Field(Field::Metric) => out.push_str(&annotation.metric),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use test_case::test_case;

    fn annotation() -> Annotation {
        let mut a = Annotation::new(
            "Disk full\non db-1\nsince 5m",
            vec!["db".to_string(), "prod".to_string()],
            1_700_000_000_000,
        );
        a.metric = "disk_used".to_string();
        a
    }

    #[test]
    fn rfc1123_format() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(rfc1123(at), "Tue, 14 Nov 2023 22:13:20 UTC");
    }

    #[test]
    fn renders_every_field() {
        let tpl = MessageTemplate::parse(
            "<b>{{ title }}</b>\n{{message}}\n{{ tags }}\n{{ date }}|{{ metric }}|{{ text }}",
        )
        .unwrap();

        assert_eq!(
            tpl.render(&annotation()),
            "<b>Disk full</b>\non db-1\nsince 5m\ndb\nprod\nTue, 14 Nov 2023 22:13:20 UTC|disk_used|Disk full\non db-1\nsince 5m"
        );
    }

    #[test]
    fn plain_text_renders_unchanged() {
        let tpl = MessageTemplate::parse("no placeholders { here }").unwrap();
        assert_eq!(tpl.render(&annotation()), "no placeholders { here }");
    }

    #[test]
    fn values_are_substituted_verbatim() {
        let tpl = MessageTemplate::parse("{{ title }}").unwrap();
        let a = Annotation::new("<i>a & b</i>", vec![], 0);
        assert_eq!(tpl.render(&a), "<i>a & b</i>");
    }

    #[test_case("{{ .Title }}", "Disk full" ; "dotted legacy name")]
    #[test_case("{{.JoinedTags}}", "db\nprod" ; "legacy joined tags")]
    #[test_case("{{ .FormattedDate }}", "Tue, 14 Nov 2023 22:13:20 UTC" ; "legacy date")]
    #[test_case("{{ METRIC }}", "disk_used" ; "case insensitive")]
    fn accepts_aliases(source: &str, expected: &str) {
        let tpl = MessageTemplate::parse(source).unwrap();
        assert_eq!(tpl.render(&annotation()), expected);
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = MessageTemplate::parse("hi {{ author }}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                name: "author".to_string(),
                offset: 3,
            }
        );
    }

    #[test]
    fn rejects_expression_placeholder() {
        let err = MessageTemplate::parse("{{ range .Tags }}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder { .. }));
    }

    #[test]
    fn rejects_unterminated_placeholder() {
        let err = MessageTemplate::parse("ok {{ title }} then {{ date").unwrap_err();
        assert_eq!(err, TemplateError::Unterminated { offset: 20 });
    }

    #[test]
    fn from_file_reads_template() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<b>{{{{ title }}}}</b>").unwrap();

        let tpl = MessageTemplate::from_file(file.path()).unwrap();
        assert_eq!(tpl.render(&annotation()), "<b>Disk full</b>");
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let err = MessageTemplate::from_file("/nonexistent/template.tmpl").unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}
