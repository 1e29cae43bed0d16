//! Output naming templates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Values a template is expanded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    /// Source base name without extension.
    pub filename: String,
    /// Batch date, shared by every job of a batch.
    pub date: NaiveDate,
}

impl TemplateContext {
    pub fn new(filename: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            filename: filename.into(),
            date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Segment {
    Literal(String),
    Filename,
    Date,
}

/// A parsed naming template.
///
/// `{filename}` and `{date}` are placeholders; everything else, including
/// unknown braces and path separators, is literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
    segments: Vec<Segment>,
}

impl OutputTemplate {
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while !rest.is_empty() {
            let placeholder = if rest.starts_with("{filename}") {
                Some((Segment::Filename, "{filename}".len()))
            } else if rest.starts_with("{date}") {
                Some((Segment::Date, "{date}".len()))
            } else {
                None
            };

            match placeholder {
                Some((segment, len)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = &rest[len..];
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Whether the template references any placeholder.
    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }

    pub fn expand(&self, ctx: &TemplateContext) -> String {
        let date = ctx.date.format("%Y-%m-%d").to_string();
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Filename => ctx.filename.as_str(),
                Segment::Date => date.as_str(),
            })
            .collect()
    }
}

/// Parses and expands `pattern` in one step.
pub fn expand_pattern(pattern: &str, ctx: &TemplateContext) -> String {
    OutputTemplate::parse(pattern).expand(ctx)
}
