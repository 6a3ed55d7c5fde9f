use crate::cli::OutputFormat;
use crate::commands::Result;
use quarry_core::types::SearchComplete;
use quarry_core::{FileMatch, ProgressMessage, QueryKind, ResourceId, SearchStats};
use serde::Serialize;

mod pretty;
pub use pretty::{render_file_match, render_summary, Painter};

/// Machine-readable result of a `files` or `grep` run.
#[derive(Debug, Serialize)]
pub struct SearchReport<'a> {
    pub kind: QueryKind,
    pub roots: Vec<String>,
    pub limit_hit: bool,
    pub file_count: usize,
    pub match_count: usize,
    pub results: &'a [FileMatch],
    #[serde(skip_serializing_if = "no_messages")]
    pub messages: &'a [ProgressMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<&'a SearchStats>,
}

impl<'a> SearchReport<'a> {
    pub fn new(kind: QueryKind, roots: &[ResourceId], complete: &'a SearchComplete) -> Self {
        Self {
            kind,
            roots: roots.iter().map(|root| root.to_string()).collect(),
            limit_hit: complete.limit_hit,
            file_count: complete.results.len(),
            match_count: complete.match_count(),
            results: &complete.results,
            messages: &complete.messages,
            stats: complete.stats.as_ref(),
        }
    }
}

fn no_messages(messages: &&[ProgressMessage]) -> bool {
    messages.is_empty()
}

/// Serialize `data` for the JSON and YAML formats. Pretty output is rendered
/// by the commands themselves, so it yields `None`.
pub fn to_structured<T: Serialize>(data: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Json => Ok(Some(serde_json::to_string_pretty(data)?)),
        OutputFormat::Yaml => Ok(Some(serde_yaml::to_string(data)?)),
        OutputFormat::Pretty => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn complete() -> SearchComplete {
        let resource = ResourceId::parse("file:///work/a.rs").unwrap();
        SearchComplete::new(vec![FileMatch::new(resource)])
            .with_limit_hit(true)
            .with_stats(SearchStats::new("local-disk", 1))
    }

    #[test]
    fn test_report_json_shape() {
        let complete = complete();
        let roots = vec![ResourceId::parse("file:///work").unwrap()];
        let report = SearchReport::new(QueryKind::File, &roots, &complete);
        let json = to_structured(&report, OutputFormat::Json).unwrap().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["roots"][0], "file:///work");
        assert_eq!(value["limit_hit"], true);
        assert_eq!(value["file_count"], 1);
        assert_eq!(value["stats"]["provider"], "local-disk");
        assert!(value.get("messages").is_none());
    }

    #[test]
    fn test_pretty_is_not_structured() {
        let complete = complete();
        let report = SearchReport::new(QueryKind::File, &[], &complete);
        assert!(to_structured(&report, OutputFormat::Pretty).unwrap().is_none());
        let yaml = to_structured(&report, OutputFormat::Yaml).unwrap().unwrap();
        assert!(yaml.contains("limit_hit: true"));
    }
}
