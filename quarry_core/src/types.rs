//! Core types for queries, matches and completions.

use crate::error::{Result, SearchError};
use crate::logging::ProgressMessage;
use crate::resource::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// What a query searches for. Providers are registered per kind as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// File-name search
    File,
    /// Text-content search
    Text,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::File => "file",
            QueryKind::Text => "text",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(QueryKind::File),
            "text" => Ok(QueryKind::Text),
            other => Err(SearchError::UnknownProviderKind(other.to_string())),
        }
    }
}

/// The content pattern of a text query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInfo {
    pub pattern: String,

    #[serde(default)]
    pub is_regex: bool,

    #[serde(default)]
    pub is_case_sensitive: bool,

    #[serde(default)]
    pub is_word_match: bool,

    /// Characters that delimit words for whole-word matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_separators: Option<String>,
}

impl PatternInfo {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: false,
            is_case_sensitive: false,
            is_word_match: false,
            word_separators: None,
        }
    }

    pub fn regex(mut self) -> Self {
        self.is_regex = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.is_case_sensitive = true;
        self
    }

    pub fn word_match(mut self) -> Self {
        self.is_word_match = true;
        self
    }

    pub fn with_word_separators(mut self, separators: impl Into<String>) -> Self {
        self.word_separators = Some(separators.into());
        self
    }
}

/// How much of a matching line is kept as preview text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewOptions {
    pub match_lines: usize,
    pub chars_per_line: usize,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            match_lines: 1,
            chars_per_line: crate::config::DEFAULT_PREVIEW_CHARS_PER_LINE,
        }
    }
}

/// One root folder of a query, with folder-scoped filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderQuery {
    pub folder: ResourceId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_pattern: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_pattern: Vec<String>,
}

impl FolderQuery {
    pub fn new(folder: ResourceId) -> Self {
        Self {
            folder,
            folder_name: None,
            include_pattern: Vec::new(),
            exclude_pattern: Vec::new(),
        }
    }

    pub fn with_include(mut self, glob: impl Into<String>) -> Self {
        self.include_pattern.push(glob.into());
        self
    }

    pub fn with_exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude_pattern.push(glob.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.folder_name = Some(name.into());
        self
    }

    /// Partition key of this folder.
    pub fn scheme(&self) -> &str {
        self.folder.scheme()
    }
}

/// A search request. The kind is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type")]
    kind: QueryKind,

    pub folder_queries: Vec<FolderQuery>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_file_resources: Vec<ResourceId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_pattern: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_pattern: Vec<String>,

    /// Include patterns were given as explicit search paths.
    #[serde(default)]
    pub using_search_paths: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_pattern: Option<PatternInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_options: Option<PreviewOptions>,

    #[serde(default)]
    pub before_context: usize,

    #[serde(default)]
    pub after_context: usize,

    /// Name pattern for file queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_pattern: Option<String>,

    /// Opaque key providers may use to cache walks across related queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl Query {
    fn with_kind(kind: QueryKind, folder_queries: Vec<FolderQuery>) -> Self {
        Self {
            kind,
            folder_queries,
            extra_file_resources: Vec::new(),
            max_results: None,
            include_pattern: Vec::new(),
            exclude_pattern: Vec::new(),
            using_search_paths: false,
            content_pattern: None,
            preview_options: None,
            before_context: 0,
            after_context: 0,
            file_pattern: None,
            cache_key: None,
        }
    }

    /// A file-name query over `folder_queries`.
    pub fn file(folder_queries: Vec<FolderQuery>) -> Self {
        Self::with_kind(QueryKind::File, folder_queries)
    }

    /// A text-content query over `folder_queries`.
    pub fn text(pattern: PatternInfo, folder_queries: Vec<FolderQuery>) -> Self {
        let mut query = Self::with_kind(QueryKind::Text, folder_queries);
        query.content_pattern = Some(pattern);
        query
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn is_text(&self) -> bool {
        self.kind == QueryKind::Text
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_extra_file(mut self, resource: ResourceId) -> Self {
        self.extra_file_resources.push(resource);
        self
    }

    pub fn with_include(mut self, glob: impl Into<String>) -> Self {
        self.include_pattern.push(glob.into());
        self
    }

    pub fn with_exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude_pattern.push(glob.into());
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = Some(pattern.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_preview(mut self, options: PreviewOptions) -> Self {
        self.preview_options = Some(options);
        self
    }

    pub fn with_context(mut self, before: usize, after: usize) -> Self {
        self.before_context = before;
        self.after_context = after;
        self
    }

    /// Check the structural invariants of a query before it is run.
    pub fn validate(&self) -> Result<()> {
        if self.folder_queries.is_empty() && self.extra_file_resources.is_empty() {
            return Err(SearchError::InvalidQuery(
                "query has neither folder roots nor extra files".to_string(),
            ));
        }
        if self.is_text() && self.content_pattern.is_none() {
            return Err(SearchError::InvalidQuery(
                "text query has no content pattern".to_string(),
            ));
        }
        Ok(())
    }
}

/// A range in a text document. Lines and columns are zero-based; columns count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl TextRange {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A range on a single line.
    pub fn on_line(line: usize, start_column: usize, end_column: usize) -> Self {
        Self::new(line, start_column, line, end_column)
    }
}

/// Preview text for a match, with match ranges relative to the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearchPreview {
    pub text: String,
    pub matches: Vec<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearchMatch {
    /// Ranges in the source document.
    pub ranges: Vec<TextRange>,
    pub preview: TextSearchPreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearchContext {
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextSearchResult {
    Match(TextSearchMatch),
    Context(TextSearchContext),
}

/// All results for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMatch {
    pub resource: ResourceId,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TextSearchResult>,
}

impl FileMatch {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            results: Vec::new(),
        }
    }

    pub fn with_results(mut self, results: Vec<TextSearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Number of `Match` entries (context lines are not counted).
    pub fn match_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, TextSearchResult::Match(_)))
            .count()
    }
}

/// An item streamed while a search runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum ProgressItem {
    Match(FileMatch),
    Message(ProgressMessage),
}

/// Statistics reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub provider: String,

    pub result_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_walked: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
}

impl SearchStats {
    pub fn new(provider: impl Into<String>, result_count: usize) -> Self {
        Self {
            provider: provider.into(),
            result_count,
            duration_ms: None,
            files_walked: None,
            cache_hit: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_files_walked(mut self, files_walked: u64) -> Self {
        self.files_walked = Some(files_walked);
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = Some(cache_hit);
        self
    }
}

/// The terminal result of a search or sub-search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchComplete {
    #[serde(default)]
    pub limit_hit: bool,

    pub results: Vec<FileMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ProgressMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SearchStats>,
}

impl SearchComplete {
    pub fn new(results: Vec<FileMatch>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn with_limit_hit(mut self, limit_hit: bool) -> Self {
        self.limit_hit = limit_hit;
        self
    }

    pub fn with_message(mut self, message: ProgressMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_stats(mut self, stats: SearchStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Total number of `Match` entries across all resources.
    pub fn match_count(&self) -> usize {
        self.results.iter().map(FileMatch::match_count).sum()
    }
}

/// Drop messages whose (type, text, trusted) triple was already seen, keeping first occurrences.
pub fn dedup_messages(messages: impl IntoIterator<Item = ProgressMessage>) -> Vec<ProgressMessage> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|message| seen.insert(message.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MessageType;

    fn folder(uri: &str) -> FolderQuery {
        FolderQuery::new(ResourceId::parse(uri).unwrap())
    }

    #[test]
    fn test_query_kind_parse() {
        assert_eq!("file".parse::<QueryKind>().unwrap(), QueryKind::File);
        assert_eq!("text".parse::<QueryKind>().unwrap(), QueryKind::Text);
        let err = "symbols".parse::<QueryKind>().unwrap_err();
        assert!(matches!(err, SearchError::UnknownProviderKind(ref k) if k == "symbols"));
    }

    #[test]
    fn test_query_validate() {
        assert!(Query::file(vec![folder("file:///a")]).validate().is_ok());
        assert!(Query::file(Vec::new()).validate().is_err());

        let extra_only = Query::file(Vec::new())
            .with_extra_file(ResourceId::parse("file:///a/b.txt").unwrap());
        assert!(extra_only.validate().is_ok());
    }

    #[test]
    fn test_query_serialization_keeps_kind() {
        let query = Query::text(PatternInfo::new("foo").regex(), vec![folder("file:///a")])
            .with_max_results(5);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content_pattern"]["is_regex"], true);

        let parsed: Query = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind(), QueryKind::Text);
        assert_eq!(parsed.max_results, Some(5));
    }

    #[test]
    fn test_dedup_messages() {
        let messages = vec![
            ProgressMessage::warning("slow disk"),
            ProgressMessage::info("slow disk"),
            ProgressMessage::warning("slow disk"),
            ProgressMessage::warning("slow disk").trusted(),
        ];
        let deduped = dedup_messages(messages);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].kind, MessageType::Warning);
        assert_eq!(deduped[1].kind, MessageType::Information);
        assert!(deduped[2].trusted);
    }

    #[test]
    fn test_match_count_ignores_context() {
        let file_match = FileMatch::new(ResourceId::parse("file:///a.txt").unwrap()).with_results(vec![
            TextSearchResult::Context(TextSearchContext {
                line_number: 0,
                text: "before".into(),
            }),
            TextSearchResult::Match(TextSearchMatch {
                ranges: vec![TextRange::on_line(1, 0, 3)],
                preview: TextSearchPreview {
                    text: "foo".into(),
                    matches: vec![TextRange::on_line(0, 0, 3)],
                },
            }),
        ]);
        assert_eq!(file_match.match_count(), 1);
        assert_eq!(SearchComplete::new(vec![file_match]).match_count(), 1);
    }
}
