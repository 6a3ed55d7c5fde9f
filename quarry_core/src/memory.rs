//! Matching of open, possibly unsaved documents.
//!
//! Content queries first look at what the host has open in memory. Those
//! results are authoritative: a provider reporting the same resource later
//! is ignored, because the on-disk copy may be stale.

use regex::RegexBuilder;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::config::{SearchConfig, DEFAULT_WORD_SEPARATORS};
use crate::filter::path_included_in_query;
use crate::host::ResourceProbe;
use crate::resource::ResourceId;
use crate::types::{
    FileMatch, PatternInfo, PreviewOptions, Query, SearchComplete, TextRange, TextSearchContext,
    TextSearchMatch, TextSearchPreview, TextSearchResult,
};

/// A document the host holds in memory.
pub trait OpenDocument: Send + Sync {
    /// Identity of the in-memory model.
    fn resource(&self) -> &ResourceId;

    /// Resource the user sees for this document, or `None` when no editor
    /// shows it. Documents without an editor are never searched.
    fn original_resource(&self) -> Option<ResourceId>;

    fn language_id(&self) -> &str;

    /// Up to `limit` match ranges, in document order.
    fn find_matches(&self, pattern: &PatternInfo, limit: usize) -> Vec<TextRange>;

    fn line_count(&self) -> usize;

    /// Text of a zero-based line without its terminator.
    fn line_content(&self, line: usize) -> Option<String>;
}

/// Supplies the documents currently open in the host.
pub trait DocumentSource: Send + Sync {
    fn documents(&self) -> Vec<Arc<dyn OpenDocument>>;
}

/// Source for hosts without in-memory documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocuments;

impl DocumentSource for NoDocuments {
    fn documents(&self) -> Vec<Arc<dyn OpenDocument>> {
        Vec::new()
    }
}

/// A mutable set of open documents, in the order they were opened.
#[derive(Default)]
pub struct OpenDocuments {
    documents: RwLock<Vec<Arc<dyn OpenDocument>>>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document, replacing any open document with the same resource.
    pub fn open(&self, document: Arc<dyn OpenDocument>) {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let key = document.resource().comparison_key();
        match documents
            .iter_mut()
            .find(|doc| doc.resource().comparison_key() == key)
        {
            Some(slot) => *slot = document,
            None => documents.push(document),
        }
    }

    /// Close the document for `resource`. Returns `true` if one was open.
    pub fn close(&self, resource: &ResourceId) -> bool {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = documents.len();
        documents.retain(|doc| !doc.resource().same_resource(resource));
        documents.len() != before
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentSource for OpenDocuments {
    fn documents(&self) -> Vec<Arc<dyn OpenDocument>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for OpenDocuments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenDocuments")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// InMemoryDocument
// ============================================================================

/// An [`OpenDocument`] backed by a string.
#[derive(Debug, Clone)]
pub struct InMemoryDocument {
    resource: ResourceId,
    original: Option<ResourceId>,
    language_id: String,
    lines: Vec<String>,
}

impl InMemoryDocument {
    /// A document shown in an editor under its own resource.
    pub fn new(resource: ResourceId, text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        Self {
            original: Some(resource.clone()),
            resource,
            language_id: "plaintext".to_string(),
            lines,
        }
    }

    pub fn with_language(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = language_id.into();
        self
    }

    /// Show the document under a different resource than its model.
    pub fn with_original(mut self, original: ResourceId) -> Self {
        self.original = Some(original);
        self
    }

    /// A model that no editor displays.
    pub fn without_editor(mut self) -> Self {
        self.original = None;
        self
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl OpenDocument for InMemoryDocument {
    fn resource(&self) -> &ResourceId {
        &self.resource
    }

    fn original_resource(&self) -> Option<ResourceId> {
        self.original.clone()
    }

    fn language_id(&self) -> &str {
        &self.language_id
    }

    fn find_matches(&self, pattern: &PatternInfo, limit: usize) -> Vec<TextRange> {
        if limit == 0 || pattern.pattern.is_empty() {
            return Vec::new();
        }

        let source = if pattern.is_regex {
            pattern.pattern.clone()
        } else {
            regex::escape(&pattern.pattern)
        };
        let regex = match RegexBuilder::new(&source)
            .case_insensitive(!pattern.is_case_sensitive)
            .build()
        {
            Ok(regex) => regex,
            Err(err) => {
                debug!(target: "quarry.memory", pattern = %pattern.pattern, %err, "invalid pattern");
                return Vec::new();
            }
        };
        let separators = pattern
            .word_separators
            .as_deref()
            .unwrap_or(DEFAULT_WORD_SEPARATORS);

        let mut ranges = Vec::new();
        for (line_number, line) in self.lines.iter().enumerate() {
            for found in regex.find_iter(line) {
                if found.start() == found.end() {
                    continue;
                }
                if pattern.is_word_match
                    && !is_whole_word(line, found.start(), found.end(), separators)
                {
                    continue;
                }
                let start = line[..found.start()].chars().count();
                let end = start + found.as_str().chars().count();
                ranges.push(TextRange::on_line(line_number, start, end));
                if ranges.len() >= limit {
                    return ranges;
                }
            }
        }
        ranges
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_content(&self, line: usize) -> Option<String> {
        self.lines.get(line).cloned()
    }
}

fn is_boundary(c: Option<char>, separators: &str) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || separators.contains(c),
    }
}

fn is_whole_word(line: &str, start: usize, end: usize, separators: &str) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    is_boundary(before, separators) && is_boundary(after, separators)
}

// ============================================================================
// OpenDocumentResults
// ============================================================================

/// In-memory results keyed by resource identity.
///
/// A resource maps to `Some(match)` or to `None` when the document was
/// searched and had no match. Both suppress provider matches for the
/// resource.
#[derive(Debug, Clone, Default)]
pub struct OpenDocumentResults {
    entries: Vec<(ResourceId, Option<FileMatch>)>,
    keys: HashSet<String>,
    limit_hit: bool,
}

impl OpenDocumentResults {
    fn insert(&mut self, resource: ResourceId, file_match: Option<FileMatch>) {
        let key = resource.comparison_key();
        if self.keys.insert(key.clone()) {
            self.entries.push((resource, file_match));
        } else if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.comparison_key() == key)
        {
            entry.1 = file_match;
        }
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.keys.contains(&resource.comparison_key())
    }

    /// Documents that matched, in document order.
    pub fn matches(&self) -> impl Iterator<Item = &FileMatch> {
        self.entries.iter().filter_map(|(_, m)| m.as_ref())
    }

    /// Every searched resource with its outcome.
    pub fn entries(&self) -> &[(ResourceId, Option<FileMatch>)] {
        &self.entries
    }

    pub fn limit_hit(&self) -> bool {
        self.limit_hit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The immediate completion made of the matching documents.
    pub fn to_complete(&self) -> SearchComplete {
        SearchComplete::new(self.matches().cloned().collect()).with_limit_hit(self.limit_hit)
    }
}

/// Match the open documents against a content query.
///
/// File-name queries have no in-memory phase and yield an empty set.
pub fn open_document_results(
    query: &Query,
    documents: &dyn DocumentSource,
    probe: &dyn ResourceProbe,
    config: &SearchConfig,
) -> OpenDocumentResults {
    let mut results = OpenDocumentResults::default();
    let Some(pattern) = query.content_pattern.as_ref().filter(|_| query.is_text()) else {
        return results;
    };

    let mut pattern = pattern.clone();
    if pattern.is_word_match && pattern.word_separators.is_none() {
        pattern.word_separators = Some(config.word_separators.clone());
    }
    let preview = query.preview_options.unwrap_or(PreviewOptions {
        match_lines: 1,
        chars_per_line: config.preview_chars_per_line,
    });
    let include_search_results = query
        .include_pattern
        .iter()
        .any(|glob| *glob == config.search_result_glob);
    let ask = query
        .max_results
        .map_or(usize::MAX, |max| max.saturating_add(1));

    for document in documents.documents() {
        if results.limit_hit {
            break;
        }

        let Some(resource) = document.original_resource() else {
            continue;
        };
        if document.language_id() == config.search_result_language && !include_search_results {
            continue;
        }
        let scheme = resource.scheme();
        if scheme != config.untitled_scheme && !probe.has_provider(scheme) {
            continue;
        }
        if config.is_excluded_scheme(scheme) {
            continue;
        }
        if !path_included_in_query(query, &resource.fs_path()) {
            continue;
        }

        let mut ranges = document.find_matches(&pattern, ask);
        if ranges.is_empty() {
            results.insert(resource, None);
            continue;
        }
        if let Some(max) = query.max_results {
            if ranges.len() >= ask {
                results.limit_hit = true;
                ranges.truncate(max);
            }
        }

        let file_results = text_results(document.as_ref(), &ranges, query, preview);
        results.insert(resource.clone(), Some(FileMatch::new(resource).with_results(file_results)));
    }

    debug!(
        target: "quarry.memory",
        searched = results.len(),
        matched = results.matches().count(),
        limit_hit = results.limit_hit,
        "open documents searched"
    );
    results
}

/// Turn match ranges into results: one preview per matching line, with the
/// query's before/after context lines interleaved.
pub fn text_results(
    document: &dyn OpenDocument,
    ranges: &[TextRange],
    query: &Query,
    preview: PreviewOptions,
) -> Vec<TextSearchResult> {
    let matches = to_text_matches(document, ranges, preview);
    with_context(document, matches, query.before_context, query.after_context)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Group ranges by starting line and attach preview text.
fn to_text_matches(
    document: &dyn OpenDocument,
    ranges: &[TextRange],
    preview: PreviewOptions,
) -> Vec<(usize, usize, TextSearchMatch)> {
    let mut grouped: Vec<Vec<TextRange>> = Vec::new();
    for range in ranges {
        match grouped.last_mut() {
            Some(group) if group[0].start_line == range.start_line => group.push(*range),
            _ => grouped.push(vec![*range]),
        }
    }

    grouped
        .into_iter()
        .map(|group| {
            let first_line = group[0].start_line;
            let last_match_line = group.iter().map(|r| r.end_line).max().unwrap_or(first_line);
            let last_preview_line =
                last_match_line.min(first_line.saturating_add(preview.match_lines.max(1) - 1));

            let preview_lines: Vec<String> = (first_line..=last_preview_line)
                .map(|line| {
                    truncate_chars(
                        &document.line_content(line).unwrap_or_default(),
                        preview.chars_per_line,
                    )
                })
                .collect();

            let preview_ranges = group
                .iter()
                .map(|range| {
                    let end_line = range.end_line.min(last_preview_line) - first_line;
                    let start_width = preview_lines[0].chars().count();
                    let end_width = preview_lines[end_line].chars().count();
                    let end_column = if range.end_line > last_preview_line {
                        end_width
                    } else {
                        range.end_column.min(end_width)
                    };
                    TextRange::new(0, range.start_column.min(start_width), end_line, end_column)
                })
                .collect();

            let text_match = TextSearchMatch {
                ranges: group,
                preview: TextSearchPreview {
                    text: preview_lines.join("\n"),
                    matches: preview_ranges,
                },
            };
            (first_line, last_match_line, text_match)
        })
        .collect()
}

/// Interleave context lines around matches without repeating any line.
fn with_context(
    document: &dyn OpenDocument,
    matches: Vec<(usize, usize, TextSearchMatch)>,
    before: usize,
    after: usize,
) -> Vec<TextSearchResult> {
    let line_count = document.line_count();
    let starts: Vec<usize> = matches.iter().map(|(first, _, _)| *first).collect();
    let mut results = Vec::new();
    let mut next_line = 0;

    for (index, (first_line, last_line, text_match)) in matches.into_iter().enumerate() {
        for line in next_line.max(first_line.saturating_sub(before))..first_line {
            push_context(document, line, &mut results);
        }
        results.push(TextSearchResult::Match(text_match));
        next_line = next_line.max(last_line + 1);

        if after > 0 {
            let mut end = last_line.saturating_add(after).saturating_add(1).min(line_count);
            if let Some(next_start) = starts.get(index + 1) {
                end = end.min(*next_start);
            }
            for line in next_line..end {
                push_context(document, line, &mut results);
            }
            next_line = next_line.max(end);
        }
    }
    results
}

fn push_context(document: &dyn OpenDocument, line: usize, results: &mut Vec<TextSearchResult>) {
    if let Some(text) = document.line_content(line) {
        results.push(TextSearchResult::Context(TextSearchContext {
            line_number: line,
            text,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FolderQuery;
    use async_trait::async_trait;

    struct Probe;

    #[async_trait]
    impl ResourceProbe for Probe {
        async fn exists(&self, _resource: &ResourceId) -> bool {
            true
        }

        fn has_provider(&self, scheme: &str) -> bool {
            matches!(scheme, "file" | "git")
        }
    }

    fn id(uri: &str) -> ResourceId {
        ResourceId::parse(uri).unwrap()
    }

    fn doc(uri: &str, text: &str) -> Arc<dyn OpenDocument> {
        Arc::new(InMemoryDocument::new(id(uri), text))
    }

    fn query(pattern: PatternInfo) -> Query {
        Query::text(pattern, vec![FolderQuery::new(id("file:///work"))])
    }

    fn search(query: &Query, docs: Vec<Arc<dyn OpenDocument>>) -> OpenDocumentResults {
        let source = OpenDocuments::new();
        for d in docs {
            source.open(d);
        }
        open_document_results(query, &source, &Probe, &SearchConfig::default())
    }

    #[test]
    fn test_find_matches_literal_case_insensitive() {
        let document = InMemoryDocument::new(id("file:///a.txt"), "Foo.bar\nfoo(x)");
        let ranges = document.find_matches(&PatternInfo::new("foo"), usize::MAX);
        assert_eq!(
            ranges,
            vec![TextRange::on_line(0, 0, 3), TextRange::on_line(1, 0, 3)]
        );

        let literal_dot = document.find_matches(&PatternInfo::new("o.b"), usize::MAX);
        assert_eq!(literal_dot, vec![TextRange::on_line(0, 2, 5)]);

        let sensitive = document.find_matches(&PatternInfo::new("foo").case_sensitive(), 10);
        assert_eq!(sensitive, vec![TextRange::on_line(1, 0, 3)]);
    }

    #[test]
    fn test_find_matches_word_and_columns() {
        let document = InMemoryDocument::new(id("file:///a.txt"), "héllo cat concat cat-like");
        let ranges = document.find_matches(&PatternInfo::new("cat").word_match(), 10);
        assert_eq!(
            ranges,
            vec![TextRange::on_line(0, 6, 9), TextRange::on_line(0, 17, 20)]
        );
        assert_eq!(document.find_matches(&PatternInfo::new("cat"), 2).len(), 2);
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        let document = InMemoryDocument::new(id("file:///a.txt"), "(((");
        assert!(document
            .find_matches(&PatternInfo::new("(").regex(), 10)
            .is_empty());
    }

    #[test]
    fn test_records_no_match_and_matches_in_order() {
        let results = search(
            &query(PatternInfo::new("needle")),
            vec![
                doc("file:///work/a.txt", "hay"),
                doc("file:///work/b.txt", "a needle here"),
            ],
        );
        assert_eq!(results.len(), 2);
        assert!(results.contains(&id("file:///work/a.txt")));
        let matched: Vec<String> = results.matches().map(|m| m.resource.to_string()).collect();
        assert_eq!(matched, vec!["file:///work/b.txt"]);
        assert!(!results.limit_hit());
    }

    #[test]
    fn test_skip_rules() {
        let results = search(
            &query(PatternInfo::new("x")),
            vec![
                Arc::new(InMemoryDocument::new(id("file:///work/hidden.txt"), "x").without_editor()),
                Arc::new(
                    InMemoryDocument::new(id("file:///work/r.code-search"), "x")
                        .with_language("search-result"),
                ),
                doc("walkthrough:///intro", "x"),
                doc("git:///work/staged.txt", "x"),
                doc("untitled:Untitled-1", "x"),
            ],
        );
        let kept: Vec<String> = results
            .entries()
            .iter()
            .map(|(r, _)| r.to_string())
            .collect();
        assert_eq!(kept, vec!["untitled:Untitled-1"]);
    }

    #[test]
    fn test_search_result_documents_opt_in() {
        let q = query(PatternInfo::new("x")).with_include("**/*.code-search");
        let results = search(
            &q,
            vec![Arc::new(
                InMemoryDocument::new(id("file:///work/r.code-search"), "x")
                    .with_language("search-result"),
            )],
        );
        assert_eq!(results.matches().count(), 1);
    }

    #[test]
    fn test_original_resource_is_reported() {
        let document = InMemoryDocument::new(id("mem:///model/1"), "needle")
            .with_original(id("file:///work/notes.md"));
        let results = search(&query(PatternInfo::new("needle")), vec![Arc::new(document)]);
        assert!(results.contains(&id("file:///work/notes.md")));
        assert!(!results.contains(&id("mem:///model/1")));
    }

    #[test]
    fn test_limit_hit_truncates_and_stops() {
        let q = query(PatternInfo::new("a")).with_max_results(2);
        let results = search(
            &q,
            vec![
                doc("file:///work/one.txt", "a a a"),
                doc("file:///work/two.txt", "a"),
            ],
        );
        assert!(results.limit_hit());
        assert_eq!(results.len(), 1);
        let first = results.matches().next().unwrap();
        match &first.results[0] {
            TextSearchResult::Match(m) => assert_eq!(m.ranges.len(), 2),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(results.to_complete().limit_hit);
    }

    #[test]
    fn test_exact_limit_is_not_hit() {
        let q = query(PatternInfo::new("a")).with_max_results(2);
        let results = search(&q, vec![doc("file:///work/one.txt", "a a")]);
        assert!(!results.limit_hit());
    }

    #[test]
    fn test_preview_and_context() {
        let q = query(PatternInfo::new("needle"))
            .with_context(1, 1)
            .with_preview(PreviewOptions {
                match_lines: 1,
                chars_per_line: 8,
            });
        let results = search(
            &q,
            vec![doc(
                "file:///work/a.txt",
                "zero\nthe needle\ntwo\nthree\nneedle four",
            )],
        );
        let file_match = results.matches().next().unwrap();
        let lines: Vec<String> = file_match
            .results
            .iter()
            .map(|r| match r {
                TextSearchResult::Match(m) => format!("m:{}", m.preview.text),
                TextSearchResult::Context(c) => format!("c{}:{}", c.line_number, c.text),
            })
            .collect();
        assert_eq!(
            lines,
            vec!["c0:zero", "m:the need", "c2:two", "c3:three", "m:needle f"]
        );

        match &file_match.results[1] {
            TextSearchResult::Match(m) => {
                assert_eq!(m.ranges, vec![TextRange::on_line(1, 4, 10)]);
                assert_eq!(m.preview.matches, vec![TextRange::on_line(0, 4, 8)]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_huge_preview_and_context_are_clamped() {
        let wide = query(PatternInfo::new("needle")).with_preview(PreviewOptions {
            match_lines: usize::MAX,
            chars_per_line: usize::MAX,
        });
        let results = search(&wide, vec![doc("file:///work/a.txt", "zero\nneedle")]);
        let file_match = results.matches().next().unwrap();
        match &file_match.results[..] {
            [TextSearchResult::Match(m)] => assert_eq!(m.preview.text, "needle"),
            other => panic!("unexpected results {other:?}"),
        }

        let long_context = query(PatternInfo::new("needle")).with_context(usize::MAX, usize::MAX);
        let results = search(&long_context, vec![doc("file:///work/a.txt", "zero\nneedle\ntwo")]);
        let file_match = results.matches().next().unwrap();
        assert_eq!(file_match.results.len(), 3);
        assert!(matches!(
            &file_match.results[2],
            TextSearchResult::Context(c) if c.line_number == 2 && c.text == "two"
        ));
    }

    #[test]
    fn test_name_query_has_no_in_memory_phase() {
        let q = Query::file(vec![FolderQuery::new(id("file:///work"))]);
        let results = search(&q, vec![doc("file:///work/a.txt", "anything")]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_open_documents_replace_and_close() {
        let source = OpenDocuments::new();
        source.open(doc("file:///work/a.txt", "one"));
        source.open(doc("file:///work/a.txt", "two"));
        assert_eq!(source.len(), 1);
        assert!(source.close(&id("file:///work/a.txt")));
        assert!(source.is_empty());
    }
}
