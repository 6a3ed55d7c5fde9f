use crate::cli::{Cli, FilesArgs, FilterArgs, GrepArgs, OutputFormat};
use crate::commands::{build_service, load_config, CommandError, Result};
use crate::output::{render_file_match, render_summary, to_structured, Painter, SearchReport};
use quarry_core::types::{Query, SearchComplete};
use quarry_core::{
    CancellationToken, FolderQuery, PatternInfo, PreviewOptions, ProgressCallback, ProgressItem,
    QueryKind, ResourceId, SearchConfig,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directories skipped unless `--no-default-excludes` is given.
const DEFAULT_EXCLUDES: &[&str] = &[".git"];

/// Run `quarry files`.
pub async fn files(cli: &Cli, args: &FilesArgs) -> Result<()> {
    let config = load_config(cli)?;
    let roots = parse_roots(&args.roots)?;
    let mut query = apply_filters(Query::file(folder_queries(&roots)), &args.filter, &config);
    if let Some(pattern) = &args.pattern {
        query = query.with_file_pattern(pattern.clone());
    }

    let service = build_service(config);
    let token = cancel_on_ctrl_c();
    let complete = service.file_search(query, &token).await?;

    let painter = Painter::new(cli.no_color);
    if cli.output == OutputFormat::Pretty {
        for file_match in &complete.results {
            println!("{}", render_file_match(file_match, &roots, painter));
        }
        if !complete.results.is_empty() {
            println!();
        }
    }
    finish(cli, QueryKind::File, &roots, &complete, painter)
}

/// Run `quarry grep`. Pretty output streams each file as soon as it matches.
pub async fn grep(cli: &Cli, args: &GrepArgs) -> Result<()> {
    let config = load_config(cli)?;
    let roots = parse_roots(&args.roots)?;
    let (before, after) = args.context_lines();
    let query = apply_filters(
        Query::text(pattern_info(args, &config), folder_queries(&roots)),
        &args.filter,
        &config,
    )
    .with_context(before, after)
    .with_preview(PreviewOptions {
        match_lines: 1,
        chars_per_line: config.preview_chars_per_line,
    });

    let service = build_service(config);
    let token = cancel_on_ctrl_c();
    let painter = Painter::new(cli.no_color);
    let on_progress =
        (cli.output == OutputFormat::Pretty).then(|| print_matches(roots.clone(), painter));
    let complete = service.text_search(query, &token, on_progress).await?;

    finish(cli, QueryKind::Text, &roots, &complete, painter)
}

fn finish(
    cli: &Cli,
    kind: QueryKind,
    roots: &[ResourceId],
    complete: &SearchComplete,
    painter: Painter,
) -> Result<()> {
    let report = SearchReport::new(kind, roots, complete);
    match to_structured(&report, cli.output)? {
        Some(text) => println!("{text}"),
        None => println!("{}", render_summary(complete, kind, painter)),
    }
    debug!(
        target: "quarry_cli",
        %kind,
        files = complete.results.len(),
        limit_hit = complete.limit_hit,
        "search finished"
    );
    Ok(())
}

fn print_matches(roots: Vec<ResourceId>, painter: Painter) -> ProgressCallback {
    Arc::new(move |item: ProgressItem| match item {
        ProgressItem::Match(file_match) => {
            println!("{}\n", render_file_match(&file_match, &roots, painter));
        }
        ProgressItem::Message(message) => {
            debug!(target: "quarry_cli", text = %message.text, "provider message");
        }
    })
}

fn pattern_info(args: &GrepArgs, config: &SearchConfig) -> PatternInfo {
    let mut pattern = PatternInfo::new(args.pattern.clone());
    if args.regex {
        pattern = pattern.regex();
    }
    if args.case_sensitive {
        pattern = pattern.case_sensitive();
    }
    if args.word {
        pattern = pattern
            .word_match()
            .with_word_separators(config.word_separators.clone());
    }
    pattern
}

fn folder_queries(roots: &[ResourceId]) -> Vec<FolderQuery> {
    roots.iter().cloned().map(FolderQuery::new).collect()
}

/// Apply the result cap and the include/exclude globs.
fn apply_filters(mut query: Query, filter: &FilterArgs, config: &SearchConfig) -> Query {
    if let Some(max_results) = filter.max_results.or(config.default_max_results) {
        query = query.with_max_results(max_results);
    }
    for glob in &filter.include {
        query = query.with_include(glob.clone());
    }
    for glob in &filter.exclude {
        query = query.with_exclude(glob.clone());
    }
    if !filter.no_default_excludes {
        for glob in DEFAULT_EXCLUDES {
            query = query.with_exclude(*glob);
        }
    }
    query
}

/// Turn command-line roots into resources. Anything that looks like a URI is
/// parsed as one; everything else is a path relative to the working directory.
pub fn parse_roots(inputs: &[String]) -> Result<Vec<ResourceId>> {
    let cwd = std::env::current_dir()?;
    inputs.iter().map(|input| parse_root(input, &cwd)).collect()
}

fn parse_root(input: &str, cwd: &Path) -> Result<ResourceId> {
    if input.contains("://") || input.starts_with("file:") {
        return ResourceId::parse(input).map_err(|_| CommandError::InvalidRoot(input.to_string()));
    }

    let path = Path::new(input);
    let absolute = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    };
    if !absolute.exists() {
        warn!(target: "quarry_cli", root = %absolute.display(), "search root does not exist");
    }
    ResourceId::from_file_path(&absolute).map_err(|_| CommandError::InvalidRoot(input.to_string()))
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// A token cancelled by Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "quarry_cli", "interrupted, cancelling search");
            signalled.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::TextSearchResult;
    use std::fs;

    #[test]
    fn test_parse_root_paths_and_uris() {
        let cwd = Path::new("/work/project");
        let relative = parse_root("src/../tests", cwd).unwrap();
        assert_eq!(relative.to_string(), "file:///work/project/tests");

        let current = parse_root(".", cwd).unwrap();
        assert_eq!(current.fs_path(), PathBuf::from("/work/project"));

        let uri = parse_root("file:///srv/data", cwd).unwrap();
        assert_eq!(uri.scheme(), "file");
        assert_eq!(uri.fs_path(), PathBuf::from("/srv/data"));

        assert!(matches!(
            parse_root("file://[bad", cwd),
            Err(CommandError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_apply_filters_defaults() {
        let config = SearchConfig {
            default_max_results: Some(25),
            ..SearchConfig::default()
        };
        let root = ResourceId::parse("file:///work").unwrap();
        let filter = FilterArgs {
            exclude: vec!["target".to_string()],
            ..FilterArgs::default()
        };
        let query = apply_filters(Query::file(folder_queries(&[root.clone()])), &filter, &config);
        assert_eq!(query.max_results, Some(25));
        assert_eq!(query.exclude_pattern, vec!["target", ".git"]);

        let filter = FilterArgs {
            max_results: Some(3),
            no_default_excludes: true,
            ..FilterArgs::default()
        };
        let query = apply_filters(Query::file(folder_queries(&[root])), &filter, &config);
        assert_eq!(query.max_results, Some(3));
        assert!(query.exclude_pattern.is_empty());
    }

    #[tokio::test]
    async fn test_service_searches_local_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.txt"), "alpha\nbeta needle\n").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "needle").unwrap();

        let roots = vec![ResourceId::from_file_path(dir.path()).unwrap()];
        let config = SearchConfig::default();
        let query = apply_filters(
            Query::text(PatternInfo::new("NEEDLE"), folder_queries(&roots)),
            &FilterArgs::default(),
            &config,
        );
        let service = build_service(config);

        let complete = service
            .text_search(query, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(complete.results.len(), 1);
        assert!(complete.results[0].resource.to_string().ends_with("/one.txt"));
        let TextSearchResult::Match(text_match) = &complete.results[0].results[0] else {
            panic!("expected a match");
        };
        assert_eq!(text_match.preview.text, "beta needle");
        assert_eq!(complete.stats.as_ref().unwrap().provider, "local-disk");
    }

    #[tokio::test]
    async fn test_service_skips_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kept.rs"), "").unwrap();
        let roots = vec![
            ResourceId::from_file_path(dir.path()).unwrap(),
            ResourceId::from_file_path(dir.path().join("gone")).unwrap(),
        ];
        let service = build_service(SearchConfig::default());

        let complete = service
            .file_search(Query::file(folder_queries(&roots)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(complete.results.len(), 1);
        assert!(!complete.limit_hit);
    }
}
