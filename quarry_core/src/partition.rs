//! Splitting a query into per-scheme sub-queries.

use crate::types::{FolderQuery, Query};

/// Distinct schemes referenced by a query's folder roots and extra files,
/// in order of first occurrence.
pub fn schemes_in_query(query: &Query) -> Vec<String> {
    let mut schemes: Vec<String> = Vec::new();
    let folder_schemes = query.folder_queries.iter().map(|fq| fq.scheme());
    let extra_schemes = query.extra_file_resources.iter().map(|r| r.scheme());
    for scheme in folder_schemes.chain(extra_schemes) {
        if !schemes.iter().any(|s| s == scheme) {
            schemes.push(scheme.to_string());
        }
    }
    schemes
}

/// Split `query` into one sub-query per folder-root scheme.
///
/// Each sub-query is a copy of the original whose `folder_queries` keeps only
/// the roots of that scheme; every other field is carried over unchanged.
/// Schemes appear in order of first occurrence.
pub fn partition(query: &Query) -> Vec<(String, Query)> {
    let mut groups: Vec<(String, Vec<FolderQuery>)> = Vec::new();
    for fq in &query.folder_queries {
        match groups.iter_mut().find(|(scheme, _)| scheme.as_str() == fq.scheme()) {
            Some((_, folders)) => folders.push(fq.clone()),
            None => groups.push((fq.scheme().to_string(), vec![fq.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(scheme, folder_queries)| {
            let mut sub_query = query.clone();
            sub_query.folder_queries = folder_queries;
            (scheme, sub_query)
        })
        .collect()
}
