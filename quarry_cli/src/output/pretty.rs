//! Terminal rendering for search results.
//!
//! Paths are shown relative to the root they were found under, matched text
//! is highlighted inside its preview line, and the summary comes last.

use owo_colors::{OwoColorize, Style};
use quarry_core::types::{SearchComplete, TextSearchMatch};
use quarry_core::{FileMatch, MessageType, QueryKind, ResourceId, TextSearchResult};

/// Width of the line-number gutter.
const GUTTER: usize = 5;

/// Applies colors unless they were turned off.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    /// Colors are off with `--no-color` or when `NO_COLOR` is set.
    pub fn new(no_color: bool) -> Self {
        Self {
            enabled: !no_color && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    pub fn paint(&self, text: &str, style: Style) -> String {
        if self.enabled {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

fn path_style() -> Style {
    Style::new().magenta().bold()
}

fn line_number_style() -> Style {
    Style::new().green()
}

fn highlight_style() -> Style {
    Style::new().red().bold()
}

fn dim_style() -> Style {
    Style::new().dimmed()
}

/// Path of `resource` relative to the first root that contains it.
pub fn display_path(resource: &ResourceId, roots: &[ResourceId]) -> String {
    if resource.scheme() != "file" {
        return resource.to_string();
    }
    let path = resource.fs_path();
    roots
        .iter()
        .filter(|root| root.scheme() == "file")
        .find_map(|root| {
            path.strip_prefix(root.fs_path())
                .ok()
                .filter(|relative| !relative.as_os_str().is_empty())
                .map(|relative| relative.display().to_string())
        })
        .unwrap_or_else(|| path.display().to_string())
}

/// Wrap the character spans of `line` in the highlight style.
fn highlight(line: &str, spans: &[(usize, usize)], painter: Painter) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut spans: Vec<(usize, usize)> = spans
        .iter()
        .map(|&(start, end)| (start.min(chars.len()), end.min(chars.len())))
        .filter(|(start, end)| start < end)
        .collect();
    spans.sort_unstable();

    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    for (start, end) in spans {
        let start = start.max(pos);
        if start >= end {
            continue;
        }
        out.extend(&chars[pos..start]);
        let segment: String = chars[start..end].iter().collect();
        out.push_str(&painter.paint(&segment, highlight_style()));
        pos = end;
    }
    out.extend(&chars[pos..]);
    out
}

fn gutter(line: usize, separator: char, painter: Painter) -> String {
    let number = format!("{:>width$}", line + 1, width = GUTTER);
    format!("{}{separator} ", painter.paint(&number, line_number_style()))
}

fn render_match(text_match: &TextSearchMatch, painter: Painter, out: &mut Vec<String>) {
    let first_line = text_match
        .ranges
        .first()
        .map(|range| range.start_line)
        .unwrap_or_default();
    for (offset, line) in text_match.preview.text.split('\n').enumerate() {
        let spans: Vec<(usize, usize)> = text_match
            .preview
            .matches
            .iter()
            .filter(|range| range.start_line <= offset && offset <= range.end_line)
            .map(|range| {
                let start = if range.start_line == offset {
                    range.start_column
                } else {
                    0
                };
                let end = if range.end_line == offset {
                    range.end_column
                } else {
                    usize::MAX
                };
                (start, end)
            })
            .collect();
        out.push(format!(
            "{}{}",
            gutter(first_line + offset, ':', painter),
            highlight(line, &spans, painter)
        ));
    }
}

/// Render one file match: its path, then every match and context line.
pub fn render_file_match(file_match: &FileMatch, roots: &[ResourceId], painter: Painter) -> String {
    let mut lines = vec![painter.paint(&display_path(&file_match.resource, roots), path_style())];
    for result in &file_match.results {
        match result {
            TextSearchResult::Match(text_match) => render_match(text_match, painter, &mut lines),
            TextSearchResult::Context(context) => lines.push(format!(
                "{}{}",
                gutter(context.line_number, '-', painter),
                painter.paint(&context.text, dim_style())
            )),
        }
    }
    lines.join("\n")
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

/// Closing lines: provider messages, counts, the limit notice and stats.
pub fn render_summary(complete: &SearchComplete, kind: QueryKind, painter: Painter) -> String {
    let mut lines = Vec::new();
    for message in &complete.messages {
        let label = match message.kind {
            MessageType::Information => painter.paint("note", Style::new().cyan().bold()),
            MessageType::Warning => painter.paint("warning", Style::new().yellow().bold()),
        };
        lines.push(format!("{label}: {}", message.text));
    }

    let files = complete.results.len();
    let mut summary = match kind {
        QueryKind::File => plural(files, "file", "files"),
        QueryKind::Text => format!(
            "{} in {}",
            plural(complete.match_count(), "match", "matches"),
            plural(files, "file", "files")
        ),
    };
    summary = painter.paint(&summary, Style::new().bold());
    if complete.limit_hit {
        summary.push_str(&painter.paint(
            " (result limit reached, more results available)",
            Style::new().yellow(),
        ));
    }
    lines.push(summary);

    if let Some(stats) = &complete.stats {
        let mut detail = stats.provider.clone();
        if let Some(walked) = stats.files_walked {
            detail.push_str(&format!(", {} walked", plural(walked as usize, "file", "files")));
        }
        if let Some(duration_ms) = stats.duration_ms {
            detail.push_str(&format!(", {duration_ms}ms"));
        }
        if stats.cache_hit == Some(true) {
            detail.push_str(", cached");
        }
        lines.push(painter.paint(&detail, dim_style()));
    }
    lines.join("\n")
}
