//! Rendering of ranked results into one presentation-ready document.

use std::fmt::Write;
use std::path::Path;

use crate::document::{DemoFile, ParentContext, SearchResult};

/// Returned in place of an empty result list.
pub const NO_RESULTS: &str = "No relevant documentation found for this query.";

/// Separates consecutive result blocks.
pub const RESULT_DELIMITER: &str = "\n\n---\n\n";

/// Formatting switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Render the parent-context sub-block when a result has one.
    pub include_parent: bool,
}

/// Render `results` in order, one block per result.
///
/// Each block holds a header (component, section path, similarity
/// percentage), the content, then the parent section when enabled and
/// present, then one fenced block per demo file, including files whose code
/// is blank. An empty input yields [`NO_RESULTS`].
pub fn format_results(results: &[SearchResult], options: FormatOptions) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }
    results
        .iter()
        .map(|result| format_block(result, options))
        .collect::<Vec<_>>()
        .join(RESULT_DELIMITER)
}

fn format_block(result: &SearchResult, options: FormatOptions) -> String {
    let chunk = &result.chunk;
    let mut block = format!(
        "## {} · {} ({:.1}% match)\n\n{}",
        chunk.component,
        chunk.section_path,
        result.similarity * 100.0,
        chunk.content.trim()
    );

    if options.include_parent {
        if let Some(parent) = result.parent_context.as_ref().filter(|p| has_text(p)) {
            // Writing to a String cannot fail.
            let _ = write!(
                block,
                "\n\n### Parent section: {}\n\n{}",
                parent.section_path,
                parent.content.trim()
            );
        }
    }

    for demo in &chunk.demo_code {
        let _ = write!(block, "\n\n### Example: {}\n\n{}", demo.file, fenced(demo));
    }
    block
}

fn has_text(parent: &ParentContext) -> bool {
    !parent.content.trim().is_empty()
}

fn fenced(demo: &DemoFile) -> String {
    let language =
        Path::new(&demo.file).extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    // Lengthen the fence when the code itself contains one.
    let mut fence = "```".to_string();
    while demo.code.contains(&fence) {
        fence.push('`');
    }
    format!("{fence}{language}\n{}\n{fence}", demo.code.trim_end())
}
