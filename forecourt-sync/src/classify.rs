//! Extension allow-list for automation exports.
//!
//! Runs before anything touches the file: a path that fails here is not an
//! export at all and leaves no trace in the transfer log.

use std::path::Path;

use forecourt_core::types::ExportFilter;

/// Category of a candidate export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Numbered automation dump, e.g. `pumps.trn0412`.
    Automation,
    /// Compressed archive export carrying the embedded station code.
    Archive,
    /// Plain data export.
    Data,
}

/// Classify a path by its extension, case-insensitively.
///
/// Rules, in order: an extension starting with the automation prefix, then
/// an exact archive-extension match, then an exact data-extension match.
/// `None` means the file is skipped entirely.
pub fn classify(path: &Path, filter: &ExportFilter) -> Option<ExportKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if ext.starts_with(&filter.automation_prefix.to_lowercase()) {
        Some(ExportKind::Automation)
    } else if ext == filter.archive_ext.to_lowercase() {
        Some(ExportKind::Archive)
    } else if ext == filter.data_ext.to_lowercase() {
        Some(ExportKind::Data)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
