//! Plain-text rendering of daemon responses.

use std::fmt::Write;

use apiforge_core::{
    HealthResponse, ResourceData, ResourceDescriptor, SearchPage, SearchStats, SyncReport,
    SyncStatusResponse,
};
use chrono::{DateTime, Utc};

/// One line per descriptor: method and URL for operations, name for schemas.
pub fn descriptor_line(descriptor: &ResourceDescriptor) -> String {
    match &descriptor.data {
        ResourceData::Rest(rest) => format!(
            "{:<7} {:<40} {}  [{}]",
            rest.method.as_str(),
            rest.url,
            descriptor.name,
            descriptor.path
        ),
        ResourceData::Schema(_) => format!(
            "{:<7} {:<40} [{}]",
            "SCHEMA", descriptor.name, descriptor.path
        ),
    }
}

pub fn page(page: &SearchPage) -> String {
    if page.data.is_empty() {
        return "No results.".to_string();
    }

    let mut out = String::new();
    for descriptor in &page.data {
        let _ = writeln!(out, "{}", descriptor_line(descriptor));
    }
    let _ = write!(
        out,
        "\nPage {}/{} ({} results)",
        page.page, page.total_pages, page.total
    );
    if page.has_next {
        let _ = write!(out, ", next: --page {}", page.page + 1);
    }
    out
}

pub fn descriptor_list(descriptors: &[ResourceDescriptor]) -> String {
    if descriptors.is_empty() {
        return "Nothing accessed yet.".to_string();
    }
    descriptors
        .iter()
        .map(descriptor_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full detail of one descriptor.
pub fn descriptor(descriptor: &ResourceDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", descriptor.name, descriptor.resource_type());
    let _ = writeln!(out, "  id:      {}", descriptor.id);
    let _ = writeln!(out, "  source:  {}", descriptor.source);
    let _ = writeln!(out, "  path:    {}", descriptor.path);
    if let Some(at) = descriptor.last_accessed.and_then(DateTime::<Utc>::from_timestamp_millis) {
        let _ = writeln!(out, "  opened:  {}", at.format("%Y-%m-%d %H:%M UTC"));
    }

    match &descriptor.data {
        ResourceData::Rest(rest) => {
            let _ = writeln!(out, "\n  {} {}", rest.method, rest.url);
            if !rest.summary.is_empty() {
                let _ = writeln!(out, "  {}", rest.summary);
            }
            if !rest.description.is_empty() {
                let _ = writeln!(out, "\n  {}", rest.description.trim());
            }
            if !rest.variables.is_empty() {
                let _ = writeln!(out, "\n  variables:");
                for variable in &rest.variables {
                    let required = if variable.required { " (required)" } else { "" };
                    let _ = writeln!(
                        out,
                        "    {} in {:?}{required}",
                        variable.name, variable.location
                    );
                }
            }
            if let Some(body) = &rest.request_body {
                let _ = writeln!(out, "  request:  {body}");
            }
            if let Some(response) = &rest.response {
                let _ = writeln!(out, "  response: {response}");
            }
            for (status, schema) in &rest.errors {
                let _ = writeln!(out, "  error {status}: {schema}");
            }
        }
        ResourceData::Schema(schema) => {
            let pretty = serde_json::to_string_pretty(&schema.schema).unwrap_or_default();
            let _ = writeln!(out);
            for line in pretty.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
    }

    out.trim_end().to_string()
}

pub fn stats(health: &HealthResponse, stats: &SearchStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "apiforge daemon {}", health.version);
    let _ = writeln!(
        out,
        "{} descriptors: {} operations, {} schemas, {} sources, {} controllers",
        stats.total, stats.rest_count, stats.schema_count, stats.unique_sources, stats.unique_controllers
    );

    for source in &stats.sources {
        let _ = write!(
            out,
            "  {:<24} {:>5} ops {:>5} schemas {:>4} controllers",
            source.source, source.rest_count, source.schema_count, source.controllers
        );
        if let Some(files) = source.used_in_files {
            let _ = write!(out, "  used in {files} files");
        }
        let _ = writeln!(out);
    }

    if let Some(usage) = &stats.usage {
        let _ = writeln!(
            out,
            "usage ({} files): {} used / {} unused operations, {} used / {} unused schemas",
            usage.files_scanned,
            usage.used_endpoints,
            usage.unused_endpoints,
            usage.used_datatypes,
            usage.unused_datatypes
        );
    }

    out.trim_end().to_string()
}

pub fn sync_report(report: &SyncReport) -> String {
    format!(
        "Synced {} ({} sources): {} removed, {} added, {} descriptors indexed",
        report.key,
        report.sources.len(),
        report.removed,
        report.added,
        report.total
    )
}

pub fn sync_status(status: &SyncStatusResponse) -> String {
    use apiforge_core::SyncState;

    match status.status {
        SyncState::Idle => format!("{}: never synced", status.key),
        SyncState::Running { started_at, .. } => {
            format!("{}: running since {}", status.key, timestamp(started_at))
        }
        SyncState::Done { finished_at, .. } => {
            format!("{}: done at {}", status.key, timestamp(finished_at))
        }
        SyncState::TimedOut { started_at, .. } => format!(
            "{}: timed out (started {})",
            status.key,
            timestamp(started_at)
        ),
    }
}

fn timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
