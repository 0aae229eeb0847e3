//! Rendering for `--output`.
//!
//! `table` is human-oriented (tabled rows for lists, a hand-built detail
//! block for single items). `json`, `json-compact` and `yaml` serialize the
//! view types directly; `plain` prints one key per line for scripting.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use mcontrol_core::SyncState;

use crate::cli::{ColorMode, OutputFormat};

// ── Color ────────────────────────────────────────────────────────────

/// Whether to emit ANSI colors. `auto` honors `NO_COLOR` and a TTY stdout.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
    }
}

/// Sync state label, green when synced and yellow in fallback.
pub fn sync_label(sync: SyncState, color: bool) -> String {
    let label = sync.to_string();
    if !color {
        return label;
    }
    match sync {
        SyncState::Synced => label.green().to_string(),
        SyncState::CloudFallback => label.yellow().to_string(),
        SyncState::CloudOnly | SyncState::Mapped => label.cyan().to_string(),
        SyncState::Uninitialized => label.dimmed().to_string(),
    }
}

pub fn warn_label(text: &str, color: bool) -> String {
    if color {
        text.yellow().bold().to_string()
    } else {
        text.to_owned()
    }
}

pub fn dim(text: &str, color: bool) -> String {
    if color {
        text.dimmed().to_string()
    } else {
        text.to_owned()
    }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Render a collection. `to_row` builds the table row, `key` the plain line.
pub fn render_list<T, R>(
    format: &OutputFormat,
    items: &[T],
    to_row: impl Fn(&T) -> R,
    key: impl Fn(&T) -> String,
) -> String
where
    T: Serialize,
    R: Tabled,
{
    if let Some(text) = structured(format, items) {
        return text;
    }
    if matches!(format, OutputFormat::Plain) {
        return items.iter().map(key).collect::<Vec<_>>().join("\n");
    }
    let rows: Vec<R> = items.iter().map(to_row).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Render one item. `detail` produces the table-mode text block.
pub fn render_single<T: Serialize>(
    format: &OutputFormat,
    item: &T,
    detail: impl Fn(&T) -> String,
    key: impl Fn(&T) -> String,
) -> String {
    match (structured(format, item), format) {
        (Some(text), _) => text,
        (None, OutputFormat::Plain) => key(item),
        (None, _) => detail(item),
    }
}

/// Serde output for the machine-readable formats, `None` for table/plain.
fn structured<T: Serialize + ?Sized>(format: &OutputFormat, data: &T) -> Option<String> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data),
        OutputFormat::JsonCompact => serde_json::to_string(data),
        OutputFormat::Yaml => return Some(yaml(data)),
        OutputFormat::Table | OutputFormat::Plain => return None,
    };
    Some(text.expect("serialization should not fail"))
}

pub(crate) fn yaml<T: Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).expect("serialization should not fail")
}

/// Write to stdout unless `--quiet` or there is nothing to print.
pub fn print_output(text: &str, quiet: bool) {
    if quiet || text.is_empty() {
        return;
    }
    let _ = writeln!(io::stdout().lock(), "{text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Unit {
        id: String,
        name: String,
    }

    #[derive(Tabled)]
    struct UnitRow {
        #[tabled(rename = "ID")]
        id: String,
    }

    fn units() -> Vec<Unit> {
        vec![
            Unit {
                id: "101".into(),
                name: "Living".into(),
            },
            Unit {
                id: "102".into(),
                name: "Bedroom".into(),
            },
        ]
    }

    fn list(format: &OutputFormat) -> String {
        render_list(
            format,
            &units(),
            |u| UnitRow { id: u.id.clone() },
            |u| u.id.clone(),
        )
    }

    #[test]
    fn plain_lists_one_id_per_line() {
        assert_eq!(list(&OutputFormat::Plain), "101\n102");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = list(&OutputFormat::JsonCompact);
        assert!(!out.contains('\n'));
        assert!(out.contains(r#""name":"Bedroom""#));
    }

    #[test]
    fn table_has_header() {
        let out = list(&OutputFormat::Table);
        assert!(out.contains("ID"));
        assert!(out.contains("102"));
    }

    #[test]
    fn single_uses_detail_in_table_mode() {
        let unit = &units()[0];
        let detail = |u: &Unit| format!("Name: {}", u.name);
        let key = |u: &Unit| u.id.clone();
        assert_eq!(
            render_single(&OutputFormat::Table, unit, detail, key),
            "Name: Living"
        );
        assert_eq!(render_single(&OutputFormat::Plain, unit, detail, key), "101");
        assert!(render_single(&OutputFormat::Yaml, unit, detail, key).contains("name: Living"));
    }

    #[test]
    fn labels_are_plain_without_color() {
        assert_eq!(sync_label(SyncState::CloudFallback, false), "cloud_fallback");
        assert_ne!(sync_label(SyncState::Synced, true), "synced");
        assert_eq!(warn_label("gateway down", false), "gateway down");
    }
}
