//! Tool-output normalization
//!
//! The external tool is asked for JSON, but older builds and some code
//! paths emit human-oriented tables instead. Parsing is therefore an
//! explicit two-stage strategy: a strict typed decode, then a tolerant
//! line-oriented fallback that skips the header row and maps
//! whitespace-separated fields positionally onto configured column
//! names. Both stages yield the same logical shape to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Workspace record as emitted by `devpod list --output json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevPodWorkspace {
    pub id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default)]
    pub provider: WorkspaceProvider,
    #[serde(default)]
    pub machine: HashMap<String, Value>,
    #[serde(default)]
    pub ide: WorkspaceIde,
    #[serde(default)]
    pub source: WorkspaceSource,
    #[serde(default, rename = "creationTimestamp")]
    pub creation_timestamp: String,
    #[serde(default, rename = "lastUsed")]
    pub last_used: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceProvider {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceIde {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, rename = "gitRepository", skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<String>,
}

/// Provider record as emitted by `devpod provider list --output json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevPodProvider {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub default: bool,
}

/// Column order for the tabular fallback parser
///
/// The tool's column order has shifted between releases, so it is
/// configuration rather than a constant. The defaults match the output
/// observed from current builds.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub workspace_columns: Vec<String>,
    pub provider_columns: Vec<String>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            workspace_columns: ["name", "status", "provider", "ide"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            provider_columns: ["name", "version", "default"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Normalize workspace-list output: strict JSON first, tabular fallback
pub fn parse_workspace_list(stdout: &str, layout: &TableLayout) -> Vec<Value> {
    match serde_json::from_str::<Vec<DevPodWorkspace>>(stdout) {
        Ok(workspaces) => workspaces
            .into_iter()
            .map(|w| serde_json::to_value(w).unwrap_or(Value::Null))
            .collect(),
        Err(_) => parse_table(stdout, &layout.workspace_columns),
    }
}

/// Normalize provider-list output: strict JSON first, tabular fallback
pub fn parse_provider_list(stdout: &str, layout: &TableLayout) -> Vec<Value> {
    match serde_json::from_str::<Vec<DevPodProvider>>(stdout) {
        Ok(providers) => providers
            .into_iter()
            .map(|p| serde_json::to_value(p).unwrap_or(Value::Null))
            .collect(),
        Err(_) => parse_table(stdout, &layout.provider_columns),
    }
}

/// Normalize status output: the tool's JSON verbatim when well-formed,
/// else the trimmed text under a `status` attribute
pub fn parse_status(name: &str, stdout: &str) -> Value {
    match serde_json::from_str::<Value>(stdout) {
        Ok(status @ Value::Object(_)) => status,
        _ => json!({
            "name": name,
            "status": stdout.trim(),
        }),
    }
}

/// Tolerant positional table parser
///
/// The first non-empty line is a header and is skipped; every following
/// non-empty line is whitespace-split and zipped with the column names.
/// A `default` column holding `*` becomes the string `"true"`.
fn parse_table(output: &str, columns: &[String]) -> Vec<Value> {
    let mut rows = Vec::new();
    let mut lines = output.trim().lines().filter(|l| !l.trim().is_empty());
    // Header row.
    let _ = lines.next();

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let mut row = Map::new();
        for (column, field) in columns.iter().zip(fields.iter()) {
            let value = if column == "default" {
                Value::String((*field == "*").to_string())
            } else {
                Value::String((*field).to_string())
            };
            row.insert(column.clone(), value);
        }
        rows.push(Value::Object(row));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_workspace_list() {
        let stdout = r#"[{"id":"dev1","provider":{"name":"docker"},"source":{"gitRepository":"github.com/org/repo"}}]"#;
        let parsed = parse_workspace_list(stdout, &TableLayout::default());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["id"], "dev1");
        assert_eq!(parsed[0]["provider"]["name"], "docker");
    }

    #[test]
    fn empty_json_list_stays_empty() {
        let parsed = parse_workspace_list("[]", &TableLayout::default());
        assert!(parsed.is_empty());
    }

    #[test]
    fn tabular_fallback_maps_fields_positionally() {
        let stdout = "NAME STATUS\nfoo Running";
        let parsed = parse_workspace_list(stdout, &TableLayout::default());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["name"], "foo");
        assert_eq!(parsed[0]["status"], "Running");
        assert!(parsed[0].get("provider").is_none());
    }

    #[test]
    fn tabular_fallback_with_full_rows() {
        let stdout = "NAME  STATUS   PROVIDER  IDE\n\
                      alpha Running  docker    vscode\n\
                      beta  Stopped  ssh       none\n";
        let parsed = parse_workspace_list(stdout, &TableLayout::default());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["provider"], "docker");
        assert_eq!(parsed[1]["name"], "beta");
        assert_eq!(parsed[1]["ide"], "none");
    }

    #[test]
    fn swapped_column_layout_is_honored() {
        let layout = TableLayout {
            workspace_columns: ["name", "provider", "status", "ide"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..TableLayout::default()
        };
        let stdout = "NAME PROVIDER STATUS\nfoo docker Running";
        let parsed = parse_workspace_list(stdout, &layout);
        assert_eq!(parsed[0]["provider"], "docker");
        assert_eq!(parsed[0]["status"], "Running");
    }

    #[test]
    fn provider_default_column_reads_star_marker() {
        let stdout = "NAME   VERSION DEFAULT\ndocker v0.5.0  *\nssh    v0.5.0  -";
        let parsed = parse_provider_list(stdout, &TableLayout::default());
        assert_eq!(parsed[0]["default"], "true");
        assert_eq!(parsed[1]["default"], "false");
    }

    #[test]
    fn status_falls_back_to_trimmed_text() {
        let parsed = parse_status("foo", "Running\n");
        assert_eq!(parsed, serde_json::json!({"name": "foo", "status": "Running"}));

        let parsed = parse_status("foo", r#"{"id":"foo","state":"Running"}"#);
        assert_eq!(parsed["state"], "Running");
    }
}
