//! Deterministic argument-list construction
//!
//! Every operation builds its `devpod` invocation here, nowhere else.
//! Provider options are passed as discrete `-o` / `key=value` token
//! pairs, never concatenated into a single flag, and iterate in sorted
//! key order so identical inputs always produce identical invocations.

use std::collections::BTreeMap;

pub fn list_workspaces() -> Vec<String> {
    svec(&["list", "--output", "json"])
}

pub fn create_workspace(
    name: &str,
    source: &str,
    provider: Option<&str>,
    ide: Option<&str>,
) -> Vec<String> {
    let mut args = svec(&["up", source, "--id", name]);
    if let Some(provider) = provider {
        args.push("--provider".to_string());
        args.push(provider.to_string());
    }
    if let Some(ide) = ide {
        args.push("--ide".to_string());
        args.push(ide.to_string());
    }
    args
}

pub fn start_workspace(name: &str, ide: Option<&str>) -> Vec<String> {
    let mut args = svec(&["up", name]);
    if let Some(ide) = ide {
        args.push("--ide".to_string());
        args.push(ide.to_string());
    }
    args
}

pub fn stop_workspace(name: &str) -> Vec<String> {
    svec(&["stop", name])
}

pub fn delete_workspace(name: &str, force: bool) -> Vec<String> {
    let mut args = svec(&["delete", name]);
    if force {
        args.push("--force".to_string());
    }
    args
}

pub fn workspace_status(name: &str) -> Vec<String> {
    svec(&["status", name, "--output", "json"])
}

pub fn ssh(name: &str, command: Option<&str>) -> Vec<String> {
    let mut args = svec(&["ssh", name]);
    if let Some(command) = command {
        args.push("--command".to_string());
        args.push(command.to_string());
    }
    args
}

pub fn list_providers() -> Vec<String> {
    svec(&["provider", "list", "--output", "json"])
}

pub fn add_provider(name: &str, options: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = svec(&["provider", "add", name]);
    for (key, value) in options {
        args.push("-o".to_string());
        args.push(format!("{key}={value}"));
    }
    args
}

fn svec(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
