use serde_json::Value;

/// Prefix substitution between paths of the debug info and paths of the client workspace.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    /// (normalized debuggee prefix, client prefix), longest prefix first.
    target_to_client: Vec<(String, String)>,
    /// (normalized client prefix, debuggee prefix), longest prefix first.
    client_to_target: Vec<(String, String)>,
}

impl SourceMap {
    /// Build from the `sourceMap` object of launch arguments: key is a debuggee prefix, value
    /// is a client prefix.
    pub fn from_launch_args(arguments: &Value) -> Self {
        let Some(Value::Object(map)) = arguments.get("sourceMap") else {
            return Self::default();
        };
        Self::from_pairs(
            map.iter()
                .filter_map(|(target, client)| Some((target.as_str(), client.as_str()?))),
        )
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = SourceMap::default();
        for (target, client) in pairs {
            map.target_to_client
                .push((norm_prefix(target), client.to_string()));
            map.client_to_target
                .push((norm_prefix(client), target.to_string()));
        }
        map.target_to_client
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        map.client_to_target
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        map
    }

    pub fn is_empty(&self) -> bool {
        self.target_to_client.is_empty()
    }

    pub fn to_client(&self, target_path: &str) -> String {
        apply(target_path, &self.target_to_client)
    }

    pub fn to_target(&self, client_path: &str) -> String {
        apply(client_path, &self.client_to_target)
    }
}

fn apply(path: &str, mapping: &[(String, String)]) -> String {
    let normalized = norm_path(path);
    mapping
        .iter()
        .find_map(|(from, to)| {
            normalized
                .strip_prefix(from.as_str())
                .map(|suffix| join_with_style(to, suffix))
        })
        .unwrap_or_else(|| path.to_string())
}

/// Join keeping separator style of the prefix.
fn join_with_style(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return prefix.to_string();
    }
    let windows_style = prefix.contains('\\');
    let mut out = prefix.to_string();
    if !out.ends_with('/') && !out.ends_with('\\') {
        out.push(if windows_style { '\\' } else { '/' });
    }
    if windows_style {
        out.push_str(&suffix.replace('/', "\\"));
    } else {
        out.push_str(suffix);
    }
    out
}

fn norm_prefix(s: &str) -> String {
    let mut out = norm_path(s);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

fn norm_path(s: &str) -> String {
    s.replace('\\', "/")
}
