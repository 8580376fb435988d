//! Assistant profile and the directive built from it

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persona of the assistant, loaded from `profile.json`
///
/// Every field is optional; gaps fall back to the built-in persona.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Name the assistant answers to
    #[serde(default = "default_name")]
    pub assistant_name: String,

    /// What the assistant is for
    #[serde(rename = "role", default = "default_role")]
    pub role_description: String,

    /// Speaking style
    #[serde(default = "default_tone")]
    pub tone: String,

    /// Behavioural principles, one per line in the directive
    #[serde(default)]
    pub principles: Vec<String>,

    /// Things the assistant must never do
    #[serde(default, alias = "do_not")]
    pub prohibitions: Vec<String>,

    /// Free-form facts about the user, passed through as JSON
    #[serde(default)]
    pub user_context: serde_json::Map<String, serde_json::Value>,
}

fn default_name() -> String {
    "セナ".to_string()
}

fn default_role() -> String {
    "ユーザーを支えるAI".to_string()
}

fn default_tone() -> String {
    "優しく短めに日本語で".to_string()
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            assistant_name: default_name(),
            role_description: default_role(),
            tone: default_tone(),
            principles: Vec::new(),
            prohibitions: Vec::new(),
            user_context: serde_json::Map::new(),
        }
    }
}

impl Profile {
    /// Load a profile, falling back to the default one
    ///
    /// A missing file is normal. An unreadable or malformed one is logged and
    /// otherwise ignored.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read profile");
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed profile");
                Self::default()
            }
        }
    }

    /// System directive that fixes the assistant's persona
    #[must_use]
    pub fn system_directive(&self) -> String {
        let user_context = if self.user_context.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string_pretty(&self.user_context).unwrap_or_else(|_| "{}".to_string())
        };

        let mut out = String::new();
        let _ = writeln!(out, "あなたの名前は{}。", self.assistant_name);
        let _ = writeln!(out, "役割: {}", self.role_description);
        let _ = writeln!(out, "口調/スタイル: {}\n", self.tone);
        let _ = writeln!(out, "行動原則:\n{}\n", bullet_list(&self.principles));
        let _ = writeln!(out, "禁止事項:\n{}\n", bullet_list(&self.prohibitions));
        let _ = writeln!(out, "ユーザー前提（参考）:\n{user_context}");
        out
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- なし".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
