//! Persona ("assistant profile") settings and the single-active toggle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persona identifier as issued by the completion backend.
pub type PersonaId = String;

/// Model used when a persona is created without one.
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-05-13";

/// Tool enabled on a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolConfig {
    CodeInterpreter,
    FileSearch,
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        parameters: Value,
    },
}

/// Files and vector stores attached to a persona's tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResources {
    /// Files readable by the code interpreter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_interpreter_file_ids: Vec<String>,
    /// Vector stores searched by file search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_search_vector_store_ids: Vec<String>,
}

/// A configured conversational profile owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Backend assistant id.
    pub id: PersonaId,
    /// Display name; may be empty for assistants created elsewhere.
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// System instructions the persona runs with.
    #[serde(default)]
    pub instructions: String,
    /// Model identifier.
    pub model: String,
    /// Enabled tools.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    /// Files and vector stores used by the tools.
    #[serde(default)]
    pub tool_resources: ToolResources,
    /// Sampling temperature override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Creation timestamp (Unix epoch seconds).
    #[serde(default)]
    pub created_at: i64,
    /// Whether this is the user's active persona.
    #[serde(default)]
    pub activated: bool,
}

/// Parameters for creating a persona on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaParams {
    /// Display name of the new persona.
    pub name: String,
    /// System instructions.
    pub instructions: String,
    /// Model identifier.
    pub model: String,
    /// Tools to enable.
    pub tools: Vec<ToolConfig>,
}

impl Default for PersonaParams {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            instructions: "You are a helpful personal assistant. Answer concisely.".to_string(),
            model: DEFAULT_MODEL.to_string(),
            tools: Vec::new(),
        }
    }
}

/// Return `personas` with only the element at `index` activated.
///
/// Every persona is deactivated first. An out-of-range `index` leaves the
/// whole list deactivated instead of failing.
#[must_use]
pub fn activate(personas: &[Persona], index: usize) -> Vec<Persona> {
    personas
        .iter()
        .enumerate()
        .map(|(i, persona)| Persona {
            activated: i == index,
            ..persona.clone()
        })
        .collect()
}

/// Reconcile a user's saved `personas` with the backend `account` listing.
///
/// Personas still on the account keep their saved position and activation
/// but take the account's current fields. Personas gone from the account are
/// dropped, new ones are appended inactive. At most one persona stays active.
#[must_use]
pub fn merge(personas: &[Persona], account: Vec<Persona>) -> Vec<Persona> {
    let mut fresh: Vec<Option<Persona>> = account.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(fresh.len());
    let mut active_kept = false;

    for saved in personas {
        let Some(current) = fresh
            .iter_mut()
            .find(|p| p.as_ref().is_some_and(|p| p.id == saved.id))
            .and_then(Option::take)
        else {
            continue;
        };
        let activated = saved.activated && !active_kept;
        active_kept |= activated;
        merged.push(Persona {
            activated,
            ..current
        });
    }
    merged.extend(fresh.into_iter().flatten().map(|p| Persona {
        activated: false,
        ..p
    }));
    merged
}

/// The activated persona, if any.
#[must_use]
pub fn active(personas: &[Persona]) -> Option<&Persona> {
    personas.iter().find(|p| p.activated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(id: &str, activated: bool) -> Persona {
        Persona {
            id: id.to_string(),
            name: format!("persona {id}"),
            description: None,
            instructions: String::new(),
            model: DEFAULT_MODEL.to_string(),
            tools: vec![ToolConfig::CodeInterpreter],
            tool_resources: ToolResources::default(),
            temperature: None,
            top_p: None,
            created_at: 0,
            activated,
        }
    }

    fn flags(personas: &[Persona]) -> Vec<bool> {
        personas.iter().map(|p| p.activated).collect()
    }

    #[test]
    fn test_activate_middle_of_three() {
        let list = vec![persona("a", true), persona("b", false), persona("c", false)];
        let toggled = activate(&list, 1);
        assert_eq!(flags(&toggled), vec![false, true, false]);
        assert_eq!(active(&toggled).map(|p| p.id.as_str()), Some("b"));
    }

    #[test]
    fn test_activate_every_valid_index_leaves_exactly_one() {
        let list: Vec<Persona> = (0..5).map(|i| persona(&i.to_string(), i % 2 == 0)).collect();
        for index in 0..list.len() {
            let toggled = activate(&list, index);
            assert_eq!(toggled.iter().filter(|p| p.activated).count(), 1);
            assert!(toggled[index].activated);
        }
    }

    #[test]
    fn test_activate_out_of_range_deactivates_all() {
        let list = vec![persona("a", true), persona("b", true)];
        let toggled = activate(&list, 7);
        assert_eq!(flags(&toggled), vec![false, false]);
        assert!(active(&toggled).is_none());
    }

    #[test]
    fn test_activate_preserves_other_fields() {
        let list = vec![persona("a", false)];
        let toggled = activate(&list, 0);
        assert_eq!(toggled[0].id, "a");
        assert_eq!(toggled[0].tools, vec![ToolConfig::CodeInterpreter]);
    }

    #[test]
    fn test_tool_config_wire_shape() {
        let json = serde_json::to_value(ToolConfig::FileSearch).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "file_search" }));
    }

    #[test]
    fn test_merge_keeps_choice_and_appends_new() {
        let saved = vec![persona("b", true), persona("a", false)];
        let mut renamed = persona("b", false);
        renamed.name = "Renamed".into();
        let account = vec![persona("a", false), persona("c", true), renamed];

        let merged = merge(&saved, account);

        let ids: Vec<&str> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(flags(&merged), vec![true, false, false]);
        assert_eq!(merged[0].name, "Renamed");
    }

    #[test]
    fn test_merge_drops_deleted_personas() {
        let saved = vec![persona("gone", true), persona("kept", false)];

        let merged = merge(&saved, vec![persona("kept", false)]);

        assert_eq!(merged.len(), 1);
        assert!(active(&merged).is_none());
    }

    #[test]
    fn test_merge_never_yields_two_active() {
        let saved = vec![persona("a", true), persona("b", true)];

        let merged = merge(&saved, vec![persona("a", false), persona("b", false)]);

        assert_eq!(flags(&merged), vec![true, false]);
    }
}
