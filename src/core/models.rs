//! Provider family routing and the built-in model catalog.
//!
//! The gateway accepts a single model id string and routes it upstream; which
//! family serves a given id is decided here, client-side, because family
//! determines streaming capability and attachment support.

use serde::{Deserialize, Serialize};

/// Model used when the config names none.
pub const DEFAULT_MODEL_ID: &str = "x-ai/grok-4";

/// The provider families the gateway brokers. Closed set: adding a family
/// means a new variant, a routing prefix, and catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    Claude,
    Grok,
    Mistral,
    Perplexity,
    Kimi,
    OpenAi,
    OpenRouter,
}

impl ProviderFamily {
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderFamily::Claude => "Claude",
            ProviderFamily::Grok => "Grok",
            ProviderFamily::Mistral => "Mistral",
            ProviderFamily::Perplexity => "Perplexity",
            ProviderFamily::Kimi => "Kimi",
            ProviderFamily::OpenAi => "OpenAI",
            ProviderFamily::OpenRouter => "OpenRouter",
        }
    }

    /// Whether the gateway yields partial objects for this family. Families
    /// that answer in one piece get word-grouped pacing client-side.
    pub fn streams_natively(self) -> bool {
        !matches!(self, ProviderFamily::Kimi | ProviderFamily::OpenAi)
    }

    /// Whether chat calls for this family may carry an image attachment.
    pub fn accepts_images(self) -> bool {
        matches!(self, ProviderFamily::Grok)
    }

    pub fn all() -> &'static [ProviderFamily] {
        &[
            ProviderFamily::Claude,
            ProviderFamily::Grok,
            ProviderFamily::Mistral,
            ProviderFamily::Perplexity,
            ProviderFamily::Kimi,
            ProviderFamily::OpenAi,
            ProviderFamily::OpenRouter,
        ]
    }
}

/// Ordered prefix table from model id to family. Order matters: `openrouter`
/// ids must match before the bare `o` prefix that catches the reasoning
/// series.
const MODEL_ROUTES: &[(&str, ProviderFamily)] = &[
    ("x-ai/grok", ProviderFamily::Grok),
    ("claude", ProviderFamily::Claude),
    ("mistral", ProviderFamily::Mistral),
    ("perplexity", ProviderFamily::Perplexity),
    ("moonshotai", ProviderFamily::Kimi),
    ("openrouter", ProviderFamily::OpenRouter),
    ("gpt-", ProviderFamily::OpenAi),
    ("o", ProviderFamily::OpenAi),
];

/// Resolve a model id to its provider family, or `None` for ids no family
/// claims.
pub fn family_for_model(model_id: &str) -> Option<ProviderFamily> {
    MODEL_ROUTES
        .iter()
        .find(|(prefix, _)| model_id.starts_with(prefix))
        .map(|(_, family)| *family)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogModel {
    pub id: String,
    pub display_name: String,
    pub family: ProviderFamily,
    pub description: Option<String>,
    pub badge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelCatalogConfig {
    models: Vec<CatalogModel>,
}

/// Load the built-in model catalog from the embedded configuration
pub fn load_builtin_models() -> Vec<CatalogModel> {
    const CONFIG_CONTENT: &str = include_str!("../builtin_models.toml");

    let config: ModelCatalogConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_models.toml");

    config.models
}

/// Find a catalog model by ID (case-insensitive)
pub fn find_builtin_model(id: &str) -> Option<CatalogModel> {
    load_builtin_models()
        .into_iter()
        .find(|m| m.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_loads_and_contains_default_model() {
        let models = load_builtin_models();
        assert!(!models.is_empty());
        assert!(models.iter().any(|m| m.id == DEFAULT_MODEL_ID));

        for model in &models {
            assert!(!model.id.is_empty());
            assert!(!model.display_name.is_empty());
        }
    }

    #[test]
    fn every_catalog_entry_routes_to_its_declared_family() {
        for model in load_builtin_models() {
            assert_eq!(
                family_for_model(&model.id),
                Some(model.family),
                "catalog entry {} routes to the wrong family",
                model.id
            );
        }
    }

    #[test]
    fn find_builtin_model_is_case_insensitive() {
        let model = find_builtin_model("X-AI/GROK-4");
        assert!(model.is_some());
        assert_eq!(model.unwrap().id, "x-ai/grok-4");

        assert!(find_builtin_model("nonexistent-model").is_none());
    }

    #[test]
    fn route_order_lets_openrouter_win_over_bare_o() {
        assert_eq!(
            family_for_model("openrouter:moonshotai/kimi-k2"),
            Some(ProviderFamily::OpenRouter)
        );
        assert_eq!(family_for_model("o3"), Some(ProviderFamily::OpenAi));
        assert_eq!(family_for_model("o1-preview"), Some(ProviderFamily::OpenAi));
    }

    #[test]
    fn routes_match_original_prefixes() {
        assert_eq!(family_for_model("x-ai/grok-4"), Some(ProviderFamily::Grok));
        assert_eq!(
            family_for_model("claude-sonnet-4"),
            Some(ProviderFamily::Claude)
        );
        assert_eq!(
            family_for_model("mistralai/mistral-large"),
            Some(ProviderFamily::Mistral)
        );
        assert_eq!(
            family_for_model("perplexity/sonar-pro"),
            Some(ProviderFamily::Perplexity)
        );
        assert_eq!(
            family_for_model("moonshotai/kimi-k2"),
            Some(ProviderFamily::Kimi)
        );
        assert_eq!(family_for_model("gpt-4o"), Some(ProviderFamily::OpenAi));
    }

    #[test]
    fn unrouted_ids_resolve_to_none() {
        assert_eq!(family_for_model("llama-3-70b"), None);
        assert_eq!(family_for_model(""), None);
        assert_eq!(family_for_model("x-ai"), None);
    }

    #[test]
    fn family_capabilities() {
        assert!(ProviderFamily::Grok.accepts_images());
        assert!(ProviderFamily::all()
            .iter()
            .filter(|f| f.accepts_images())
            .eq([&ProviderFamily::Grok]));

        assert!(!ProviderFamily::Kimi.streams_natively());
        assert!(!ProviderFamily::OpenAi.streams_natively());
        assert!(ProviderFamily::Claude.streams_natively());
        assert!(ProviderFamily::Perplexity.streams_natively());
        assert!(ProviderFamily::OpenRouter.streams_natively());
    }
}
