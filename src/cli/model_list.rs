//! Model listing functionality
//!
//! This module prints the built-in model catalog grouped by provider family.

use crate::core::models::{load_builtin_models, CatalogModel, ProviderFamily, DEFAULT_MODEL_ID};

pub fn list_models() {
    let models = load_builtin_models();

    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("🎯 Default model: {DEFAULT_MODEL_ID}");
    println!();

    for family in ProviderFamily::all() {
        let members = family_members(&models, *family);
        if members.is_empty() {
            continue;
        }

        println!("{}:", family.display_name());
        for model in members {
            match &model.badge {
                Some(badge) => println!("  • {} [{badge}]", model.id),
                None => println!("  • {}", model.id),
            }
            if model.display_name != model.id {
                println!("    Name: {}", model.display_name);
            }
            if let Some(description) = &model.description {
                if !description.is_empty() {
                    println!("    {description}");
                }
            }
        }
        println!();
    }

    println!("Chat with one using 'palabre -m <model>' or '/model <model>' in a session.");
}

fn family_members(models: &[CatalogModel], family: ProviderFamily) -> Vec<&CatalogModel> {
    models.iter().filter(|m| m.family == family).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_model_belongs_to_a_listed_family() {
        let models = load_builtin_models();
        let grouped: usize = ProviderFamily::all()
            .iter()
            .map(|family| family_members(&models, *family).len())
            .sum();
        assert_eq!(grouped, models.len());
    }

    #[test]
    fn default_model_appears_in_its_family_group() {
        let models = load_builtin_models();
        let grok = family_members(&models, ProviderFamily::Grok);
        assert!(grok.iter().any(|m| m.id == DEFAULT_MODEL_ID));
    }
}
