//! Prompt Template Provider contract
//!
//! Templates are looked up by name, language and provider hint. Rendering
//! substitutes `{{var}}` placeholders; unknown placeholders are left as-is.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A prompt template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name
    pub name: String,
    /// Language code (`en`, `de`, ...); `None` matches any language
    pub language: Option<String>,
    /// Provider this variant is tuned for; `None` matches any provider
    pub provider_hint: Option<String>,
    /// Body with `{{var}}` placeholders
    pub body: String,
}

impl PromptTemplate {
    /// Language- and provider-neutral template
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
            provider_hint: None,
            body: body.into(),
        }
    }

    /// Restrict to a language
    #[must_use]
    pub fn for_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Restrict to a provider
    #[must_use]
    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_hint = Some(provider.into());
        self
    }
}

/// Source of prompt templates
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Best template for the name, language and provider; `None` if there is none
    async fn get_template(
        &self,
        name: &str,
        language: Option<&str>,
        provider_hint: Option<&str>,
    ) -> Option<PromptTemplate>;

    /// Render a template with variables
    fn render_template(&self, template: &PromptTemplate, vars: &HashMap<String, String>) -> String {
        render(&template.body, vars)
    }
}

/// Substitute `{{name}}` placeholders; whitespace inside the braces is ignored
#[must_use]
pub fn render(body: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Templates held in memory
#[derive(Debug, Default)]
pub struct InMemoryTemplateProvider {
    templates: DashMap<String, Vec<PromptTemplate>>,
}

impl InMemoryTemplateProvider {
    /// Empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template variant
    pub fn insert(&self, template: PromptTemplate) {
        self.templates
            .entry(template.name.clone())
            .or_default()
            .push(template);
    }

    /// Builder form of [`insert`](Self::insert)
    #[must_use]
    pub fn with_template(self, template: PromptTemplate) -> Self {
        self.insert(template);
        self
    }
}

/// How well a variant fits: exact matches beat neutral variants, mismatches are excluded
fn specificity(wanted: Option<&str>, offered: Option<&str>) -> Option<u8> {
    match (wanted, offered) {
        (_, None) => Some(0),
        (Some(w), Some(o)) if w.eq_ignore_ascii_case(o) => Some(1),
        _ => None,
    }
}

#[async_trait]
impl TemplateProvider for InMemoryTemplateProvider {
    async fn get_template(
        &self,
        name: &str,
        language: Option<&str>,
        provider_hint: Option<&str>,
    ) -> Option<PromptTemplate> {
        let variants = self.templates.get(name)?;
        let best = variants
            .iter()
            .filter_map(|t| {
                let lang = specificity(language, t.language.as_deref())?;
                let provider = specificity(provider_hint, t.provider_hint.as_deref())?;
                Some((lang * 2 + provider, t))
            })
            // Earliest-inserted wins among equals
            .rev()
            .max_by_key(|(score, _)| *score)
            .map(|(_, t)| t.clone());
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_known_vars() {
        let out = render("Hello {{ name }}, you are {{role}}.", &vars(&[("name", "Ada"), ("role", "admin")]));
        assert_eq!(out, "Hello Ada, you are admin.");
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed() {
        assert_eq!(render("{{missing}} ok", &HashMap::new()), "{{missing}} ok");
        assert_eq!(render("open {{ never", &HashMap::new()), "open {{ never");
    }

    #[tokio::test]
    async fn test_most_specific_variant_wins() {
        let provider = InMemoryTemplateProvider::new()
            .with_template(PromptTemplate::new("summary", "generic"))
            .with_template(PromptTemplate::new("summary", "german").for_language("de"))
            .with_template(
                PromptTemplate::new("summary", "german-openai")
                    .for_language("de")
                    .for_provider("openai"),
            );

        let t = provider.get_template("summary", Some("de"), Some("openai")).await.unwrap();
        assert_eq!(t.body, "german-openai");

        let t = provider.get_template("summary", Some("de"), Some("ollama")).await.unwrap();
        assert_eq!(t.body, "german");

        let t = provider.get_template("summary", Some("fr"), None).await.unwrap();
        assert_eq!(t.body, "generic");

        assert!(provider.get_template("other", None, None).await.is_none());
    }

    #[tokio::test]
    async fn test_equal_specificity_prefers_first_inserted() {
        let provider = InMemoryTemplateProvider::new()
            .with_template(PromptTemplate::new("t", "first"))
            .with_template(PromptTemplate::new("t", "second"));
        let t = provider.get_template("t", None, None).await.unwrap();
        assert_eq!(t.body, "first");
    }
}
