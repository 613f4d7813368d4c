//! Pure template resolution: `{name}` substitution over a merged catalogue.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::settings::MessagingSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("unknown template key '{0}'")]
    UnknownTemplate(String),
}

/// Result of substituting variables into a template body.
///
/// Placeholders without a matching variable stay literal in `text` and are
/// listed in `unresolved`. A visible `{placeholder}` in front of an operator
/// beats a silently wrong message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    pub unresolved: BTreeSet<String>,
}

/// Replace every `{name}` occurrence with its variable value.
///
/// Pure and side-effect free. A `{` with no closing `}` on the same nesting
/// level is treated as literal text.
pub fn substitute(template: &str, variables: &BTreeMap<String, String>) -> Resolved {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = BTreeSet::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(['}', '{']) {
            Some(end) if after.as_bytes()[end] == b'}' => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(value) => text.push_str(value),
                    None => {
                        text.push('{');
                        text.push_str(name);
                        text.push('}');
                        if !name.is_empty() {
                            unresolved.insert(name.to_string());
                        }
                    }
                }
                rest = &after[end + 1..];
            }
            // another '{' opens before this one closes: emit literally
            Some(end) => {
                text.push('{');
                text.push_str(&after[..end]);
                rest = &after[end..];
            }
            None => {
                text.push('{');
                text.push_str(after);
                rest = "";
            }
        }
    }
    text.push_str(rest);

    Resolved { text, unresolved }
}

/// The merged template catalogue a resolution pass works against.
///
/// Layering, lowest to highest: built-in `templates` bodies, WhatsApp
/// per-key overrides, then custom templates (list order, later wins).
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: BTreeMap<String, String>,
}

impl TemplateSet {
    pub fn from_settings(settings: &MessagingSettings) -> Self {
        let mut templates: BTreeMap<String, String> = settings
            .templates
            .iter()
            .map(|(key, def)| (key.clone(), def.body.clone()))
            .collect();
        for (key, body) in &settings.whatsapp.templates {
            templates.insert(key.clone(), body.clone());
        }
        for custom in &settings.custom_templates {
            templates.insert(custom.key.clone(), custom.body.clone());
        }
        Self { templates }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn resolve(
        &self,
        key: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<Resolved, ResolutionError> {
        let body = self
            .templates
            .get(key)
            .ok_or_else(|| ResolutionError::UnknownTemplate(key.to_string()))?;
        Ok(substitute(body, variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn substitutes_every_occurrence() {
        let resolved = substitute(
            "{name} و {name} مرة أخرى",
            &vars(&[("name", "أحمد")]),
        );
        assert_eq!(resolved.text, "أحمد و أحمد مرة أخرى");
        assert!(resolved.unresolved.is_empty());
    }

    #[test]
    fn arabic_invoice_message_resolves() {
        let resolved = substitute(
            "مرحباً {customerName}، فاتورتك #{invoiceId} جاهزة",
            &vars(&[("customerName", "سارة"), ("invoiceId", "1042")]),
        );
        assert_eq!(resolved.text, "مرحباً سارة، فاتورتك #1042 جاهزة");
    }

    #[test]
    fn unmatched_placeholder_stays_literal_and_is_reported() {
        let resolved = substitute(
            "مرحباً {customerName}، الرابط: {invoiceLink}",
            &vars(&[("customerName", "سارة")]),
        );
        assert_eq!(resolved.text, "مرحباً سارة، الرابط: {invoiceLink}");
        assert_eq!(
            resolved.unresolved.iter().collect::<Vec<_>>(),
            vec!["invoiceLink"]
        );
    }

    #[test]
    fn empty_variable_value_substitutes_to_nothing() {
        let resolved = substitute(
            "المشكلة: {problem}{oldInvoiceNumber}",
            &vars(&[("problem", "شاشة"), ("oldInvoiceNumber", "")]),
        );
        assert_eq!(resolved.text, "المشكلة: شاشة");
    }

    #[test]
    fn stray_braces_are_literal() {
        let resolved = substitute("a { b {x} c", &vars(&[("x", "1")]));
        assert_eq!(resolved.text, "a { b 1 c");
        let resolved = substitute("trailing {", &vars(&[]));
        assert_eq!(resolved.text, "trailing {");
    }

    #[test]
    fn unknown_key_is_a_typed_error() {
        let set = TemplateSet::from_settings(&MessagingSettings::default());
        let err = set.resolve("noSuchTemplate", &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownTemplate("noSuchTemplate".to_string())
        );
    }

    #[test]
    fn whatsapp_override_beats_builtin_and_custom_beats_override() {
        let mut settings = MessagingSettings::default();
        settings
            .whatsapp
            .templates
            .insert("defaultMessage".into(), "واتساب: {invoiceId}".into());

        let set = TemplateSet::from_settings(&settings);
        let resolved = set
            .resolve("defaultMessage", &vars(&[("invoiceId", "7")]))
            .unwrap();
        assert_eq!(resolved.text, "واتساب: 7");

        settings.custom_templates.push(crate::settings::CustomTemplate {
            key: "defaultMessage".into(),
            entity_type: crate::events::EntityType::Invoice,
            status: None,
            body: "مخصص: {invoiceId}".into(),
        });
        let set = TemplateSet::from_settings(&settings);
        let resolved = set
            .resolve("defaultMessage", &vars(&[("invoiceId", "7")]))
            .unwrap();
        assert_eq!(resolved.text, "مخصص: 7");
    }
}
