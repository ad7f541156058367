use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SiltError, SiltResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Analysis,
    Enhancement,
    Summarization,
    Extraction,
    Classification,
    Generation,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub default: Option<String>,
    pub validation_pattern: Option<String>,
}

impl TemplateVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required: true,
            default: None,
            validation_pattern: None,
        }
    }
}

/// Per-model option overrides (temperature, max tokens, ...) applied on top
/// of a processor's own defaults when a template is rendered for that model.
pub type ModelOverrides = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub template: String,
    pub variables: Vec<TemplateVariable>,
    pub model_overrides: ModelOverrides,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub avg_quality_score: Option<f64>,
    pub success_rate: Option<f64>,
}

fn placeholder_regex() -> Regex {
    Regex::new(r"\{([^}]+)\}").expect("static pattern")
}

fn variable_name_regex() -> Regex {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern")
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        category: TemplateCategory,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            category,
            template: template.into(),
            variables: Vec::new(),
            model_overrides: ModelOverrides::new(),
            tags: Vec::new(),
            author: None,
            version: 1,
            created_at: now,
            updated_at: now,
            usage_count: 0,
            last_used: None,
            avg_quality_score: None,
            success_rate: None,
        }
    }

    /// Names of every `{placeholder}` appearing in the template body.
    pub fn placeholders(&self) -> HashSet<String> {
        placeholder_regex()
            .captures_iter(&self.template)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Every declared variable must appear in the template and vice versa;
    /// every variable name must be a valid identifier.
    pub fn validate(&self) -> SiltResult<()> {
        let name_re = variable_name_regex();
        let declared: HashSet<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        let used = self.placeholders();

        for name in &declared {
            if !name_re.is_match(name) {
                return Err(SiltError::InvalidInput(format!(
                    "variable name {name:?} is not a valid identifier"
                )));
            }
        }
        for name in used.difference(&declared) {
            return Err(SiltError::UnknownPlaceholder(name.clone()));
        }
        for name in declared.difference(&used) {
            return Err(SiltError::InvalidInput(format!(
                "variable {name:?} is declared but never used in the template"
            )));
        }
        Ok(())
    }

    /// Resolve and substitute every declared variable, in declaration order.
    pub fn render(&self, vars: &BTreeMap<String, String>) -> SiltResult<String> {
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for var in &self.variables {
            let value = if let Some(v) = vars.get(&var.name) {
                v.clone()
            } else if let Some(default) = &var.default {
                default.clone()
            } else if var.required {
                return Err(SiltError::MissingVariable(var.name.clone()));
            } else {
                continue;
            };

            if let Some(pattern) = &var.validation_pattern {
                let re = Regex::new(pattern)
                    .map_err(|e| SiltError::InvalidInput(format!("bad validation pattern: {e}")))?;
                if !re.is_match(&value) {
                    return Err(SiltError::VariableValidation {
                        name: var.name.clone(),
                        value,
                        pattern: pattern.clone(),
                    });
                }
            }
            resolved.insert(var.name.clone(), value);
        }

        let mut out = String::with_capacity(self.template.len());
        let mut last = 0;
        for cap in placeholder_regex().captures_iter(&self.template) {
            let m = cap.get(0).expect("group 0 always matches");
            out.push_str(&self.template[last..m.start()]);
            let name = &cap[1];
            match resolved.get(name) {
                Some(value) => out.push_str(value),
                None => return Err(SiltError::UnknownPlaceholder(name.to_string())),
            }
            last = m.end();
        }
        out.push_str(&self.template[last..]);
        Ok(out)
    }

    /// Model-specific overrides for a given call, if any are declared.
    pub fn overrides_for(&self, model: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.model_overrides.get(model)
    }

    /// Update usage counters with a true running mean, not a last-value
    /// overwrite.
    pub fn record_usage(&mut self, quality_score: Option<f64>, success: bool) {
        self.usage_count += 1;
        self.last_used = Some(Utc::now());

        if let Some(score) = quality_score {
            self.avg_quality_score = Some(running_mean(
                self.avg_quality_score,
                self.usage_count,
                score,
            ));
        }
        let success_value = if success { 1.0 } else { 0.0 };
        self.success_rate = Some(running_mean(self.success_rate, self.usage_count, success_value));
    }
}

fn running_mean(previous: Option<f64>, count: u64, new_value: f64) -> f64 {
    match previous {
        None => new_value,
        Some(prev) => {
            let n = count as f64;
            prev + (new_value - prev) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_with(vars: Vec<TemplateVariable>, body: &str) -> PromptTemplate {
        let mut t = PromptTemplate::new("t", body, TemplateCategory::Summarization);
        t.variables = vars;
        t
    }

    #[test]
    fn render_substitutes_and_applies_defaults() {
        let t = template_with(
            vec![
                TemplateVariable::new("content"),
                TemplateVariable {
                    required: false,
                    default: Some("50".into()),
                    ..TemplateVariable::new("max")
                },
            ],
            "Summarise: {content} in {max} words",
        );
        let mut vars = BTreeMap::new();
        vars.insert("content".to_string(), "Hi".to_string());
        assert_eq!(t.render(&vars).unwrap(), "Summarise: Hi in 50 words");
    }

    #[test]
    fn render_missing_required_variable_errors() {
        let t = template_with(vec![TemplateVariable::new("content")], "{content}");
        assert!(matches!(
            t.render(&BTreeMap::new()),
            Err(SiltError::MissingVariable(name)) if name == "content"
        ));
    }

    #[test]
    fn validate_rejects_mismatched_variables() {
        let t = template_with(vec![TemplateVariable::new("unused")], "no placeholders here");
        assert!(t.validate().is_err());
    }

    #[test]
    fn record_usage_tracks_running_mean() {
        let mut t = template_with(vec![], "static");
        t.record_usage(Some(4.0), true);
        t.record_usage(Some(2.0), false);
        assert_eq!(t.usage_count, 2);
        assert_eq!(t.avg_quality_score, Some(3.0));
        assert_eq!(t.success_rate, Some(0.5));
    }
}
