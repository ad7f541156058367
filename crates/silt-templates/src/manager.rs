use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use silt_core::{PromptTemplate, TemplateCategory};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    UsageCount,
    LastUsed,
    CreatedAt,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<TemplateCategory>,
    pub tags: Vec<String>,
    pub sort_by: SortKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportPayload {
    pub export_version: String,
    pub export_timestamp: chrono::DateTime<Utc>,
    pub templates: Vec<PromptTemplate>,
}

/// Loads every `{id}.json` record under `storage_path` at construction and
/// keeps them in memory; every mutation is persisted back with a
/// write-temp-then-rename before the in-memory map is updated.
pub struct PromptTemplateManager {
    storage_path: PathBuf,
    templates: RwLock<BTreeMap<Uuid, PromptTemplate>>,
}

impl PromptTemplateManager {
    pub async fn load(storage_path: impl Into<PathBuf>) -> Result<Arc<Self>, TemplateError> {
        let storage_path = storage_path.into();
        tokio::fs::create_dir_all(&storage_path).await?;

        let mut templates = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&storage_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<PromptTemplate>(&raw) {
                Ok(template) => {
                    templates.insert(template.id, template);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed template file");
                }
            }
        }

        Ok(Arc::new(Self {
            storage_path,
            templates: RwLock::new(templates),
        }))
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.storage_path.join(format!("{id}.json"))
    }

    async fn persist(&self, template: &PromptTemplate) -> Result<(), TemplateError> {
        let serialized = serde_json::to_string_pretty(template)?;
        let final_path = self.path_for(&template.id);
        let tmp_path = final_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn create(&self, mut template: PromptTemplate) -> Result<PromptTemplate, TemplateError> {
        template.validate()?;
        let mut guard = self.templates.write().await;
        if guard.values().any(|t| t.name == template.name) {
            return Err(TemplateError::DuplicateName(template.name));
        }
        self.persist(&template).await?;
        guard.insert(template.id, template.clone());
        Ok(template)
    }

    pub async fn get(&self, id: &Uuid) -> Result<PromptTemplate, TemplateError> {
        self.templates
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<PromptTemplate, TemplateError> {
        self.templates
            .read()
            .await
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    pub async fn list(&self, filter: &ListFilter) -> Vec<PromptTemplate> {
        let guard = self.templates.read().await;
        let mut items: Vec<PromptTemplate> = guard
            .values()
            .filter(|t| filter.category.map(|c| c == t.category).unwrap_or(true))
            .filter(|t| filter.tags.iter().all(|tag| t.tags.contains(tag)))
            .cloned()
            .collect();

        match filter.sort_by {
            SortKey::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
            SortKey::UsageCount => items.sort_by(|a, b| b.usage_count.cmp(&a.usage_count)),
            SortKey::LastUsed => items.sort_by(|a, b| b.last_used.cmp(&a.last_used)),
            SortKey::CreatedAt => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        items
    }

    pub async fn update(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut PromptTemplate),
    ) -> Result<PromptTemplate, TemplateError> {
        let mut guard = self.templates.write().await;
        let template = guard
            .get_mut(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
        f(template);
        template.version += 1;
        template.updated_at = Utc::now();
        template.validate()?;
        self.persist(template).await?;
        Ok(template.clone())
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), TemplateError> {
        let mut guard = self.templates.write().await;
        if guard.remove(id).is_none() {
            return Err(TemplateError::NotFound(id.to_string()));
        }
        let path = self.path_for(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    pub async fn render(
        &self,
        id: &Uuid,
        vars: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let template = self.get(id).await?;
        Ok(template.render(vars)?)
    }

    /// Update usage statistics after a rendered template has been executed
    /// by a processor.
    pub async fn log_execution(
        &self,
        id: &Uuid,
        quality_score: Option<f64>,
        success: bool,
    ) -> Result<(), TemplateError> {
        self.update(id, |t| t.record_usage(quality_score, success))
            .await?;
        Ok(())
    }

    pub async fn export(&self, ids: Option<&[Uuid]>) -> ExportPayload {
        let guard = self.templates.read().await;
        let templates = match ids {
            Some(ids) => ids.iter().filter_map(|id| guard.get(id).cloned()).collect(),
            None => guard.values().cloned().collect(),
        };
        ExportPayload {
            export_version: "1.0".to_string(),
            export_timestamp: Utc::now(),
            templates,
        }
    }

    pub async fn import(
        &self,
        payload: ExportPayload,
        overwrite: bool,
    ) -> Result<usize, TemplateError> {
        let mut imported = 0;
        for template in payload.templates {
            template.validate()?;
            let mut guard = self.templates.write().await;
            let exists = guard.contains_key(&template.id);
            if exists && !overwrite {
                continue;
            }
            self.persist(&template).await?;
            guard.insert(template.id, template);
            imported += 1;
        }
        Ok(imported)
    }

    pub async fn stats(&self) -> TemplateRegistryStats {
        let guard = self.templates.read().await;
        TemplateRegistryStats {
            total_templates: guard.len(),
            total_usage: guard.values().map(|t| t.usage_count).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateRegistryStats {
    pub total_templates: usize,
    pub total_usage: u64,
}
