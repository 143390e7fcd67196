//! Process-wide cache of built entity models

use crate::config::ModelConfig;
use crate::conventions::model::{EntityModel, ModelBuilder};
use crate::core::entity::Entity;
use crate::core::error::{GatewayError, Result};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builds each entity's model at most once and hands out shared references.
///
/// Lookups take the read lock; a miss builds the model and inserts it under
/// the write lock only if no other caller got there first, so every caller
/// observes the same `Arc`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    builder: ModelBuilder,
    models: RwLock<HashMap<TypeId, Arc<EntityModel>>>,
}

impl ModelRegistry {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            builder: ModelBuilder::new(config),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn model_for<T: Entity>(&self) -> Result<Arc<EntityModel>> {
        let type_id = TypeId::of::<T>();
        {
            let models = self
                .models
                .read()
                .map_err(|e| GatewayError::backend(format!("Failed to acquire read lock: {}", e)))?;
            if let Some(model) = models.get(&type_id) {
                return Ok(Arc::clone(model));
            }
        }

        let built = Arc::new(self.builder.build::<T>()?);

        let mut models = self
            .models
            .write()
            .map_err(|e| GatewayError::backend(format!("Failed to acquire write lock: {}", e)))?;
        Ok(Arc::clone(models.entry(type_id).or_insert(built)))
    }

    pub fn len(&self) -> usize {
        self.models.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
