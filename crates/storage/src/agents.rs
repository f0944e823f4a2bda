use serde_json::Value;
use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::Agent;
use crate::{StorageError, StorageGateway};

pub struct NewAgent {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub model_name: String,
    pub memory_table: String,
    pub enabled_tools: Vec<String>,
    pub config: JsonMap,
}

impl StorageGateway {
    pub async fn create_agent(&self, new: NewAgent) -> Result<Agent, StorageError> {
        let enabled_tools = Value::from(new.enabled_tools);
        let row = sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (name, description, system_prompt, model_name, memory_table, enabled_tools, config)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, description, system_prompt, model_name, memory_table, enabled_tools, config, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.system_prompt)
        .bind(&new.model_name)
        .bind(&new.memory_table)
        .bind(&enabled_tools)
        .bind(new.config)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict {
                entity: "agent",
                detail: format!("name '{}' already exists", new.name),
            },
            _ => StorageError::Database(e),
        })?;
        Ok(row)
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Agent, StorageError> {
        sqlx::query_as::<_, Agent>(
            "SELECT id, name, description, system_prompt, model_name, memory_table, enabled_tools, config, created_at, updated_at FROM agents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("agent", id))
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, StorageError> {
        let rows = sqlx::query_as::<_, Agent>(
            "SELECT id, name, description, system_prompt, model_name, memory_table, enabled_tools, config, created_at, updated_at FROM agents ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Full-record replacement, per the storage gateway's `Update` contract.
    pub async fn update_agent(&self, id: Uuid, new: NewAgent) -> Result<Agent, StorageError> {
        let enabled_tools = Value::from(new.enabled_tools);
        let row = sqlx::query_as::<_, Agent>(
            r#"
            UPDATE agents
            SET name = $2, description = $3, system_prompt = $4, model_name = $5,
                memory_table = $6, enabled_tools = $7, config = $8, updated_at = now()
            WHERE id = $1
            RETURNING id, name, description, system_prompt, model_name, memory_table, enabled_tools, config, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.system_prompt)
        .bind(&new.model_name)
        .bind(&new.memory_table)
        .bind(&enabled_tools)
        .bind(new.config)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict {
                entity: "agent",
                detail: format!("name '{}' already exists", new.name),
            },
            _ => StorageError::Database(e),
        })?
        .ok_or_else(|| StorageError::not_found("agent", id))?;
        Ok(row)
    }

    /// Cascades to sessions (and transitively messages/memory chunks) via
    /// the schema's `ON DELETE CASCADE`.
    pub async fn delete_agent(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("agent", id));
        }
        Ok(())
    }
}
