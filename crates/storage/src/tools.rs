use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::{HandlerType, Tool};
use crate::{StorageError, StorageGateway};

pub struct NewTool {
    pub name: String,
    pub description: String,
    pub arg_schema: JsonMap,
    pub handler_type: HandlerType,
    pub handler_config: JsonMap,
    pub enabled: bool,
}

const SELECT_TOOL: &str =
    "SELECT id, name, description, arg_schema, handler_type, handler_config, enabled, created_at FROM tools";

impl StorageGateway {
    pub async fn create_tool(&self, new: NewTool) -> Result<Tool, StorageError> {
        sqlx::query_as::<_, Tool>(
            r#"
            INSERT INTO tools (name, description, arg_schema, handler_type, handler_config, enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, arg_schema, handler_type, handler_config, enabled, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.arg_schema)
        .bind(new.handler_type)
        .bind(new.handler_config)
        .bind(new.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict {
                entity: "tool",
                detail: format!("name '{}' already exists", new.name),
            },
            _ => StorageError::Database(e),
        })
    }

    pub async fn get_tool_by_name(&self, name: &str) -> Result<Tool, StorageError> {
        sqlx::query_as::<_, Tool>(&format!("{SELECT_TOOL} WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound { entity: "tool", id: name.to_string() })
    }

    pub async fn list_enabled_tools(&self) -> Result<Vec<Tool>, StorageError> {
        let rows = sqlx::query_as::<_, Tool>(&format!("{SELECT_TOOL} WHERE enabled = true ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn delete_tool(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM tools WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("tool", id));
        }
        Ok(())
    }
}
