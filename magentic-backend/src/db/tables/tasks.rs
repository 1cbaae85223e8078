//! Task queue database operations
//!
//! Status changes are guarded in SQL so that only the legal transitions
//! `pending -> running -> completed | failed` can ever apply. Each update
//! returns whether a row actually changed.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Result as SqliteResult, Row};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Task, TaskStatus};
use super::super::Database;

const TASK_COLUMNS: &str = "id, status, prompt, result, created_at, updated_at, model_name, \
                            use_alternate_provider, prompt_tokens, completion_tokens";

fn parse_timestamp(idx: usize, value: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_task(row: &Row) -> SqliteResult<Task> {
    let status_str: String = row.get(1)?;
    let result_str: Option<String> = row.get(3)?;
    let created_at_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;

    let status = TaskStatus::from_str(&status_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let result = result_str
        .map(|s| serde_json::from_str::<Value>(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Task {
        id: row.get(0)?,
        status,
        prompt: row.get(2)?,
        result,
        created_at: parse_timestamp(4, &created_at_str)?,
        updated_at: parse_timestamp(5, &updated_at_str)?,
        model_name: row.get(6)?,
        use_alternate_provider: row.get(7)?,
        prompt_tokens: row.get::<_, i64>(8)?.max(0) as u64,
        completion_tokens: row.get::<_, i64>(9)?.max(0) as u64,
    })
}

impl Database {
    /// Insert a new pending task and return it
    pub fn create_task(&self, prompt: &str, model_name: &str, use_alternate_provider: bool) -> SqliteResult<Task> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO tasks (id, status, prompt, result, created_at, updated_at, model_name, use_alternate_provider)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4, ?5, ?6)",
            params![
                id,
                TaskStatus::Pending.to_string(),
                prompt,
                now.to_rfc3339(),
                model_name,
                use_alternate_provider
            ],
        )?;

        Ok(Task {
            id,
            status: TaskStatus::Pending,
            prompt: prompt.to_string(),
            result: None,
            created_at: now,
            updated_at: now,
            model_name: model_name.to_string(),
            use_alternate_provider,
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    /// Get a task by id
    pub fn get_task(&self, id: &str) -> SqliteResult<Option<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;

        match stmt.query_row([id], row_to_task) {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// pending -> running
    pub fn mark_task_running(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'running', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    /// running -> completed, storing the structured result and token usage
    pub fn complete_task(
        &self,
        id: &str,
        result: &Value,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'completed', result = ?1, updated_at = ?2,
                              prompt_tokens = ?3, completion_tokens = ?4
             WHERE id = ?5 AND status = 'running'",
            params![
                result.to_string(),
                Utc::now().to_rfc3339(),
                prompt_tokens as i64,
                completion_tokens as i64,
                id
            ],
        )?;
        Ok(rows > 0)
    }

    /// pending | running -> failed, storing `{"error": ...}`
    pub fn fail_task(&self, id: &str, error: &str) -> SqliteResult<bool> {
        let result = serde_json::json!({ "error": error });
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE tasks SET status = 'failed', result = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'running')",
            params![result.to_string(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_get() {
        let db = Database::in_memory().unwrap();
        let task = db.create_task("hello", "gpt-4o", true).unwrap();

        let loaded = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.prompt, "hello");
        assert_eq!(loaded.model_name, "gpt-4o");
        assert!(loaded.use_alternate_provider);
        assert!(loaded.result.is_none());
        assert_eq!(loaded.created_at, task.created_at);

        assert!(db.get_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_transitions_are_guarded() {
        let db = Database::in_memory().unwrap();
        let task = db.create_task("hello", "gpt-4o", false).unwrap();

        // Cannot complete before running
        assert!(!db.complete_task(&task.id, &json!({}), 1, 1).unwrap());

        assert!(db.mark_task_running(&task.id).unwrap());
        assert!(!db.mark_task_running(&task.id).unwrap());

        let result = json!({ "messages": [], "task_result": { "status": "completed" } });
        assert!(db.complete_task(&task.id, &result, 10, 5).unwrap());

        // Terminal states are final
        assert!(!db.fail_task(&task.id, "late failure").unwrap());
        assert!(!db.mark_task_running(&task.id).unwrap());

        let done = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result, Some(result));
        assert_eq!(done.prompt_tokens, 10);
        assert_eq!(done.completion_tokens, 5);
        assert!(done.updated_at >= done.created_at);
    }

    #[test]
    fn test_fail_records_error() {
        let db = Database::in_memory().unwrap();
        let task = db.create_task("hello", "gpt-4o", true).unwrap();
        db.mark_task_running(&task.id).unwrap();

        assert!(db.fail_task(&task.id, "AZURE_OPEN_AI_KEY is not set").unwrap());
        let failed = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.result, Some(json!({ "error": "AZURE_OPEN_AI_KEY is not set" })));
        assert!(!db.complete_task(&task.id, &json!({}), 0, 0).unwrap());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.db");
        let id = {
            let db = Database::new(path.to_str().unwrap()).unwrap();
            db.create_task("persist me", "o3-mini", true).unwrap().id
        };

        let db = Database::new(path.to_str().unwrap()).unwrap();
        assert_eq!(db.get_task(&id).unwrap().unwrap().model_name, "o3-mini");
    }
}
