//! Checkpoint 存储
//!
//! 每个线程一行最新状态（threads 表）+ 只追加的执行历史（checkpoints 表）。
//! save 在 IMMEDIATE 事务中比较期望的 step（CAS），跨进程串行化同一线程的写入；
//! 读不加锁。SQLite 文件即为用户进程与管理员进程之间唯一的共享状态。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

use crate::workflow::{ExecutionState, NodeId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),

    #[error("thread {thread_id}: expected step {expected}, found {found}")]
    Conflict {
        thread_id: String,
        expected: u64,
        found: u64,
    },

    #[error("{0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// 执行历史中的一条记录
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub checkpoint_id: String,
    pub thread_id: String,
    pub step: u64,
    /// 产生该 checkpoint 的节点
    pub node: Option<NodeId>,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
}

/// Checkpoint 存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 线程最新状态；不存在返回 None
    async fn load(&self, thread_id: &str) -> Result<Option<ExecutionState>, StoreError>;

    /// 写入新状态；当前已存 step（不存在视为 0）必须等于 `expected_step`，否则返回 Conflict
    async fn save(&self, state: &ExecutionState, expected_step: u64) -> Result<(), StoreError>;

    /// 线程的执行历史，按 step 升序
    async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>, StoreError>;

    /// 当前挂起等待管理员的线程
    async fn pending_threads(&self) -> Result<Vec<String>, StoreError>;
}

/// SQLite checkpoint 存储
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// 打开（必要时创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        init_tables(&conn)?;

        tracing::debug!(path = %path.display(), journal_mode = %mode, "checkpoint store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("task join error: {e}")))?
    }
}

fn init_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS threads (
            thread_id TEXT PRIMARY KEY,
            step INTEGER NOT NULL,
            next_node TEXT NOT NULL,
            pending_query TEXT,
            has_pending INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS checkpoints (
            checkpoint_id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            step INTEGER NOT NULL,
            node TEXT,
            state TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (thread_id, step)
        );
        CREATE INDEX IF NOT EXISTS idx_threads_pending ON threads(has_pending);",
    )?;
    Ok(())
}

fn parse_state(raw: &str) -> Result<ExecutionState, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("failed to parse state: {e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw}: {e}")))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ExecutionState>, StoreError> {
        let tid = thread_id.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT state FROM threads WHERE thread_id = ?1",
                    params![tid],
                    |row| row.get(0),
                )
                .optional()?;
            raw.as_deref().map(parse_state).transpose()
        })
        .await
    }

    async fn save(&self, state: &ExecutionState, expected_step: u64) -> Result<(), StoreError> {
        let state = state.clone();
        let state_json = serde_json::to_string(&state)
            .map_err(|e| StoreError::Corrupt(format!("failed to serialize state: {e}")))?;

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: Option<i64> = tx
                .query_row(
                    "SELECT step FROM threads WHERE thread_id = ?1",
                    params![state.thread_id],
                    |row| row.get(0),
                )
                .optional()?;
            let found = current.unwrap_or(0) as u64;
            if found != expected_step {
                return Err(StoreError::Conflict {
                    thread_id: state.thread_id.clone(),
                    expected: expected_step,
                    found,
                });
            }

            let now = Utc::now().to_rfc3339();
            let pending = state.pending_interrupt.as_ref();
            tx.execute(
                "INSERT INTO threads (thread_id, step, next_node, pending_query, has_pending, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    step = excluded.step,
                    next_node = excluded.next_node,
                    pending_query = excluded.pending_query,
                    has_pending = excluded.has_pending,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                params![
                    state.thread_id,
                    state.step as i64,
                    state.next.as_str(),
                    pending.and_then(|p| p.query()),
                    pending.is_some() as i64,
                    state_json,
                    now,
                ],
            )?;
            tx.execute(
                "INSERT INTO checkpoints (checkpoint_id, thread_id, step, node, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    state.thread_id,
                    state.step as i64,
                    state.last_node.map(|n| n.as_str()),
                    state_json,
                    now,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>, StoreError> {
        let tid = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT checkpoint_id, thread_id, step, node, state, created_at
                 FROM checkpoints WHERE thread_id = ?1 ORDER BY step ASC",
            )?;
            let rows = stmt
                .query_map(params![tid], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(checkpoint_id, thread_id, step, node, state, created_at)| {
                    Ok(CheckpointRecord {
                        checkpoint_id,
                        thread_id,
                        step: step as u64,
                        node: node.as_deref().and_then(NodeId::parse),
                        state: parse_state(&state)?,
                        created_at: parse_time(&created_at)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn pending_threads(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT thread_id FROM threads WHERE has_pending = 1 ORDER BY updated_at ASC",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::workflow::PendingInterrupt;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteCheckpointStore {
        SqliteCheckpointStore::open(dir.path().join("cp.db"), Duration::from_secs(5)).unwrap()
    }

    fn next_state(prev: &ExecutionState, node: NodeId) -> ExecutionState {
        let mut s = prev.clone();
        s.step += 1;
        s.last_node = Some(node);
        s
    }

    #[tokio::test]
    async fn test_load_missing_thread() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(store.history("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut s0 = ExecutionState::new("t1");
        s0.push_message(Message::user("hi"));
        let s1 = next_state(&s0, NodeId::Decide);
        store.save(&s1, 0).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded, s1);
    }

    #[tokio::test]
    async fn test_stale_expected_step_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let s1 = next_state(&ExecutionState::new("t1"), NodeId::Decide);
        store.save(&s1, 0).await.unwrap();

        let err = store.save(&s1, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }));

        let s2 = next_state(&s1, NodeId::Tool);
        store.save(&s2, 1).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().unwrap().step, 2);
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_append_only() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let s1 = next_state(&ExecutionState::new("t1"), NodeId::Decide);
        let s2 = next_state(&s1, NodeId::Tool);
        let s3 = next_state(&s2, NodeId::Human);
        store.save(&s1, 0).await.unwrap();
        store.save(&s2, 1).await.unwrap();
        store.save(&s3, 2).await.unwrap();

        let history = store.history("t1").await.unwrap();
        let steps: Vec<u64> = history.iter().map(|r| r.step).collect();
        let nodes: Vec<Option<NodeId>> = history.iter().map(|r| r.node).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert_eq!(
            nodes,
            vec![Some(NodeId::Decide), Some(NodeId::Tool), Some(NodeId::Human)]
        );
    }

    #[tokio::test]
    async fn test_pending_threads_tracks_latest_state() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut s1 = next_state(&ExecutionState::new("t1"), NodeId::Human);
        s1.pending_interrupt = Some(PendingInterrupt::new(
            NodeId::Human,
            serde_json::json!({ "query": "q" }),
        ));
        store.save(&s1, 0).await.unwrap();
        store
            .save(&next_state(&ExecutionState::new("t2"), NodeId::Decide), 0)
            .await
            .unwrap();
        assert_eq!(store.pending_threads().await.unwrap(), vec!["t1".to_string()]);

        let mut s2 = next_state(&s1, NodeId::Human);
        s2.pending_interrupt = None;
        store.save(&s2, 1).await.unwrap();
        assert!(store.pending_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_handle_sees_writes() {
        let dir = TempDir::new().unwrap();
        let a = open(&dir);
        let b = open(&dir);

        let s1 = next_state(&ExecutionState::new("t1"), NodeId::Decide);
        a.save(&s1, 0).await.unwrap();
        assert_eq!(b.load("t1").await.unwrap().unwrap().step, 1);
        assert!(matches!(
            b.save(&s1, 0).await,
            Err(StoreError::Conflict { .. })
        ));
    }
}
