//! SQLite-backed store.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{NudgeError, NudgeResult};
use crate::store::ProactiveStore;
use crate::types::{
    BehaviorKey, Category, DeferredInsight, DeferredSend, DeferredStatus, DeliveryStatus,
    FeedbackRecord, MessageFormat, MessageRole, Outcome, Sentiment, SignalState, StoredMessage,
    UserBehavior, UserFact, UserProfile,
};

/// SQLite store. A single connection behind a mutex is enough for the
/// point-read/point-write access pattern.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> NudgeResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> NudgeResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                timezone TEXT,
                wake_hour INTEGER NOT NULL DEFAULT 7,
                sleep_hour INTEGER NOT NULL DEFAULT 23,
                message_count INTEGER NOT NULL DEFAULT 0,
                last_active_at TEXT,
                onboarded INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS signal_state (
                user_id TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                times_seen INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, dedup_key)
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                trigger_signals TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                delivery_status TEXT NOT NULL,
                format TEXT NOT NULL,
                explored INTEGER NOT NULL DEFAULT 0,
                reply_sentiment TEXT,
                feedback_score REAL,
                response_latency_seconds INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_user ON feedback(user_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_outcome ON feedback(outcome);
            CREATE INDEX IF NOT EXISTS idx_feedback_sent ON feedback(sent_at);

            CREATE TABLE IF NOT EXISTS behaviors (
                user_id TEXT NOT NULL,
                behavior_key TEXT NOT NULL,
                value TEXT NOT NULL,
                confidence REAL NOT NULL,
                sample_size INTEGER NOT NULL,
                last_computed TEXT NOT NULL,
                PRIMARY KEY (user_id, behavior_key)
            );

            CREATE TABLE IF NOT EXISTS deferred_sends (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                category TEXT NOT NULL,
                action_type TEXT NOT NULL,
                score REAL NOT NULL,
                link TEXT,
                created_at TEXT NOT NULL,
                deliver_after TEXT NOT NULL,
                deadline TEXT,
                status TEXT NOT NULL DEFAULT 'queued'
            );

            CREATE INDEX IF NOT EXISTS idx_deferred_status ON deferred_sends(status);

            CREATE TABLE IF NOT EXISTS deferred_insights (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                candidate TEXT NOT NULL,
                created_at TEXT NOT NULL,
                consumed INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_insights_user ON deferred_insights(user_id, consumed);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                proactive INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, created_at);

            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                entity TEXT,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                last_referenced TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_facts_user ON facts(user_id);
        "#,
        )?;
        Ok(())
    }
}

fn parse_dt(s: &str) -> NudgeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NudgeError::parse(e.to_string()))
}

fn parse_opt_dt(s: Option<String>) -> NudgeResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_dt(&s)).transpose()
}

fn parse_uuid(s: &str) -> NudgeResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| NudgeError::parse(e.to_string()))
}

fn parse_enum<T: FromStr>(s: &str, what: &str) -> NudgeResult<T> {
    T::from_str(s).map_err(|_| NudgeError::parse(format!("unknown {}: {}", what, s)))
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> NudgeResult<UserProfile> {
    let created_at: String = row.get(1)?;
    let last_active_at: Option<String> = row.get(6)?;
    let onboarded: i32 = row.get(7)?;
    Ok(UserProfile {
        user_id: row.get(0)?,
        created_at: parse_dt(&created_at)?,
        timezone: row.get(2)?,
        wake_hour: row.get::<_, u32>(3)? as u8,
        sleep_hour: row.get::<_, u32>(4)? as u8,
        message_count: row.get::<_, i64>(5)? as u64,
        last_active_at: parse_opt_dt(last_active_at)?,
        onboarded: onboarded != 0,
    })
}

fn row_to_feedback(row: &rusqlite::Row<'_>) -> NudgeResult<FeedbackRecord> {
    let id: String = row.get(0)?;
    let category: String = row.get(2)?;
    let trigger_signals: String = row.get(3)?;
    let sent_at: String = row.get(4)?;
    let outcome: String = row.get(5)?;
    let delivery_status: String = row.get(6)?;
    let format: String = row.get(7)?;
    let explored: i32 = row.get(8)?;
    let reply_sentiment: Option<String> = row.get(9)?;

    Ok(FeedbackRecord {
        id: parse_uuid(&id)?,
        user_id: row.get(1)?,
        category: parse_enum::<Category>(&category, "category")?,
        trigger_signals: serde_json::from_str(&trigger_signals)?,
        sent_at: parse_dt(&sent_at)?,
        outcome: parse_enum::<Outcome>(&outcome, "outcome")?,
        delivery_status: parse_enum::<DeliveryStatus>(&delivery_status, "delivery status")?,
        format: parse_enum::<MessageFormat>(&format, "format")?,
        explored: explored != 0,
        reply_sentiment: reply_sentiment
            .map(|s| parse_enum::<Sentiment>(&s, "sentiment"))
            .transpose()?,
        feedback_score: row.get(10)?,
        response_latency_seconds: row.get(11)?,
    })
}

fn row_to_deferred_send(row: &rusqlite::Row<'_>) -> NudgeResult<DeferredSend> {
    let id: String = row.get(0)?;
    let category: String = row.get(3)?;
    let action_type: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let deliver_after: String = row.get(8)?;
    let deadline: Option<String> = row.get(9)?;
    let status: String = row.get(10)?;

    Ok(DeferredSend {
        id: parse_uuid(&id)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        category: parse_enum::<Category>(&category, "category")?,
        action_type: parse_enum(&action_type, "action type")?,
        score: row.get(5)?,
        link: row.get(6)?,
        created_at: parse_dt(&created_at)?,
        deliver_after: parse_dt(&deliver_after)?,
        deadline: parse_opt_dt(deadline)?,
        status: parse_enum::<DeferredStatus>(&status, "deferred status")?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> NudgeResult<StoredMessage> {
    let id: String = row.get(0)?;
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    let proactive: i32 = row.get(5)?;
    Ok(StoredMessage {
        id: parse_uuid(&id)?,
        user_id: row.get(1)?,
        role: parse_enum::<MessageRole>(&role, "role")?,
        content: row.get(3)?,
        created_at: parse_dt(&created_at)?,
        proactive: proactive != 0,
    })
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> NudgeResult<UserFact> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(5)?;
    let last_referenced: String = row.get(6)?;
    Ok(UserFact {
        id: parse_uuid(&id)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        entity: row.get(3)?,
        confidence: row.get(4)?,
        created_at: parse_dt(&created_at)?,
        last_referenced: parse_dt(&last_referenced)?,
    })
}

impl ProactiveStore for SqliteStore {
    fn upsert_profile(&self, profile: &UserProfile) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO users
               (user_id, created_at, timezone, wake_hour, sleep_hour, message_count, last_active_at, onboarded)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                profile.user_id,
                profile.created_at.to_rfc3339(),
                profile.timezone,
                profile.wake_hour as u32,
                profile.sleep_hour as u32,
                profile.message_count as i64,
                profile.last_active_at.map(|dt| dt.to_rfc3339()),
                profile.onboarded as i32,
            ],
        )?;
        Ok(())
    }

    fn get_profile(&self, user_id: &str) -> NudgeResult<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT user_id, created_at, timezone, wake_hour, sleep_hour, message_count, last_active_at, onboarded
               FROM users WHERE user_id = ?1"#,
        )?;
        stmt.query_row(params![user_id], |row| Ok(row_to_profile(row)))
            .optional()?
            .transpose()
    }

    fn onboarded_users(&self) -> NudgeResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT user_id FROM users WHERE onboarded = 1 ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    fn get_signal_states(&self, user_id: &str, keys: &[String]) -> NudgeResult<Vec<SignalState>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT user_id, dedup_key, first_seen, last_seen, times_seen
               FROM signal_state WHERE user_id = ?1 AND dedup_key = ?2"#,
        )?;
        let mut states = Vec::new();
        for key in keys {
            let state = stmt
                .query_row(params![user_id, key], |row| {
                    let first_seen: String = row.get(2)?;
                    let last_seen: String = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        first_seen,
                        last_seen,
                        row.get::<_, u32>(4)?,
                    ))
                })
                .optional()?;
            if let Some((user_id, dedup_key, first_seen, last_seen, times_seen)) = state {
                states.push(SignalState {
                    user_id,
                    dedup_key,
                    first_seen: parse_dt(&first_seen)?,
                    last_seen: parse_dt(&last_seen)?,
                    times_seen,
                });
            }
        }
        Ok(states)
    }

    fn upsert_signal_state(&self, state: &SignalState) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO signal_state
               (user_id, dedup_key, first_seen, last_seen, times_seen)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                state.user_id,
                state.dedup_key,
                state.first_seen.to_rfc3339(),
                state.last_seen.to_rfc3339(),
                state.times_seen,
            ],
        )?;
        Ok(())
    }

    fn insert_feedback(&self, record: &FeedbackRecord) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO feedback
               (id, user_id, category, trigger_signals, sent_at, outcome, delivery_status,
                format, explored, reply_sentiment, feedback_score, response_latency_seconds)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            params![
                record.id.to_string(),
                record.user_id,
                record.category.to_string(),
                serde_json::to_string(&record.trigger_signals)?,
                record.sent_at.to_rfc3339(),
                record.outcome.to_string(),
                record.delivery_status.to_string(),
                record.format.to_string(),
                record.explored as i32,
                record.reply_sentiment.map(|s| s.to_string()),
                record.feedback_score,
                record.response_latency_seconds,
            ],
        )?;
        Ok(())
    }

    fn update_feedback(&self, record: &FeedbackRecord) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE feedback SET outcome = ?2, delivery_status = ?3, reply_sentiment = ?4,
                                   feedback_score = ?5, response_latency_seconds = ?6
               WHERE id = ?1"#,
            params![
                record.id.to_string(),
                record.outcome.to_string(),
                record.delivery_status.to_string(),
                record.reply_sentiment.map(|s| s.to_string()),
                record.feedback_score,
                record.response_latency_seconds,
            ],
        )?;
        Ok(())
    }

    fn pending_feedback(&self, user_id: &str) -> NudgeResult<Vec<FeedbackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, category, trigger_signals, sent_at, outcome, delivery_status,
                      format, explored, reply_sentiment, feedback_score, response_latency_seconds
               FROM feedback WHERE user_id = ?1 AND outcome = 'pending' ORDER BY sent_at"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| Ok(row_to_feedback(row)))?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn all_pending_feedback(&self) -> NudgeResult<Vec<FeedbackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, category, trigger_signals, sent_at, outcome, delivery_status,
                      format, explored, reply_sentiment, feedback_score, response_latency_seconds
               FROM feedback WHERE outcome = 'pending' ORDER BY sent_at"#,
        )?;
        let rows = stmt.query_map([], |row| Ok(row_to_feedback(row)))?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn feedback_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> NudgeResult<Vec<FeedbackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, category, trigger_signals, sent_at, outcome, delivery_status,
                      format, explored, reply_sentiment, feedback_score, response_latency_seconds
               FROM feedback WHERE user_id = ?1 AND sent_at >= ?2 ORDER BY sent_at"#,
        )?;
        let rows = stmt.query_map(params![user_id, since.to_rfc3339()], |row| {
            Ok(row_to_feedback(row))
        })?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn sends_since(&self, user_id: &str, since: DateTime<Utc>) -> NudgeResult<u32> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM feedback WHERE user_id = ?1 AND sent_at >= ?2",
            params![user_id, since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn last_sent_at(&self, user_id: &str) -> NudgeResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let sent_at: Option<String> = conn
            .query_row(
                "SELECT MAX(sent_at) FROM feedback WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        parse_opt_dt(sent_at)
    }

    fn put_behavior(&self, behavior: &UserBehavior) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO behaviors
               (user_id, behavior_key, value, confidence, sample_size, last_computed)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                behavior.user_id,
                behavior.key.to_string(),
                serde_json::to_string(&behavior.value)?,
                behavior.confidence,
                behavior.sample_size as i64,
                behavior.last_computed.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_behavior(&self, user_id: &str, key: BehaviorKey) -> NudgeResult<Option<UserBehavior>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT user_id, behavior_key, value, confidence, sample_size, last_computed
               FROM behaviors WHERE user_id = ?1 AND behavior_key = ?2"#,
        )?;
        stmt.query_row(params![user_id, key.to_string()], |row| {
            let value: String = row.get(2)?;
            let last_computed: String = row.get(5)?;
            Ok((
                row.get::<_, String>(0)?,
                value,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                last_computed,
            ))
        })
        .optional()?
        .map(|(user_id, value, confidence, sample_size, last_computed)| {
            Ok(UserBehavior {
                user_id,
                key,
                value: serde_json::from_str(&value)?,
                confidence,
                sample_size: sample_size as usize,
                last_computed: parse_dt(&last_computed)?,
            })
        })
        .transpose()
    }

    fn queue_deferred_send(&self, send: &DeferredSend) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO deferred_sends
               (id, user_id, message, category, action_type, score, link, created_at,
                deliver_after, deadline, status)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                send.id.to_string(),
                send.user_id,
                send.message,
                send.category.to_string(),
                send.action_type.to_string(),
                send.score,
                send.link,
                send.created_at.to_rfc3339(),
                send.deliver_after.to_rfc3339(),
                send.deadline.map(|dt| dt.to_rfc3339()),
                send.status.to_string(),
            ],
        )?;
        Ok(())
    }

    fn queued_deferred_sends(&self) -> NudgeResult<Vec<DeferredSend>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, message, category, action_type, score, link, created_at,
                      deliver_after, deadline, status
               FROM deferred_sends WHERE status = 'queued' ORDER BY deliver_after"#,
        )?;
        let rows = stmt.query_map([], |row| Ok(row_to_deferred_send(row)))?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn mark_deferred_send(&self, id: Uuid, status: DeferredStatus) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE deferred_sends SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.to_string()],
        )?;
        Ok(())
    }

    fn insert_insight(&self, insight: &DeferredInsight) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO deferred_insights (id, user_id, candidate, created_at, consumed)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                insight.id.to_string(),
                insight.user_id,
                serde_json::to_string(&insight.candidate)?,
                insight.created_at.to_rfc3339(),
                insight.consumed as i32,
            ],
        )?;
        Ok(())
    }

    fn take_insights(&self, user_id: &str) -> NudgeResult<Vec<DeferredInsight>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, candidate, created_at
               FROM deferred_insights WHERE user_id = ?1 AND consumed = 0 ORDER BY created_at"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let id: String = row.get(0)?;
            let candidate: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok((id, row.get::<_, String>(1)?, candidate, created_at))
        })?;

        let mut insights = Vec::new();
        for row in rows {
            let (id, user_id, candidate, created_at) = row?;
            insights.push(DeferredInsight {
                id: parse_uuid(&id)?,
                user_id,
                candidate: serde_json::from_str(&candidate)?,
                created_at: parse_dt(&created_at)?,
                consumed: true,
            });
        }
        drop(stmt);

        conn.execute(
            "UPDATE deferred_insights SET consumed = 1 WHERE user_id = ?1 AND consumed = 0",
            params![user_id],
        )?;
        Ok(insights)
    }

    fn log_message(&self, message: &StoredMessage) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO messages (id, user_id, role, content, created_at, proactive)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                message.id.to_string(),
                message.user_id,
                message.role.to_string(),
                message.content,
                message.created_at.to_rfc3339(),
                message.proactive as i32,
            ],
        )?;
        Ok(())
    }

    fn recent_messages(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> NudgeResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, role, content, created_at, proactive
               FROM messages WHERE user_id = ?1 AND created_at >= ?2 ORDER BY created_at"#,
        )?;
        let rows = stmt.query_map(params![user_id, since.to_rfc3339()], |row| {
            Ok(row_to_message(row))
        })?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn insert_fact(&self, fact: &UserFact) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO facts (id, user_id, content, entity, confidence, created_at, last_referenced)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                fact.id.to_string(),
                fact.user_id,
                fact.content,
                fact.entity,
                fact.confidence,
                fact.created_at.to_rfc3339(),
                fact.last_referenced.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn facts_for(&self, user_id: &str) -> NudgeResult<Vec<UserFact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, user_id, content, entity, confidence, created_at, last_referenced
               FROM facts WHERE user_id = ?1 ORDER BY created_at"#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| Ok(row_to_fact(row)))?;
        rows.map(|r| r.map_err(NudgeError::from).and_then(|x| x))
            .collect()
    }

    fn update_fact(&self, fact: &UserFact) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE facts SET content = ?2, entity = ?3, confidence = ?4, last_referenced = ?5
               WHERE id = ?1"#,
            params![
                fact.id.to_string(),
                fact.content,
                fact.entity,
                fact.confidence,
                fact.last_referenced.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_fact(&self, id: Uuid) -> NudgeResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM facts WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }
}
