pub mod schema;

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::core::DetectionRule;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[cfg(test)]
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the current set of detection rules.
///
/// Every call returns a fresh snapshot; callers must not cache it.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn fetch_all_rules(&self) -> Result<Vec<DetectionRule>, StoreError>;

    /// Cheap connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A rule to insert; the id is assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub condition: String,
    pub weight: f64,
}

/// The stock rule set installed into an empty database.
pub fn default_rules() -> Vec<NewRule> {
    vec![
        NewRule {
            name: "Large amount".into(),
            description: "Transaction amount above 10,000".into(),
            priority: 1,
            condition: "large_amount".into(),
            weight: 0.5,
        },
        NewRule {
            name: "Blacklisted account".into(),
            description: "Account is on the internal blacklist".into(),
            priority: 2,
            condition: "blacklisted_account".into(),
            weight: 0.9,
        },
    ]
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    /// Run `f` against the database on the blocking thread pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let db = inner.lock().map_err(|_| StoreError::Poisoned)?;
            f(&db)
        })
        .await?
    }

    /// Insert a rule. Returns the new rule id.
    #[cfg(test)]
    pub fn insert_rule(&self, rule: &NewRule) -> Result<i64, StoreError> {
        let db = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.insert_rule(rule)?)
    }

    /// Install the stock rules when the table is empty. Returns how many
    /// rules were inserted.
    pub fn seed_default_rules(&self) -> Result<usize, StoreError> {
        let db = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        if db.rule_count()? > 0 {
            return Ok(0);
        }
        let rules = default_rules();
        for rule in &rules {
            db.insert_rule(rule)?;
        }
        Ok(rules.len())
    }

    pub fn rule_count(&self) -> Result<usize, StoreError> {
        let db = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.rule_count()?)
    }
}

#[async_trait]
impl RuleStore for SharedDatabase {
    async fn fetch_all_rules(&self) -> Result<Vec<DetectionRule>, StoreError> {
        self.with_db(|db| Ok(db.all_rules()?)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.ping()?)).await
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn insert_rule(&self, rule: &NewRule) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO detection_rules (name, description, priority, condition, weight)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![rule.name, rule.description, rule.priority, rule.condition, rule.weight],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Load the full rule set.
    pub fn all_rules(&self) -> Result<Vec<DetectionRule>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, priority, condition, weight FROM detection_rules ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DetectionRule {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                priority: row.get(3)?,
                condition: row.get(4)?,
                weight: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    pub fn rule_count(&self) -> Result<usize, rusqlite::Error> {
        self.conn.query_row("SELECT COUNT(*) FROM detection_rules", [], |row| {
            row.get::<_, i64>(0).map(|c| c as usize)
        })
    }

    pub fn ping(&self) -> Result<(), rusqlite::Error> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))
    }
}
