//! Unit of work over a single transaction
//!
//! A [`Session`] begins a transaction lazily on the first statement and keeps
//! it open until it is committed, rolled back or closed. Every repository
//! created from the session shares that transaction, so a flushed write is
//! visible to later reads through the same session but not to other
//! connections. Dropping the last handle of an uncommitted session rolls it
//! back.

use std::sync::Arc;

use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::orm::{Entity, Repository, RepositoryResult, Statement};

use super::Database;
use super::entities::{
    AIAssessment, Answer, Question, QuestionTechnology, Technology, User, UserQuestion,
};

#[derive(Default)]
struct SessionState {
    tx: Option<Transaction<'static, Sqlite>>,
    /// A write ran since the transaction began.
    dirty: bool,
}

impl SessionState {
    async fn begin(&mut self, db: &Database) -> RepositoryResult<&mut Transaction<'static, Sqlite>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                trace!("Beginning transaction");
                db.pool().begin().await?
            }
        };
        Ok(self.tx.insert(tx))
    }
}

/// Shared handle to one unit of work. Clones refer to the same transaction.
#[derive(Clone)]
pub struct Session {
    db: Database,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Whether a transaction is currently open.
    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.tx.is_some()
    }

    /// Whether the open transaction holds writes that are not committed yet.
    pub async fn has_pending_writes(&self) -> bool {
        let state = self.state.lock().await;
        state.tx.is_some() && state.dirty
    }

    // ========================================================================
    // Statement execution
    // ========================================================================

    pub async fn fetch_all(&self, statement: &Statement) -> RepositoryResult<Vec<SqliteRow>> {
        debug!(sql = %statement.sql, binds = statement.values.len(), "fetch_all");
        let mut state = self.state.lock().await;
        let tx = state.begin(&self.db).await?;
        let rows = statement.query().fetch_all(&mut **tx).await?;
        state.dirty |= statement.writes();
        Ok(rows)
    }

    pub async fn fetch_optional(&self, statement: &Statement) -> RepositoryResult<Option<SqliteRow>> {
        debug!(sql = %statement.sql, binds = statement.values.len(), "fetch_optional");
        let mut state = self.state.lock().await;
        let tx = state.begin(&self.db).await?;
        let row = statement.query().fetch_optional(&mut **tx).await?;
        state.dirty |= statement.writes();
        Ok(row)
    }

    pub async fn fetch_one(&self, statement: &Statement) -> RepositoryResult<SqliteRow> {
        debug!(sql = %statement.sql, binds = statement.values.len(), "fetch_one");
        let mut state = self.state.lock().await;
        let tx = state.begin(&self.db).await?;
        let row = statement.query().fetch_one(&mut **tx).await?;
        state.dirty |= statement.writes();
        Ok(row)
    }

    /// Run a write and return the number of affected rows.
    pub async fn execute(&self, statement: &Statement) -> RepositoryResult<u64> {
        debug!(sql = %statement.sql, binds = statement.values.len(), "execute");
        let mut state = self.state.lock().await;
        let tx = state.begin(&self.db).await?;
        let result: SqliteQueryResult = statement.query().execute(&mut **tx).await?;
        state.dirty |= statement.writes();
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Transaction control
    // ========================================================================

    /// Make everything written so far durable and end the transaction.
    pub async fn commit(&self) -> RepositoryResult<()> {
        let tx = {
            let mut state = self.state.lock().await;
            state.dirty = false;
            state.tx.take()
        };
        if let Some(tx) = tx {
            tx.commit().await?;
            debug!("Session committed");
        }
        Ok(())
    }

    /// Keep pending writes visible to this session without committing.
    ///
    /// Statements are sent to the database as soon as they run, so there is
    /// nothing to push; the transaction simply stays open.
    pub async fn flush(&self) -> RepositoryResult<()> {
        if self.in_transaction().await {
            trace!("Session flushed");
        }
        Ok(())
    }

    /// Discard everything written since the last commit.
    pub async fn rollback(&self) -> RepositoryResult<()> {
        let tx = {
            let mut state = self.state.lock().await;
            state.dirty = false;
            state.tx.take()
        };
        if let Some(tx) = tx {
            tx.rollback().await?;
            debug!("Session rolled back");
        }
        Ok(())
    }

    /// End the session. Uncommitted work is rolled back; the session can be
    /// used again and will open a new transaction.
    pub async fn close(&self) -> RepositoryResult<()> {
        self.rollback().await
    }

    // ========================================================================
    // Repositories
    // ========================================================================

    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.clone())
    }

    pub fn users(&self) -> Repository<User> {
        self.repository()
    }

    pub fn technologies(&self) -> Repository<Technology> {
        self.repository()
    }

    pub fn questions(&self) -> Repository<Question> {
        self.repository()
    }

    pub fn question_technologies(&self) -> Repository<QuestionTechnology> {
        self.repository()
    }

    pub fn user_questions(&self) -> Repository<UserQuestion> {
        self.repository()
    }

    pub fn answers(&self) -> Repository<Answer> {
        self.repository()
    }

    pub fn ai_assessments(&self) -> Repository<AIAssessment> {
        self.repository()
    }
}
