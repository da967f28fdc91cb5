use std::{collections::HashMap, sync::Arc, time::Duration};

use export::{render_workbook, AdminCredentials, ExportError, ExportedWorkbook, ResponseTable};
use shared::{
    domain::{Question, SessionId},
    error::{ApiError, ErrorCode},
    protocol::{AnswerSheet, QuestionView, ResponseTableView, SessionView, SubmitResponse},
};
use storage::Storage;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};
use wizard::{Refusal, SubmitError, Wizard};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub admin: AdminCredentials,
    pub sessions: SessionRegistry,
}

struct SessionEntry {
    wizard: Wizard,
    last_seen: Instant,
}

type SharedEntry = Arc<Mutex<SessionEntry>>;

/// In-memory wizard sessions. Each session has its own lock so actions on one
/// session are applied one at a time without blocking other sessions.
///
/// A session idle for longer than the TTL is treated as gone on lookup. All
/// idle sessions are dropped whenever a new one starts and on every tick of
/// [`SessionRegistry::spawn_sweeper`].
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SharedEntry>>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn create(&self) -> (SessionId, SharedEntry) {
        let pruned = self.prune_idle().await;
        if pruned > 0 {
            debug!(pruned, "dropped idle survey sessions");
        }

        let session_id = SessionId::new();
        let entry = Arc::new(Mutex::new(SessionEntry {
            wizard: Wizard::new(),
            last_seen: Instant::now(),
        }));
        self.sessions
            .write()
            .await
            .insert(session_id, Arc::clone(&entry));
        (session_id, entry)
    }

    async fn get(&self, session_id: SessionId) -> Result<SharedEntry, ApiError> {
        let entry = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(ApiError::session_not_found)?;
        if self.is_idle(&entry, Instant::now()) {
            self.sessions.write().await.remove(&session_id);
            debug!(%session_id, "survey session expired");
            return Err(ApiError::session_not_found());
        }
        Ok(entry)
    }

    async fn remove(&self, session_id: SessionId) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }

    /// Sessions that are mid-action are considered active and kept.
    fn is_idle(&self, entry: &SharedEntry, now: Instant) -> bool {
        match entry.try_lock() {
            Ok(entry) => now.saturating_duration_since(entry.last_seen) >= self.idle_ttl,
            Err(_) => false,
        }
    }

    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_idle(entry, now));
        before - sessions.len()
    }

    /// Prunes idle sessions every `period` until the runtime shuts down.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pruned = registry.prune_idle().await;
                if pruned > 0 {
                    debug!(pruned, "swept idle survey sessions");
                }
            }
        })
    }
}

pub fn list_questions() -> Vec<QuestionView> {
    Question::ALL.into_iter().map(QuestionView::from).collect()
}

pub async fn create_session(ctx: &ApiContext) -> SessionView {
    let (session_id, entry) = ctx.sessions.create().await;
    let entry = entry.lock().await;
    info!(%session_id, "survey session started");
    view_of(session_id, &entry.wizard)
}

pub async fn session_view(ctx: &ApiContext, session_id: SessionId) -> Result<SessionView, ApiError> {
    apply(ctx, session_id, "view", |_| Ok(())).await
}

pub async fn discard_session(ctx: &ApiContext, session_id: SessionId) -> Result<(), ApiError> {
    if ctx.sessions.remove(session_id).await {
        info!(%session_id, "survey session discarded");
        Ok(())
    } else {
        Err(ApiError::session_not_found())
    }
}

pub async fn select_answer(
    ctx: &ApiContext,
    session_id: SessionId,
    answer: Option<&str>,
) -> Result<SessionView, ApiError> {
    apply(ctx, session_id, "select", |wizard| {
        wizard.select(answer).map(|_| ())
    })
    .await
}

pub async fn advance(ctx: &ApiContext, session_id: SessionId) -> Result<SessionView, ApiError> {
    apply(ctx, session_id, "advance", |wizard| {
        wizard.advance().map(|_| ())
    })
    .await
}

pub async fn retreat(ctx: &ApiContext, session_id: SessionId) -> Result<SessionView, ApiError> {
    apply(ctx, session_id, "retreat", |wizard| {
        wizard.retreat().map(|_| ())
    })
    .await
}

pub async fn restart(ctx: &ApiContext, session_id: SessionId) -> Result<SessionView, ApiError> {
    apply(ctx, session_id, "restart", |wizard| {
        wizard.restart().map(|_| ())
    })
    .await
}

pub async fn submit(ctx: &ApiContext, session_id: SessionId) -> Result<SubmitResponse, ApiError> {
    let entry = ctx.sessions.get(session_id).await?;
    let mut entry = entry.lock().await;
    entry.last_seen = Instant::now();

    match entry.wizard.submit(&ctx.storage).await {
        Ok(response_id) => {
            info!(%session_id, response_id = response_id.0, "survey submitted");
            Ok(SubmitResponse {
                response_id,
                session: view_of(session_id, &entry.wizard),
            })
        }
        Err(SubmitError::Refused(refusal)) => Err(refused(session_id, "submit", refusal)),
        Err(SubmitError::Persist(err)) => {
            error!(%session_id, error = %format!("{err:#}"), "survey submission could not be stored");
            Err(internal(err))
        }
    }
}

pub async fn response_table(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<ResponseTableView, ApiError> {
    Ok(load_table(ctx, username, password).await?.into())
}

pub async fn export_responses(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<ExportedWorkbook, ApiError> {
    let table = load_table(ctx, username, password).await?;
    let workbook = render_workbook(&table).map_err(export_failure)?;
    info!(rows = workbook.row_count, "survey responses exported");
    Ok(workbook)
}

async fn load_table(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<ResponseTable, ApiError> {
    ctx.admin
        .verify(username, password)
        .map_err(export_failure)?;
    let responses = ctx.storage.list_responses().await.map_err(internal)?;
    Ok(ResponseTable::from_responses(&responses))
}

async fn apply<F>(
    ctx: &ApiContext,
    session_id: SessionId,
    action: &'static str,
    f: F,
) -> Result<SessionView, ApiError>
where
    F: FnOnce(&mut Wizard) -> Result<(), Refusal>,
{
    let entry = ctx.sessions.get(session_id).await?;
    let mut entry = entry.lock().await;
    entry.last_seen = Instant::now();
    f(&mut entry.wizard).map_err(|refusal| refused(session_id, action, refusal))?;
    Ok(view_of(session_id, &entry.wizard))
}

fn view_of(session_id: SessionId, wizard: &Wizard) -> SessionView {
    let mut answers = AnswerSheet::default();
    for (question, answer) in wizard.answers() {
        answers.set(question, answer.map(str::to_string));
    }
    SessionView {
        session_id,
        current_step: wizard.current_step(),
        finished: wizard.is_done(),
        question: wizard.current_question().map(QuestionView::from),
        answers,
        percent_complete: wizard.percent_complete(),
        can_advance: wizard.can_advance(),
        can_retreat: wizard.can_retreat(),
        can_submit: wizard.can_submit(),
    }
}

fn refused(session_id: SessionId, action: &str, refusal: Refusal) -> ApiError {
    debug!(%session_id, action, %refusal, "survey action refused");
    ApiError::new(ErrorCode::Conflict, refusal.to_string())
}

fn export_failure(err: ExportError) -> ApiError {
    match err {
        ExportError::Unauthorized => ApiError::new(ErrorCode::Unauthorized, err.to_string()),
        other => ApiError::new(ErrorCode::Internal, other.to_string()),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
