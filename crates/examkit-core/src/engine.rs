//! Session engine.
//!
//! Hosts one [`Session`] per exam attempt inside a single cooperative task.
//! Student commands, clock ticks, the assessment fetch and the submission
//! verdict all arrive as events on that task, so they are applied to the
//! state machine strictly one at a time. The host UI talks to the task through
//! a [`SessionHandle`] and observes it through a `watch` channel of
//! [`SessionSnapshot`]s.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{IntervalClock, DEFAULT_TICK_INTERVAL};
use crate::coordinator::{Accepted, RetryPolicy, SubmissionCoordinator};
use crate::error::{AnswerError, EngineError, GatewayError, SubmitError};
use crate::model::{AnswerValue, Assessment};
use crate::session::{FailureReason, Session, SessionSnapshot, SessionState};
use crate::traits::{ClockSource, ExamGateway, Submission};

/// Configuration for the session engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Retry and timeout settings for submissions.
    pub retry: RetryPolicy,
    /// Nominal countdown tick interval.
    pub tick_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Starts timed sessions against an Exam Gateway.
pub struct ExamEngine {
    gateway: Arc<dyn ExamGateway>,
    config: EngineConfig,
}

impl ExamEngine {
    pub fn new(gateway: Arc<dyn ExamGateway>, config: EngineConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new attempt at `assessment_id`, ticking on the tokio timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, assessment_id: &str) -> SessionHandle {
        self.start_with_clock(assessment_id, IntervalClock::new(self.config.tick_interval))
    }

    /// Start a new attempt driven by the given clock.
    pub fn start_with_clock<C>(&self, assessment_id: &str, clock: C) -> SessionHandle
    where
        C: ClockSource + 'static,
    {
        let session = Session::new(assessment_id);
        let id = session.id();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(session.snapshot());
        let assessment = Arc::new(OnceLock::new());
        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::clone(&self.gateway),
            self.config.retry.clone(),
        ));

        info!(session_id = %id, assessment_id, gateway = self.gateway.name(), "starting session");
        tokio::spawn(run_session(SessionTask {
            session,
            gateway: Arc::clone(&self.gateway),
            coordinator,
            clock,
            commands: commands_rx,
            snapshots: snapshots_tx,
            assessment: Arc::clone(&assessment),
        }));

        SessionHandle {
            id,
            commands: commands_tx,
            snapshots: snapshots_rx,
            assessment,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Answer {
        question_id: String,
        value: AnswerValue,
        reply: oneshot::Sender<Result<bool, AnswerError>>,
    },
    ClearAnswer {
        question_id: String,
        reply: oneshot::Sender<Result<bool, AnswerError>>,
    },
    GoTo(usize),
    Next,
    Previous,
    Submit,
    RetrySubmission,
}

/// The host UI's view of a running session.
///
/// Dropping the handle before `Submitting` abandons the attempt. Dropping it
/// while submitting lets the submission finish in the background.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    assessment: Arc<OnceLock<Arc<Assessment>>>,
}

impl SessionHandle {
    /// Attempt id of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// The loaded assessment, once the session reached `InProgress`.
    pub fn assessment(&self) -> Option<Arc<Assessment>> {
        self.assessment.get().cloned()
    }

    /// Record an answer. Returns whether the stored answer changed.
    pub async fn answer(
        &self,
        question_id: impl Into<String>,
        value: AnswerValue,
    ) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Answer {
            question_id: question_id.into(),
            value,
            reply,
        })?;
        Ok(rx.await.map_err(|_| EngineError::SessionClosed(self.id))??)
    }

    /// Make a question unanswered again.
    pub async fn clear_answer(&self, question_id: impl Into<String>) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearAnswer {
            question_id: question_id.into(),
            reply,
        })?;
        Ok(rx.await.map_err(|_| EngineError::SessionClosed(self.id))??)
    }

    /// Jump to question `index`; out-of-range indices are ignored.
    pub fn go_to(&self, index: usize) -> Result<(), EngineError> {
        self.send(Command::GoTo(index))
    }

    pub fn next(&self) -> Result<(), EngineError> {
        self.send(Command::Next)
    }

    pub fn previous(&self) -> Result<(), EngineError> {
        self.send(Command::Previous)
    }

    /// Explicit student submit. Repeated calls are harmless.
    pub fn submit(&self) -> Result<(), EngineError> {
        self.send(Command::Submit)
    }

    /// Re-send the frozen answers after a submission failure.
    pub fn retry_submission(&self) -> Result<(), EngineError> {
        self.send(Command::RetrySubmission)
    }

    /// Wait until a snapshot satisfies `predicate` and return it.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<SessionSnapshot, EngineError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| EngineError::SessionClosed(self.id))?;
        Ok(snapshot.clone())
    }

    /// Wait for `Completed` or `Failed`.
    pub async fn wait_until_terminal(&self) -> Result<SessionSnapshot, EngineError> {
        self.wait_until(|s| s.state.is_terminal()).await
    }

    /// Resolves once the session task has exited.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::SessionClosed(self.id))
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

enum Event {
    Loaded(Result<Assessment, GatewayError>),
    Resolved(Result<Accepted, SubmitError>),
}

struct SessionTask<C> {
    session: Session,
    gateway: Arc<dyn ExamGateway>,
    coordinator: Arc<SubmissionCoordinator>,
    clock: C,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
    assessment: Arc<OnceLock<Arc<Assessment>>>,
}

async fn run_session<C: ClockSource>(mut task: SessionTask<C>) {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let session_id = task.session.id();

    task.session.start();
    {
        let gateway = Arc::clone(&task.gateway);
        let events = events_tx.clone();
        let assessment_id = task.session.assessment_id().to_string();
        tokio::spawn(async move {
            let result = gateway.fetch_assessment(&assessment_id).await;
            let _ = events.send(Event::Loaded(result));
        });
    }
    publish(&task.snapshots, &task.session);

    let mut detached = false;
    loop {
        let mut outgoing = None;
        tokio::select! {
            biased;

            Some(event) = events.recv() => match event {
                Event::Loaded(result) => {
                    if task.session.on_loaded(result) {
                        if let Some(assessment) = task.session.assessment() {
                            let _ = task.assessment.set(Arc::clone(assessment));
                        }
                        task.clock.start();
                    }
                }
                Event::Resolved(result) => task.session.on_submission_resolved(result),
            },

            delta = task.clock.tick(), if task.session.is_running() => {
                outgoing = task.session.tick(delta);
            }

            command = task.commands.recv(), if !detached => match command {
                Some(command) => outgoing = apply(&mut task.session, command),
                None => {
                    debug!(%session_id, "session handle dropped");
                    detached = true;
                }
            },
        }

        if let Some(submission) = outgoing {
            dispatch(&task.coordinator, submission, &events_tx);
        }
        publish(&task.snapshots, &task.session);

        if should_exit(&task.session, detached) {
            break;
        }
    }
    debug!(%session_id, state = %task.session.state(), "session task finished");
}

fn apply(session: &mut Session, command: Command) -> Option<Arc<Submission>> {
    match command {
        Command::Answer {
            question_id,
            value,
            reply,
        } => {
            let result = session.set_answer(&question_id, value);
            if let Err(e) = &result {
                warn!(session_id = %session.id(), error = %e, "answer rejected");
            }
            let _ = reply.send(result);
            None
        }
        Command::ClearAnswer { question_id, reply } => {
            let _ = reply.send(session.clear_answer(&question_id));
            None
        }
        Command::GoTo(index) => {
            session.select_question(index);
            None
        }
        Command::Next => {
            session.next_question();
            None
        }
        Command::Previous => {
            session.previous_question();
            None
        }
        Command::Submit => session.request_submit(),
        Command::RetrySubmission => session.retry_submission(),
    }
}

/// Hand the frozen payload to the coordinator without blocking the task.
fn dispatch(
    coordinator: &Arc<SubmissionCoordinator>,
    submission: Arc<Submission>,
    events: &mpsc::UnboundedSender<Event>,
) {
    let coordinator = Arc::clone(coordinator);
    let events = events.clone();
    tokio::spawn(async move {
        let result = coordinator.submit(&submission).await;
        if events.send(Event::Resolved(result)).is_err() {
            debug!(attempt_id = %submission.attempt_id, "session gone, submission result dropped");
        }
    });
}

fn publish(snapshots: &watch::Sender<SessionSnapshot>, session: &Session) {
    let next = session.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

fn should_exit(session: &Session, detached: bool) -> bool {
    match session.state() {
        SessionState::Completed => true,
        SessionState::Failed => {
            // Only a submission failure can be retried, and only by a live handle.
            detached
                || !matches!(
                    session.failure().map(|f| f.reason),
                    Some(FailureReason::SubmissionFailed { .. })
                )
        }
        SessionState::Submitting => false,
        SessionState::Idle | SessionState::Loading | SessionState::InProgress => {
            if detached {
                warn!(
                    session_id = %session.id(),
                    state = %session.state(),
                    "session abandoned before submission"
                );
            }
            detached
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{LoadFailure, SubmitTrigger};
    use crate::test_support::{sample_grade, ScriptedGateway};

    fn engine(gateway: Arc<ScriptedGateway>) -> ExamEngine {
        ExamEngine::new(gateway, EngineConfig::default())
    }

    async fn in_progress(handle: &SessionHandle) -> SessionSnapshot {
        handle
            .wait_until(|s| s.state == SessionState::InProgress)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_completes_session() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(sample_grade())]));
        let (clock, driver) = ManualClock::new();
        let handle = engine(gateway.clone()).start_with_clock("algebra-1", clock);

        let snapshot = in_progress(&handle).await;
        assert_eq!(snapshot.current_question_index, 0);
        assert_eq!(snapshot.remaining_seconds, 60);
        assert_eq!(handle.assessment().unwrap().question_count(), 3);

        assert!(handle
            .answer("q1", AnswerValue::Choice("b".into()))
            .await
            .unwrap());
        driver.advance_secs(10);
        handle.wait_until(|s| s.remaining_seconds == 50).await.unwrap();
        handle.submit().unwrap();

        let done = handle.wait_until_terminal().await.unwrap();
        assert_eq!(done.state, SessionState::Completed);
        let outcome = done.outcome.unwrap();
        assert_eq!(outcome.result, sample_grade());
        assert_eq!(outcome.elapsed_seconds, 10);
        assert_eq!(gateway.submissions().len(), 1);

        handle.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_submits_automatically() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(sample_grade())]));
        let (clock, driver) = ManualClock::new();
        let handle = engine(gateway.clone()).start_with_clock("algebra-1", clock);
        in_progress(&handle).await;

        driver.advance_secs(60);
        let done = handle.wait_until_terminal().await.unwrap();
        assert_eq!(done.trigger, Some(SubmitTrigger::TimeExpired));
        assert_eq!(done.remaining_seconds, 0);
        assert_eq!(gateway.submissions()[0].elapsed_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn double_submit_reaches_gateway_once() {
        let gateway = Arc::new(
            ScriptedGateway::new(vec![Ok(sample_grade())])
                .with_first_call_delay(Duration::from_secs(3)),
        );
        let (clock, _driver) = ManualClock::new();
        let handle = engine(gateway.clone()).start_with_clock("algebra-1", clock);
        in_progress(&handle).await;

        handle.submit().unwrap();
        handle.submit().unwrap();

        let done = handle.wait_until_terminal().await.unwrap();
        assert_eq!(done.state, SessionState::Completed);
        assert_eq!(gateway.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_answer_is_reported_to_caller() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let (clock, _driver) = ManualClock::new();
        let handle = engine(gateway).start_with_clock("algebra-1", clock);
        in_progress(&handle).await;

        let err = handle
            .answer("q404", AnswerValue::Boolean(true))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Answer(AnswerError::UnknownQuestion("q404".into()))
        );
        assert_eq!(handle.snapshot().answered_questions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_assessment_fails_and_closes() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let (clock, _driver) = ManualClock::new();
        let handle = engine(gateway).start_with_clock("missing", clock);

        let done = handle.wait_until_terminal().await.unwrap();
        assert_eq!(
            done.failure.unwrap().reason,
            FailureReason::Load(LoadFailure::NotFound)
        );
        handle.closed().await;
        assert_eq!(handle.submit(), Err(EngineError::SessionClosed(handle.id())));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_in_progress_abandons_session() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(sample_grade())]));
        let (clock, driver) = ManualClock::new();
        let handle = engine(gateway.clone()).start_with_clock("algebra-1", clock);
        in_progress(&handle).await;

        let mut rx = handle.subscribe();
        drop(handle);
        while rx.changed().await.is_ok() {}

        assert!(!driver.advance_secs(60), "clock should be dropped with the task");
        assert!(gateway.submissions().is_empty());
        assert_eq!(rx.borrow().state, SessionState::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_resolves_after_handle_dropped() {
        let gateway = Arc::new(
            ScriptedGateway::new(vec![Ok(sample_grade())])
                .with_first_call_delay(Duration::from_secs(5)),
        );
        let (clock, _driver) = ManualClock::new();
        let handle = engine(gateway.clone()).start_with_clock("algebra-1", clock);
        in_progress(&handle).await;

        let mut rx = handle.subscribe();
        handle.submit().unwrap();
        handle
            .wait_until(|s| s.state == SessionState::Submitting)
            .await
            .unwrap();
        drop(handle);

        while rx.changed().await.is_ok() {}
        assert_eq!(rx.borrow().state, SessionState::Completed);
    }
}
