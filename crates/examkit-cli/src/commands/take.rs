//! The `examkit take` command: a terminal host for one timed session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use comfy_table::{Cell, Table};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use examkit_core::model::{AnswerValue, Assessment, QuestionKind};
use examkit_core::session::{FailureReason, RecoveryAction, SessionSnapshot, SubmitTrigger};
use examkit_core::{EngineError, ExamEngine, SessionHandle, SessionState};
use examkit_gateway::config::{create_gateway, load_config_from};

/// Remaining-time marks (seconds) at which the student is warned.
const TIME_WARNINGS: [u64; 4] = [300, 60, 30, 10];

/// One line of student input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Next,
    Prev,
    /// Zero-based question index.
    GoTo(usize),
    Answer(String),
    Clear,
    Submit,
    Retry,
    Status,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "next" | "n" => Ok(Input::Next),
        "prev" | "p" => Ok(Input::Prev),
        "goto" | "g" => match rest.parse::<usize>() {
            Ok(0) => Err("question numbers start at 1".into()),
            Ok(n) => Ok(Input::GoTo(n - 1)),
            Err(_) => Err(format!("not a question number: {rest:?}")),
        },
        "answer" | "a" if rest.is_empty() => Err("usage: answer <value>".into()),
        "answer" | "a" => Ok(Input::Answer(rest.to_string())),
        "clear" => Ok(Input::Clear),
        "submit" => Ok(Input::Submit),
        "retry" => Ok(Input::Retry),
        "status" | "s" => Ok(Input::Status),
        "help" | "?" => Ok(Input::Help),
        "quit" | "q" | "exit" => Ok(Input::Quit),
        "" => Err("empty command".into()),
        other => Err(format!("unknown command: {other} (try `help`)")),
    }
}

pub async fn execute(assessment_id: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    debug!(?config, "loaded configuration");

    let gateway = create_gateway(&config.gateway)?;
    let engine = ExamEngine::new(gateway, config.engine_config());
    let handle = engine.start(&assessment_id);

    eprintln!("Loading assessment {assessment_id}...");
    let loaded = handle
        .wait_until(|s| !matches!(s.state, SessionState::Idle | SessionState::Loading))
        .await?;
    if loaded.state == SessionState::Failed {
        return Err(failure_error(&loaded));
    }
    let assessment = handle
        .assessment()
        .context("session started without an assessment")?;

    println!(
        "{} ({} questions, {} to complete)",
        assessment.title,
        assessment.question_count(),
        format_clock(assessment.duration_seconds)
    );
    println!("Type `help` for commands.\n");
    print_question(&assessment, loaded.current_question_index);

    run_loop(&handle, &assessment, loaded).await
}

async fn run_loop(
    handle: &SessionHandle,
    assessment: &Arc<Assessment>,
    initial: SessionSnapshot,
) -> Result<()> {
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut shown_index = initial.current_question_index;
    let mut warned_at = u64::MAX;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    // Session task exited; the last snapshot says why.
                    let last = handle.snapshot();
                    return finish(&last, false).unwrap_or_else(|| Err(failure_error(&last)));
                }
                let snapshot = updates.borrow_and_update().clone();
                match snapshot.state {
                    SessionState::Completed | SessionState::Failed => {
                        if let Some(result) = finish(&snapshot, stdin_open) {
                            return result;
                        }
                    }
                    SessionState::Submitting => {
                        if snapshot.trigger == Some(SubmitTrigger::TimeExpired) {
                            println!("Time is up. Submitting your answers...");
                        } else {
                            println!("Submitting...");
                        }
                    }
                    SessionState::InProgress => {
                        if snapshot.current_question_index != shown_index {
                            shown_index = snapshot.current_question_index;
                            print_question(assessment, shown_index);
                        }
                        if let Some(mark) = TIME_WARNINGS
                            .iter()
                            .copied()
                            .find(|&m| snapshot.remaining_seconds <= m && m < warned_at)
                        {
                            warned_at = mark;
                            println!("{} remaining.", format_clock(snapshot.remaining_seconds));
                        }
                    }
                    SessionState::Idle | SessionState::Loading => {}
                }
            }

            line = lines.next_line(), if stdin_open => {
                let line = match line.context("failed to read stdin")? {
                    Some(line) => line,
                    None => {
                        stdin_open = false;
                        if handle.snapshot().state == SessionState::Submitting {
                            continue;
                        }
                        return abandon(handle);
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Ok(Input::Quit) => {
                        if handle.snapshot().state == SessionState::Submitting {
                            println!("A submission is in progress; waiting for the result.");
                            continue;
                        }
                        return abandon(handle);
                    }
                    Ok(input) => apply(handle, assessment, input).await,
                    Err(message) => println!("{message}"),
                }
            }
        }
    }
}

async fn apply(handle: &SessionHandle, assessment: &Assessment, input: Input) {
    let snapshot = handle.snapshot();
    let current = snapshot.current_question_index;
    let last = assessment.question_count().saturating_sub(1);
    let result = match input {
        Input::Next => move_to(handle, handle.next(), (current + 1).min(last)).await,
        Input::Prev => move_to(handle, handle.previous(), current.saturating_sub(1)).await,
        Input::GoTo(index) if index > last => {
            println!("There are only {} questions.", assessment.question_count());
            Ok(())
        }
        Input::GoTo(index) => move_to(handle, handle.go_to(index), index).await,
        Input::Answer(raw) => {
            let Some(question) = assessment.questions.get(snapshot.current_question_index) else {
                return;
            };
            match AnswerValue::parse_for(question.kind, &raw) {
                Ok(value) => handle
                    .answer(question.id.clone(), value)
                    .await
                    .map(|changed| {
                        if changed {
                            println!("Saved.");
                        }
                    }),
                Err(message) => {
                    println!("{message}");
                    Ok(())
                }
            }
        }
        Input::Clear => {
            let Some(question) = assessment.questions.get(snapshot.current_question_index) else {
                return;
            };
            handle.clear_answer(question.id.clone()).await.map(|changed| {
                if changed {
                    println!("Cleared.");
                }
            })
        }
        // Wait for the command to land so a closing stdin cannot race it.
        Input::Submit => match handle.submit() {
            Ok(()) => handle
                .wait_until(|s| s.state != SessionState::InProgress)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        },
        Input::Retry => match handle.retry_submission() {
            Ok(()) => handle
                .wait_until(|s| s.state != SessionState::Failed)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        },
        Input::Status => {
            print_status(&snapshot);
            Ok(())
        }
        Input::Help => {
            print_help();
            Ok(())
        }
        Input::Quit => Ok(()),
    };

    match result {
        Ok(()) => {}
        Err(EngineError::Answer(e)) => println!("Answer rejected: {e}"),
        Err(e) => debug!(error = %e, "command not delivered"),
    }
}

/// Wait until a navigation command has been applied, so the next answer
/// lands on the question the student is looking at.
async fn move_to(
    handle: &SessionHandle,
    sent: Result<(), EngineError>,
    expected: usize,
) -> Result<(), EngineError> {
    sent?;
    handle
        .wait_until(|s| s.current_question_index == expected || s.state != SessionState::InProgress)
        .await
        .map(|_| ())
}

/// Decide what a terminal snapshot means for the process.
///
/// Returns `None` when the student can still act (a retryable submission
/// failure with input available).
fn finish(snapshot: &SessionSnapshot, can_retry: bool) -> Option<Result<()>> {
    match snapshot.state {
        SessionState::Completed => {
            print_outcome(snapshot);
            Some(Ok(()))
        }
        SessionState::Failed => {
            let Some(failure) = &snapshot.failure else {
                return Some(Err(failure_error(snapshot)));
            };
            let retryable = matches!(failure.reason, FailureReason::SubmissionFailed { .. })
                && failure.recovery() == RecoveryAction::Retry;
            if retryable && can_retry {
                println!("Submission failed: {}", failure.message);
                println!("Your answers are kept. Type `retry` to send them again.");
                None
            } else {
                Some(Err(failure_error(snapshot)))
            }
        }
        _ => Some(Err(anyhow!("session ended while {}", snapshot.state))),
    }
}

fn abandon(handle: &SessionHandle) -> Result<()> {
    let snapshot = handle.snapshot();
    match snapshot.state {
        SessionState::Completed => {
            print_outcome(&snapshot);
            Ok(())
        }
        SessionState::Failed => Err(failure_error(&snapshot)),
        _ => {
            println!(
                "Attempt abandoned with {}/{} questions answered. Nothing was submitted.",
                snapshot.answered_questions, snapshot.total_questions
            );
            Ok(())
        }
    }
}

fn failure_error(snapshot: &SessionSnapshot) -> anyhow::Error {
    match &snapshot.failure {
        Some(failure) => {
            let advice = match failure.recovery() {
                RecoveryAction::Retry => "try again later",
                RecoveryAction::ContactSupport => "contact support",
                RecoveryAction::ReturnToCourse => "return to your course",
            };
            anyhow!("{} ({advice})", failure.message)
        }
        None => anyhow!("session failed"),
    }
}

fn print_question(assessment: &Assessment, index: usize) {
    let Some(question) = assessment.questions.get(index) else {
        return;
    };
    println!(
        "Question {}/{}: {}",
        index + 1,
        assessment.question_count(),
        question.prompt
    );
    match question.kind {
        QuestionKind::SingleChoice => {
            for option in &question.options {
                println!("  [{}] {}", option.id, option.label);
            }
        }
        QuestionKind::Boolean => println!("  (true/false)"),
        QuestionKind::FreeText => println!("  (free text)"),
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    println!(
        "{} | question {}/{} | {}/{} answered | {} remaining",
        snapshot.state,
        snapshot.current_question_index + 1,
        snapshot.total_questions,
        snapshot.answered_questions,
        snapshot.total_questions,
        format_clock(snapshot.remaining_seconds)
    );
}

fn print_help() {
    println!("Commands:");
    println!("  next | prev | goto <n>   move between questions");
    println!("  answer <value>           answer the current question");
    println!("  clear                    remove the current answer");
    println!("  status                   show progress and time left");
    println!("  submit                   hand in your answers");
    println!("  retry                    resend after a failed submission");
    println!("  quit                     leave without submitting");
}

fn print_outcome(snapshot: &SessionSnapshot) {
    let Some(outcome) = &snapshot.outcome else {
        return;
    };
    let result = &outcome.result;
    let trigger = match outcome.trigger {
        SubmitTrigger::Manual => "submitted",
        SubmitTrigger::TimeExpired => "time expired",
    };

    let mut table = Table::new();
    table.set_header(vec![
        "Assessment",
        "Score",
        "Percentage",
        "Grade",
        "Result",
        "Time Used",
        "Ended By",
    ]);
    table.add_row(vec![
        Cell::new(&snapshot.assessment_id),
        Cell::new(format!("{}/{}", result.score, result.max_score)),
        Cell::new(format!("{:.1}%", result.percentage)),
        Cell::new(result.grade.as_deref().unwrap_or("-")),
        Cell::new(if result.passed { "PASS" } else { "FAIL" }),
        Cell::new(format_clock(outcome.elapsed_seconds)),
        Cell::new(trigger),
    ]);
    println!("\n{table}");
}

fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("next"), Ok(Input::Next));
        assert_eq!(parse_input("  P "), Ok(Input::Prev));
        assert_eq!(parse_input("goto 3"), Ok(Input::GoTo(2)));
        assert_eq!(
            parse_input("answer Krebs cycle"),
            Ok(Input::Answer("Krebs cycle".into()))
        );
        assert_eq!(parse_input("quit"), Ok(Input::Quit));
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse_input("goto 0").is_err());
        assert!(parse_input("goto two").is_err());
        assert!(parse_input("answer").is_err());
        assert!(parse_input("dance").is_err());
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(3600), "60:00");
    }
}
