//! The `examkit validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use examkit_core::model::{Assessment, QuestionKind};

/// Non-fatal issues a gateway would still accept.
fn lint(assessment: &Assessment) -> Vec<String> {
    let mut warnings = Vec::new();
    if assessment.title.trim().is_empty() {
        warnings.push("assessment has no title".to_string());
    }
    for question in &assessment.questions {
        if question.prompt.trim().is_empty() {
            warnings.push(format!("[{}] empty prompt", question.id));
        }
        if question.kind != QuestionKind::SingleChoice && !question.options.is_empty() {
            warnings.push(format!(
                "[{}] options are ignored for {} questions",
                question.id, question.kind
            ));
        }
        if question.kind == QuestionKind::SingleChoice && question.options.len() == 1 {
            warnings.push(format!("[{}] single-choice question has one option", question.id));
        }
    }
    warnings
}

fn load_assessment(path: &Path) -> Result<Assessment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assessment: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse assessment: {}", path.display()))
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
    {
        let entry_path = entry?.path();
        if entry_path.extension().is_some_and(|ext| ext == "json") {
            files.push(entry_path);
        }
    }
    files.sort();
    if files.is_empty() {
        anyhow::bail!("no .json assessments found in {}", path.display());
    }
    Ok(files)
}

pub fn execute(path: PathBuf) -> Result<()> {
    let files = collect_files(&path)?;

    let mut total_warnings = 0;
    let mut invalid = 0;

    for file in &files {
        let assessment = load_assessment(file)?;
        println!(
            "Assessment: {} ({} questions, {}s)",
            assessment.title,
            assessment.question_count(),
            assessment.duration_seconds
        );

        if let Err(e) = assessment.validate() {
            println!("  ERROR: {e}");
            invalid += 1;
        }
        let warnings = lint(&assessment);
        for w in &warnings {
            println!("  WARNING: {w}");
        }
        total_warnings += warnings.len();
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} invalid assessment(s)");
    }
    if total_warnings == 0 {
        println!("All assessments valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
