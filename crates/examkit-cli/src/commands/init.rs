//! The `examkit init` command.

use std::path::Path;

use anyhow::Result;

fn write_if_missing(path: &str, content: &str) -> Result<()> {
    if Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content)?;
        println!("Created {path}");
    }
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing("examkit.toml", SAMPLE_CONFIG)?;
    write_if_missing("sample-assessment.json", SAMPLE_ASSESSMENT)?;

    println!("\nNext steps:");
    println!("  1. Edit examkit.toml with your gateway URL and token");
    println!("  2. Run: examkit validate --file sample-assessment.json");
    println!("  3. Run: examkit take --assessment <id>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examkit configuration

[gateway]
base_url = "http://localhost:8080/api"
auth_token = "${EXAMKIT_TOKEN}"
request_timeout_secs = 15

[retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 8000

[clock]
tick_interval_ms = 1000
"#;

const SAMPLE_ASSESSMENT: &str = r#"{
  "id": "sample-quiz",
  "title": "Sample Quiz",
  "durationSeconds": 300,
  "passingThreshold": 60,
  "questions": [
    {
      "id": "q1",
      "prompt": "Which planet is closest to the sun?",
      "kind": "single_choice",
      "options": [
        { "id": "a", "label": "Venus" },
        { "id": "b", "label": "Mercury" },
        { "id": "c", "label": "Mars" }
      ]
    },
    {
      "id": "q2",
      "prompt": "Light travels faster than sound.",
      "kind": "boolean"
    },
    {
      "id": "q3",
      "prompt": "Name the force that keeps planets in orbit.",
      "kind": "free_text"
    }
  ]
}
"#;
