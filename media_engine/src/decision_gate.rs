//! §4.J Batch-Decision Gate — aggregates corrupt and very-low-quality files
//! between the analyze and execute phases, and solicits a single user
//! choice with a bounded countdown.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::events::{EngineEvent, EventSink, PromptRequest, PromptResponder};
use crate::types::{CorruptDecision, Decision, LowQualityDecision};

const COUNTDOWN: Duration = Duration::from_secs(5);

const CORRUPT_CHOICES: &[&str] = &["Repair", "DeleteAll", "Terminate", "Ignore"];
const LOW_QUALITY_CHOICES: &[&str] = &["Skip", "Delete", "ForceConvert", "EmojiMode"];

fn parse_corrupt(choice: &str) -> CorruptDecision {
    match choice {
        "Repair" => CorruptDecision::Repair,
        "DeleteAll" => CorruptDecision::DeleteAll,
        "Terminate" => CorruptDecision::Terminate,
        _ => CorruptDecision::Ignore,
    }
}

fn parse_low_quality(choice: &str) -> LowQualityDecision {
    match choice {
        "Delete" => LowQualityDecision::Delete,
        "ForceConvert" => LowQualityDecision::ForceConvert,
        "EmojiMode" => LowQualityDecision::EmojiMode,
        _ => LowQualityDecision::Skip,
    }
}

/// Ask the user (or, non-interactively, apply the default immediately) for
/// the corrupt-files policy and the very-low-quality-files policy.
pub fn resolve(
    corrupt_files: &[PathBuf],
    very_low_quality_files: &[PathBuf],
    interactive: bool,
    sink: &EventSink,
    responder: &dyn PromptResponder,
) -> Decision {
    if corrupt_files.is_empty() && very_low_quality_files.is_empty() {
        return Decision::default();
    }

    info!(
        corrupt = corrupt_files.len(),
        low_quality = very_low_quality_files.len(),
        "batch-decision gate engaged"
    );

    let corrupt = if corrupt_files.is_empty() {
        CorruptDecision::Ignore
    } else if interactive {
        let choice = prompt(
            sink,
            responder,
            format!("{} file(s) appear corrupt", corrupt_files.len()),
            CORRUPT_CHOICES,
            "Ignore",
        );
        parse_corrupt(&choice)
    } else {
        CorruptDecision::Ignore
    };

    let low_quality = if very_low_quality_files.is_empty() {
        LowQualityDecision::Skip
    } else if interactive {
        let choice = prompt(
            sink,
            responder,
            format!(
                "{} file(s) are very low quality",
                very_low_quality_files.len()
            ),
            LOW_QUALITY_CHOICES,
            "Skip",
        );
        parse_low_quality(&choice)
    } else {
        LowQualityDecision::Skip
    };

    Decision {
        corrupt,
        low_quality,
    }
}

fn prompt(
    sink: &EventSink,
    responder: &dyn PromptResponder,
    description: String,
    choices: &[&str],
    default_choice: &str,
) -> String {
    let choices_owned: Vec<String> = choices.iter().map(|s| s.to_string()).collect();
    let (answer_tx, _answer_rx) = std::sync::mpsc::channel();
    sink.emit(EngineEvent::UserPrompt {
        prompt: PromptRequest {
            description: description.clone(),
            choices: choices_owned.clone(),
            default_choice: default_choice.to_string(),
            countdown: COUNTDOWN,
            answer: answer_tx,
        },
    });
    responder.respond(&choices_owned, default_choice, COUNTDOWN)
}
