pub mod completions;
pub mod delete;
pub mod list;
pub mod pull;
pub mod push;

use crate::config::SyncConfig;
use indicatif::{ProgressBar, ProgressStyle};
use remote_sync_core::{CancelFlag, SyncEngine};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_REMOTE_ERROR: u8 = 3;

/// Everything a sync command needs besides its own arguments.
pub struct Context<'a> {
    pub config: &'a SyncConfig,
    pub remote: Option<&'a str>,
    pub cancel: &'a CancelFlag,
    pub json: bool,
}

impl Context<'_> {
    pub fn engine(&self, keep_emergency_backup: bool) -> Result<SyncEngine, String> {
        let provider = self.config.provider(self.remote)?;
        Ok(SyncEngine::new(
            self.config.settings(keep_emergency_backup),
            provider,
            self.config.database_host(),
            Box::new(self.config.volume_registry()),
        )
        .with_cancel_flag(self.cancel.clone()))
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Exit code for an error message, keyed on its prefix.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("config error:") {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with("remote error:") {
        EXIT_REMOTE_ERROR
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"filename": "a.sql"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"filename\""));
        assert!(result.contains("\"a.sql\""));
    }

    #[test]
    fn exit_codes_follow_prefix() {
        assert_eq!(exit_code_for("config error: missing"), EXIT_CONFIG_ERROR);
        assert_eq!(exit_code_for("remote error: not found: x.sql"), EXIT_REMOTE_ERROR);
        assert_eq!(exit_code_for("database dump failed: boom"), EXIT_FAILURE);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("working");
        spin_ok(&pb, "done");
        assert!(pb.is_finished());
        let pb = spinner("working");
        spin_fail(&pb, "failed");
        assert!(pb.is_finished());
    }
}
