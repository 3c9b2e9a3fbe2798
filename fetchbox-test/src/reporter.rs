use std::sync::{Arc, Mutex};

use fetchbox::{ErrorReporter, LogoutReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Network { status: Option<u16>, message: String },
    Auth { code: i64, message: String },
    General { message: String },
    Logout(LogoutReason),
}

/// Keeps every report for later assertions. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn logouts(&self) -> Vec<LogoutReason> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|report| match report {
                Report::Logout(reason) => Some(*reason),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().unwrap().is_empty()
    }

    fn push(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}

impl ErrorReporter for RecordingReporter {
    fn network_error(&self, status: Option<u16>, message: &str) {
        self.push(Report::Network {
            status,
            message: message.to_owned(),
        });
    }

    fn auth_error(&self, code: i64, message: &str) {
        self.push(Report::Auth {
            code,
            message: message.to_owned(),
        });
    }

    fn general_error(&self, message: &str) {
        self.push(Report::General {
            message: message.to_owned(),
        });
    }

    fn force_logout(&self, reason: LogoutReason) {
        self.push(Report::Logout(reason));
    }
}
