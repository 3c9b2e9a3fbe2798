//! Error reporting boundary.
//!
//! Failures are handed to an [`ErrorReporter`], which owns how they reach the
//! user: a toast, a log line, a redirect to the login page. The client only
//! decides *what* to report and when a session must end.

use std::fmt;
use std::sync::Arc;

use fetchbox_core::{CodeStatus, TransportResponse};
use tracing::{error, warn};

/// Message shown when no response was received at all.
pub const UNREACHABLE_MESSAGE: &str = "Unable to connect to the server";

/// Statuses that end the session.
const LOGOUT_STATUSES: [u16; 4] = [301, 302, 401, 403];

/// Auth codes that end the session.
const LOGOUT_AUTH_CODES: [i64; 2] = [10031, 10032];

/// Why a session is being ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The server answered with a status that requires signing in again.
    Status(u16),
    /// The request was redirected, usually to a login page.
    Redirected,
    /// The response body carried an expired or invalid session code.
    AuthCode(i64),
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoutReason::Status(status) => write!(f, "status {status}"),
            LogoutReason::Redirected => f.write_str("redirected"),
            LogoutReason::AuthCode(code) => write!(f, "auth code {code}"),
        }
    }
}

/// Receives failures for display.
pub trait ErrorReporter: Send + Sync {
    /// A transport failure. `status` is `None` when the server was unreachable.
    fn network_error(&self, status: Option<u16>, message: &str);

    /// A response body with a known authentication error code.
    fn auth_error(&self, code: i64, message: &str);

    /// A response body whose code marks it as a failure.
    fn general_error(&self, message: &str);

    /// The session must end and the user sign in again.
    fn force_logout(&self, reason: LogoutReason);
}

impl<T> ErrorReporter for Arc<T>
where
    T: ErrorReporter + ?Sized,
{
    fn network_error(&self, status: Option<u16>, message: &str) {
        (**self).network_error(status, message)
    }

    fn auth_error(&self, code: i64, message: &str) {
        (**self).auth_error(code, message)
    }

    fn general_error(&self, message: &str) {
        (**self).general_error(message)
    }

    fn force_logout(&self, reason: LogoutReason) {
        (**self).force_logout(reason)
    }
}

/// Reporter that writes every failure to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn network_error(&self, status: Option<u16>, message: &str) {
        error!(?status, detail = message, "Request failed");
    }

    fn auth_error(&self, code: i64, message: &str) {
        warn!(code, detail = message, "Authentication error");
    }

    fn general_error(&self, message: &str) {
        warn!(detail = message, "Request rejected");
    }

    fn force_logout(&self, reason: LogoutReason) {
        warn!(%reason, "Session ended");
    }
}

/// Message for an HTTP status.
pub fn status_message(status: u16) -> Option<&'static str> {
    let message = match status {
        301 => "Resource moved permanently",
        302 => "Resource moved temporarily",
        400 => "Bad request",
        401 => "Unauthorized, please sign in again",
        403 => "Access denied, no permission for this endpoint",
        404 => "Request failed, resource not found",
        405 => "Request method not allowed",
        408 => "Request timed out",
        500 => "Internal server error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        505 => "HTTP version not supported",
        _ => return None,
    };
    Some(message)
}

/// Message for an authentication error code carried in a response body.
pub fn auth_message(code: i64) -> Option<&'static str> {
    let message = match code {
        10031 => "Session is no longer valid, please sign in again",
        10032 => "You have been away too long, please sign in again",
        10033 => "Account has no role, ask an administrator to assign one",
        10034 => "User is not registered, ask an administrator to register it",
        10035 => "No user matches this third-party code",
        10036 => "Account is not linked to an employee, ask an administrator to link it",
        10037 => "Account is disabled",
        10038 => "Account not found",
        _ => return None,
    };
    Some(message)
}

/// Reports a transport failure and ends the session when the response
/// requires it.
pub fn handle_network_error(reporter: &dyn ErrorReporter, response: Option<&TransportResponse>) {
    let Some(response) = response else {
        reporter.network_error(None, UNREACHABLE_MESSAGE);
        return;
    };

    let status = response.status;
    match status_message(status) {
        Some(message) => reporter.network_error(Some(status), message),
        None => reporter.network_error(Some(status), &format!("Connection error: {status}")),
    }

    if LOGOUT_STATUSES.contains(&status) {
        reporter.force_logout(LogoutReason::Status(status));
    } else if response.redirected {
        reporter.force_logout(LogoutReason::Redirected);
    }
}

/// Reports an authentication error code. Returns `false` if `code` was one.
pub fn handle_auth_error(reporter: &dyn ErrorReporter, code: Option<i64>) -> bool {
    let Some((code, message)) = code.and_then(|code| auth_message(code).map(|m| (code, m))) else {
        return true;
    };
    reporter.auth_error(code, message);
    if LOGOUT_AUTH_CODES.contains(&code) {
        reporter.force_logout(LogoutReason::AuthCode(code));
    }
    false
}

/// Reports a body whose code marks it as an error. Returns `false` if it was.
pub fn handle_general_error(
    reporter: &dyn ErrorReporter,
    code: Option<i64>,
    message: Option<&str>,
) -> bool {
    if code.and_then(CodeStatus::from_code) != Some(CodeStatus::Error) {
        return true;
    }
    reporter.general_error(message.unwrap_or_default());
    false
}
