//! Command handlers.

pub mod config_cmd;
pub mod query;
pub mod run;

use forch_core::Reply;

use crate::error::CliError;

/// Unwrap a query reply, turning a broken one into an error.
fn answer<T>(query: &str, reply: Reply<T>) -> Result<T, CliError> {
    match reply {
        Reply::Ready(value) => Ok(value),
        Reply::Broken(summary) => Err(CliError::Unanswered {
            query: query.to_owned(),
            detail: summary.detail,
        }),
    }
}
