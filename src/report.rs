//! Outcome reporting.
//!
//! Every operation performed through a [`Session`](crate::client::Session)
//! ends in exactly one call to the [`Reporter`] of the client that opened it.
//! The default [`LogReporter`] turns those calls into `log` records.

use std::error::Error as StdError;

use crate::error::Error;

/// How an operation ended.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Done,
    /// The store answered but refused the request, e.g. deleting a missing path.
    Declined,
    Failed(&'a Error),
}

pub trait Reporter: Send + Sync {
    fn report(&self, op: &str, target: &str, outcome: Outcome<'_>);
}

/// Forwards outcomes to the `log` facade: `info` for answers, `error` with the
/// whole cause chain for failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, op: &str, target: &str, outcome: Outcome<'_>) {
        match outcome {
            Outcome::Done => info!("{op} {target} succeeded"),
            Outcome::Declined => info!("{op} {target} failed"),
            Outcome::Failed(err) => error!("{op} {target} failed: {}", chain(err)),
        }
    }
}

/// Renders an error followed by each of its sources, separated by `: `.
pub fn chain(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
