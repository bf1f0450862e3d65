//! Event labels for date partitions.
//!
//! Labelling `2024-12-27` as `Kyoto` renames `2024/12/2024-12-27` (or its
//! previously labelled name) to `2024/12/2024-12-27_Kyoto`, rewrites the
//! paths of every record in it and persists the index. Either all of that
//! happens or none of it does.

use crate::error::{ErrorKind, Result};
use crate::plan::PathPlanner;
use crate::report::DayCount;
use crate::session::Session;
use async_trait::async_trait;
use exn::ResultExt;
use lens_storage::validate_segment;
use std::collections::BTreeMap;
use std::path::Path;
use time::Date;
use time::macros::format_description;
use tracing::instrument;

/// A successfully applied label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub date: String,
    pub label: String,
    /// Partition directory before and after, relative to the archive root.
    pub from: String,
    pub to: String,
    /// Number of records whose paths were rewritten.
    pub records: usize,
}

fn failed(date: &str, reason: impl Into<String>) -> ErrorKind {
    ErrorKind::AnnotationFailed { date: date.to_string(), reason: reason.into() }
}

/// Label the partition for `date` (`YYYY-MM-DD`).
#[instrument(skip(session), fields(backend = session.backend().name()))]
pub async fn annotate(session: &mut Session, date: &str, label: &str) -> Result<Annotation> {
    let label = validate_segment(label).or_raise(|| failed(date, "label must be a single, non-empty path segment"))?;
    let day = Date::parse(date, format_description!("[year]-[month]-[day]"))
        .or_raise(|| failed(date, "dates are written YYYY-MM-DD"))?;
    if !session.index().document().events.contains_key(date) {
        exn::bail!(failed(date, "nothing archived on this date"));
    }

    let from = PathPlanner::partition(day, session.index().label(date));
    let to = PathPlanner::partition(day, Some(label));
    let mut annotation =
        Annotation { date: date.to_string(), label: label.to_string(), from: from.clone(), to: to.clone(), records: 0 };
    if from == to {
        tracing::debug!(partition = %to, "Already labelled");
        return Ok(annotation);
    }

    let backend = session.backend().clone();
    let has_records = session.index().document().files.iter().any(|r| r.date_key() == date);
    let exists = backend.exists(Path::new(&from)).await.or_raise(|| ErrorKind::Storage)?;
    if !exists && has_records {
        exn::bail!(failed(date, format!("partition directory {from} is missing")));
    }
    if backend.exists(Path::new(&to)).await.or_raise(|| ErrorKind::Storage)? {
        exn::bail!(failed(date, format!("{to} already exists")));
    }
    if exists {
        backend
            .rename(Path::new(&from), Path::new(&to))
            .await
            .or_raise(|| failed(date, format!("could not rename {from}")))?;
    }

    let checkpoint = session.index().checkpoint();
    annotation.records = session.index_mut().relabel_partition(date, &from, &to);
    session.index_mut().set_event(date, label);
    if let Err(e) = session.flush().await {
        session.index_mut().rollback(checkpoint);
        if exists && let Err(undo) = backend.rename(Path::new(&to), Path::new(&from)).await {
            tracing::error!(error = ?undo, from = %to, to = %from, "Could not restore partition directory name");
        }
        return Err(e).or_raise(|| failed(date, "index could not be saved"));
    }
    tracing::info!(date, label, records = annotation.records, "Partition labelled");
    Ok(annotation)
}

/// Answer from an [`EventNamer`] for one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingDecision {
    Label(String),
    Skip,
    /// Don't ask about any further dates.
    Stop,
}

/// Supplies event labels for dates, e.g. by asking the user.
#[async_trait]
pub trait EventNamer: Send + Sync {
    async fn name(&self, date: &str, count: DayCount) -> NamingDecision;
}

/// Offer every unlabelled partition in `touched` to `namer`, in date order,
/// and apply the labels it comes up with.
///
/// A label that can't be applied is reported and the remaining dates are
/// still offered.
pub async fn name_events(
    session: &mut Session,
    touched: &BTreeMap<String, DayCount>,
    namer: &dyn EventNamer,
) -> Vec<(String, Result<Annotation>)> {
    let mut results = Vec::new();
    for (date, count) in touched {
        if let Some(existing) = session.index().label(date) {
            tracing::debug!(date, label = existing, "Already labelled; not asking");
            continue;
        }
        match namer.name(date, *count).await {
            NamingDecision::Label(label) => {
                let result = annotate(session, date, &label).await;
                results.push((date.clone(), result));
            },
            NamingDecision::Skip => {},
            NamingDecision::Stop => break,
        }
    }
    results
}
