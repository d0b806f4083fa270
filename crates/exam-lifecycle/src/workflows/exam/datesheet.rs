use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::conflicts::{self, ConflictReport};
use super::domain::{Datesheet, DatesheetEntry, EntryDraft, EntryId, ExamScope};
use super::error::ExamError;
use super::status::{DatesheetAction, EntityKind, StatusPolicy};
use super::store::{ExamRecord, ExamStore};

static ENTRY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_entry_id() -> EntryId {
    let id = ENTRY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EntryId(format!("entry-{id:06}"))
}

/// Maintains an exam's datesheet. Every entry mutation recomputes conflicts in the same unit.
pub struct DatesheetWorkflow<S> {
    store: Arc<S>,
}

impl<S> DatesheetWorkflow<S>
where
    S: ExamStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the draft datesheet if the exam has none yet.
    pub fn open(&self, scope: &ExamScope) -> Result<Datesheet, ExamError> {
        self.store.transact(scope, |record| {
            Ok(record.datesheet.get_or_insert_with(Datesheet::default).clone())
        })
    }

    pub fn get(&self, scope: &ExamScope) -> Result<Datesheet, ExamError> {
        self.store
            .snapshot(scope)?
            .datesheet
            .ok_or_else(|| ExamError::not_found(EntityKind::Datesheet, &scope.exam_id))
    }

    pub fn add_entry(
        &self,
        scope: &ExamScope,
        draft: EntryDraft,
    ) -> Result<DatesheetEntry, ExamError> {
        self.store.transact(scope, |record| {
            validate_entry(record, &draft)?;
            let datesheet = record.datesheet.get_or_insert_with(Datesheet::default);
            datesheet.status.transition(DatesheetAction::Edit)?;

            let entry = DatesheetEntry::from_draft(next_entry_id(), draft);
            let entry_id = entry.id.clone();
            datesheet.entries.insert(entry_id.clone(), entry);
            recompute(datesheet);

            info!(
                exam = %scope,
                entry = %entry_id,
                conflicts = datesheet.conflict_count,
                "datesheet entry added"
            );
            Ok(datesheet.entries[&entry_id].clone())
        })
    }

    pub fn update_entry(
        &self,
        scope: &ExamScope,
        entry_id: &EntryId,
        draft: EntryDraft,
    ) -> Result<DatesheetEntry, ExamError> {
        self.store.transact(scope, |record| {
            validate_entry(record, &draft)?;
            let datesheet = record.datesheet_mut()?;
            datesheet.status.transition(DatesheetAction::Edit)?;

            let entry = datesheet
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ExamError::not_found(EntityKind::Entry, entry_id))?;
            entry.apply(draft);
            recompute(datesheet);

            info!(
                exam = %scope,
                entry = %entry_id,
                conflicts = datesheet.conflict_count,
                "datesheet entry updated"
            );
            Ok(datesheet.entries[entry_id].clone())
        })
    }

    pub fn delete_entry(
        &self,
        scope: &ExamScope,
        entry_id: &EntryId,
    ) -> Result<ConflictReport, ExamError> {
        self.store.transact(scope, |record| {
            let datesheet = record.datesheet_mut()?;
            datesheet.status.transition(DatesheetAction::Edit)?;

            datesheet
                .entries
                .remove(entry_id)
                .ok_or_else(|| ExamError::not_found(EntityKind::Entry, entry_id))?;
            recompute(datesheet);

            info!(
                exam = %scope,
                entry = %entry_id,
                conflicts = datesheet.conflict_count,
                "datesheet entry deleted"
            );
            Ok(ConflictReport::from_datesheet(datesheet))
        })
    }

    pub fn conflict_report(&self, scope: &ExamScope) -> Result<ConflictReport, ExamError> {
        Ok(ConflictReport::from_datesheet(&self.get(scope)?))
    }

    /// `draft -> published`, refused while any entry is flagged.
    pub fn publish(&self, scope: &ExamScope, now: DateTime<Utc>) -> Result<Datesheet, ExamError> {
        self.store.transact(scope, |record| {
            let datesheet = record.datesheet_mut()?;
            let next = datesheet.status.transition(DatesheetAction::Publish)?;
            if datesheet.conflict_count > 0 {
                let rejected = datesheet
                    .status
                    .refuse(DatesheetAction::Publish)
                    .with_reason(format!(
                        "{} entries have unresolved conflicts",
                        datesheet.conflict_count
                    ));
                return Err(rejected.into());
            }

            datesheet.status = next;
            datesheet.published_at = Some(now);
            info!(exam = %scope, entries = datesheet.entries.len(), "datesheet published");
            Ok(datesheet.clone())
        })
    }

    pub fn archive(&self, scope: &ExamScope) -> Result<Datesheet, ExamError> {
        self.store.transact(scope, |record| {
            let datesheet = record.datesheet_mut()?;
            datesheet.status = datesheet.status.transition(DatesheetAction::Archive)?;
            info!(exam = %scope, "datesheet archived");
            Ok(datesheet.clone())
        })
    }
}

fn recompute(datesheet: &mut Datesheet) {
    let analysis = conflicts::detect(datesheet.entries.values());
    analysis.apply(datesheet);
}

fn validate_entry(record: &ExamRecord, draft: &EntryDraft) -> Result<(), ExamError> {
    if draft.class_id.as_str().trim().is_empty() {
        return Err(ExamError::validation("class_id is required"));
    }
    if draft.subject_id.as_str().trim().is_empty() {
        return Err(ExamError::validation("subject_id is required"));
    }
    if draft.end_time <= draft.start_time {
        return Err(ExamError::validation(format!(
            "end_time {} must be after start_time {}",
            draft.end_time, draft.start_time
        )));
    }
    if !(draft.total_marks.is_finite() && draft.total_marks > 0.0) {
        return Err(ExamError::validation("total_marks must be positive"));
    }
    if !record.exam.covers_class(&draft.class_id) {
        return Err(ExamError::validation(format!(
            "class {} is not part of exam {}",
            draft.class_id, record.exam.id
        )));
    }
    Ok(())
}
