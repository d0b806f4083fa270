//! Resource double-booking detection for a datesheet.
//!
//! Entries are bucketed per resource dimension by `(resource, exam_date)` and each bucket is
//! swept in start-time order with a min-heap of active end times, so a dimension costs
//! `O(n log n + k)` where `k` is the number of colliding pairs reported.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::hash::Hash;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::domain::{ConflictDetail, ConflictKind, Datesheet, DatesheetEntry, EntryId, SectionId};

/// Per-entry collisions produced by [`detect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictAnalysis {
    collisions: BTreeMap<EntryId, BTreeMap<EntryId, BTreeSet<ConflictKind>>>,
}

impl ConflictAnalysis {
    /// Number of entries with at least one collision (not the number of pairs).
    pub fn conflict_count(&self) -> usize {
        self.collisions.len()
    }

    pub fn is_clean(&self) -> bool {
        self.collisions.is_empty()
    }

    pub fn conflicts_for(
        &self,
        entry_id: &EntryId,
    ) -> Option<&BTreeMap<EntryId, BTreeSet<ConflictKind>>> {
        self.collisions.get(entry_id)
    }

    pub fn collides(&self, a: &EntryId, b: &EntryId) -> bool {
        self.collisions
            .get(a)
            .map(|others| others.contains_key(b))
            .unwrap_or(false)
    }

    /// Write flags, details, and the datesheet-level count.
    pub fn apply(&self, datesheet: &mut Datesheet) {
        for entry in datesheet.entries.values_mut() {
            match self.collisions.get(&entry.id) {
                Some(others) => {
                    entry.has_conflict = true;
                    entry.conflict_details = others
                        .iter()
                        .map(|(entry_id, kinds)| ConflictDetail {
                            entry_id: entry_id.clone(),
                            kinds: kinds.iter().copied().collect(),
                        })
                        .collect();
                }
                None => {
                    entry.has_conflict = false;
                    entry.conflict_details.clear();
                }
            }
        }
        datesheet.conflict_count = self.conflict_count();
    }

    fn record(&mut self, a: &EntryId, b: &EntryId, kind: ConflictKind) {
        self.collisions
            .entry(a.clone())
            .or_default()
            .entry(b.clone())
            .or_default()
            .insert(kind);
        self.collisions
            .entry(b.clone())
            .or_default()
            .entry(a.clone())
            .or_default()
            .insert(kind);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReportItem {
    pub entry_id: EntryId,
    pub conflicts_with: Vec<EntryId>,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflict_count: usize,
    pub conflicts: Vec<ConflictReportItem>,
}

impl ConflictReport {
    /// Build the report from the flags already stored on a datesheet.
    pub fn from_datesheet(datesheet: &Datesheet) -> Self {
        let mut conflicts = Vec::new();
        for entry in datesheet.entries.values().filter(|entry| entry.has_conflict) {
            for kind in ConflictKind::ordered() {
                let conflicts_with: Vec<EntryId> = entry
                    .conflict_details
                    .iter()
                    .filter(|detail| detail.kinds.contains(&kind))
                    .map(|detail| detail.entry_id.clone())
                    .collect();
                if !conflicts_with.is_empty() {
                    conflicts.push(ConflictReportItem {
                        entry_id: entry.id.clone(),
                        conflicts_with,
                        kind,
                    });
                }
            }
        }

        Self {
            conflict_count: datesheet.conflict_count,
            conflicts,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    id: &'a EntryId,
    start: NaiveTime,
    end: NaiveTime,
    section: Option<&'a SectionId>,
}

/// Find every pair of entries that double-books a room, a member of staff, or a class/section.
pub fn detect<'a, I>(entries: I) -> ConflictAnalysis
where
    I: IntoIterator<Item = &'a DatesheetEntry>,
{
    let entries: Vec<&DatesheetEntry> = entries.into_iter().collect();
    let mut analysis = ConflictAnalysis::default();

    sweep_dimension(
        &entries,
        ConflictKind::Room,
        |entry| entry.room_id.as_ref(),
        &mut analysis,
    );
    sweep_dimension(
        &entries,
        ConflictKind::Supervisor,
        |entry| entry.supervisor_id.as_ref(),
        &mut analysis,
    );
    sweep_dimension(
        &entries,
        ConflictKind::Invigilator,
        |entry| entry.invigilator_id.as_ref(),
        &mut analysis,
    );
    sweep_dimension(
        &entries,
        ConflictKind::ClassSection,
        |entry| Some(&entry.class_id),
        &mut analysis,
    );

    analysis
}

fn sweep_dimension<'a, K, F>(
    entries: &[&'a DatesheetEntry],
    kind: ConflictKind,
    resource: F,
    analysis: &mut ConflictAnalysis,
) where
    K: Hash + Eq + 'a,
    F: Fn(&'a DatesheetEntry) -> Option<&'a K>,
{
    let mut buckets: HashMap<(&'a K, NaiveDate), Vec<Slot<'a>>> = HashMap::new();
    for &entry in entries {
        let Some(key) = resource(entry) else {
            continue;
        };
        buckets
            .entry((key, entry.exam_date))
            .or_default()
            .push(Slot {
                id: &entry.id,
                start: entry.start_time,
                end: entry.end_time,
                section: entry.section_id.as_ref(),
            });
    }

    for slots in buckets.values_mut() {
        if slots.len() < 2 {
            continue;
        }
        sweep(slots, kind, analysis);
    }
}

fn sweep(slots: &mut [Slot<'_>], kind: ConflictKind, analysis: &mut ConflictAnalysis) {
    slots.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(b.id)));

    let mut active: BinaryHeap<Reverse<(NaiveTime, usize)>> = BinaryHeap::new();
    for (index, slot) in slots.iter().enumerate() {
        while active
            .peek()
            .is_some_and(|Reverse((end, _))| *end <= slot.start)
        {
            active.pop();
        }

        for Reverse((_, other)) in active.iter() {
            let other = &slots[*other];
            if kind == ConflictKind::ClassSection
                && !sections_compatible(other.section, slot.section)
            {
                continue;
            }
            analysis.record(other.id, slot.id, kind);
        }

        active.push(Reverse((slot.end, index)));
    }
}

/// A class-wide sitting (no section) occupies every section of the class.
fn sections_compatible(a: Option<&SectionId>, b: Option<&SectionId>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
