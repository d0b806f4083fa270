use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use super::directory::StudentRef;
use super::domain::{ClassId, ExamResult, JobId, ResultStatus, SectionId, StudentId, SubjectId};
use super::error::ExamError;
use super::readiness::papers_by_subject;
use super::store::ExamRecord;

/// Minimum percentage required for a grade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeBand {
    pub grade: String,
    pub min_percentage: f64,
}

/// Ordered grade bands; percentages below every band receive the fallback grade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingScale {
    bands: Vec<GradeBand>,
    fallback: String,
}

impl Default for GradingScale {
    fn default() -> Self {
        let bands = [
            ("A+", 90.0),
            ("A", 80.0),
            ("B", 70.0),
            ("C", 60.0),
            ("D", 50.0),
            ("E", 40.0),
        ]
        .into_iter()
        .map(|(grade, min_percentage)| GradeBand {
            grade: grade.to_string(),
            min_percentage,
        })
        .collect();

        Self {
            bands,
            fallback: "F".to_string(),
        }
    }
}

impl GradingScale {
    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn grade(&self, percentage: f64) -> &str {
        self.bands
            .iter()
            .find(|band| percentage >= band.min_percentage)
            .map_or(self.fallback.as_str(), |band| band.grade.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GradingScaleError {
    #[error("grading scale has no bands")]
    Empty,
    #[error("grade band '{0}' must look like GRADE:MIN")]
    MalformedBand(String),
    #[error("grade band '{0}' needs a percentage between 0 and 100")]
    InvalidThreshold(String),
}

impl FromStr for GradingScale {
    type Err = GradingScaleError;

    /// Parses `A+:90,A:80,B:70`. A band without a threshold (`F`) names the fallback grade.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut bands = Vec::new();
        let mut fallback = None;

        for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
            let Some((grade, threshold)) = raw.split_once(':') else {
                fallback = Some(raw.to_string());
                continue;
            };
            let grade = grade.trim();
            if grade.is_empty() {
                return Err(GradingScaleError::MalformedBand(raw.to_string()));
            }
            let min_percentage = threshold
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|min| (0.0..=100.0).contains(min))
                .ok_or_else(|| GradingScaleError::InvalidThreshold(raw.to_string()))?;
            bands.push(GradeBand {
                grade: grade.to_string(),
                min_percentage,
            });
        }

        if bands.is_empty() {
            return Err(GradingScaleError::Empty);
        }
        bands.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));

        Ok(Self {
            bands,
            fallback: fallback.unwrap_or_else(|| "F".to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
struct SubjectLine<'a> {
    subject_id: &'a SubjectId,
    marks_obtained: f64,
    total_marks: f64,
    is_absent: bool,
}

#[derive(Debug, Serialize)]
struct ResultSnapshot<'a> {
    student_id: &'a StudentId,
    class_id: &'a ClassId,
    section_id: Option<&'a SectionId>,
    session: &'a str,
    subjects: Vec<SubjectLine<'a>>,
    total_obtained: f64,
    total_marks: f64,
    percentage: f64,
    grade: &'a str,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute one provisional result per scoped student from verified and locked marks.
///
/// Rows are returned in student id order with class ranks assigned.
pub fn compute(
    record: &ExamRecord,
    students: &[StudentRef],
    scale: &GradingScale,
    job_id: &JobId,
) -> Result<Vec<ExamResult>, ExamError> {
    let papers = papers_by_subject(record);
    let entry_totals: BTreeMap<(&ClassId, &SubjectId), f64> = record
        .datesheet
        .iter()
        .flat_map(|datesheet| datesheet.entries.values())
        .map(|entry| ((&entry.class_id, &entry.subject_id), entry.total_marks))
        .collect();

    let mut results = Vec::with_capacity(students.len());
    for student in students {
        if !record.exam.covers_class(&student.class_id) {
            continue;
        }

        let mut subjects: Vec<SubjectLine<'_>> = record
            .marks
            .values()
            .filter(|mark| mark.student_id == student.id && mark.status.is_verified())
            .map(|mark| {
                let key = (&mark.class_id, &mark.subject_id);
                let total_marks = papers
                    .get(&key)
                    .map(|paper| paper.total_marks)
                    .or_else(|| entry_totals.get(&key).copied())
                    .unwrap_or(0.0);
                SubjectLine {
                    subject_id: &mark.subject_id,
                    marks_obtained: if mark.is_absent {
                        0.0
                    } else {
                        mark.marks_obtained
                    },
                    total_marks,
                    is_absent: mark.is_absent,
                }
            })
            .collect();
        subjects.sort_by(|a, b| a.subject_id.cmp(b.subject_id));

        let total_obtained = subjects
            .iter()
            .fold(0.0, |acc, line| acc + line.marks_obtained);
        let total_marks = subjects
            .iter()
            .fold(0.0, |acc, line| acc + line.total_marks);
        let percentage = if total_marks > 0.0 {
            round2(total_obtained / total_marks * 100.0)
        } else {
            0.0
        };
        let grade = scale.grade(percentage);

        let snapshot = serde_json::to_value(ResultSnapshot {
            student_id: &student.id,
            class_id: &student.class_id,
            section_id: student.section_id.as_ref(),
            session: &record.exam.session,
            subjects,
            total_obtained,
            total_marks,
            percentage,
            grade,
        })?;

        results.push(ExamResult {
            student_id: student.id.clone(),
            class_id: student.class_id.clone(),
            total_obtained,
            total_marks,
            percentage,
            grade: grade.to_string(),
            rank_in_class: 0,
            result_snapshot_json: snapshot,
            status: ResultStatus::Provisional,
            generated_by_job: Some(job_id.clone()),
            published_at: None,
        });
    }

    assign_ranks(&mut results);
    results.sort_by(|a, b| a.student_id.cmp(&b.student_id));
    Ok(results)
}

/// Whether the stored provisional rows still match what the marks, papers and roster
/// produce now. Missing rows count as stale.
pub fn provisional_is_current(
    record: &ExamRecord,
    students: &[StudentRef],
    scale: &GradingScale,
) -> Result<bool, ExamError> {
    let stored: Vec<&ExamResult> = record
        .results
        .values()
        .filter(|result| result.is_provisional())
        .collect();
    if stored.is_empty() {
        return Ok(false);
    }

    let recheck = JobId::from("recheck");
    let fresh: Vec<ExamResult> = compute(record, students, scale, &recheck)?
        .into_iter()
        .filter(|result| {
            record
                .results
                .get(&result.student_id)
                .map_or(true, ExamResult::is_provisional)
        })
        .collect();

    Ok(fresh.len() == stored.len()
        && fresh
            .iter()
            .zip(stored)
            .all(|(fresh, stored)| fresh.same_figures(stored)))
}

/// Competition ranking ("1224") by percentage within each class.
fn assign_ranks(results: &mut [ExamResult]) {
    results.sort_by(|a, b| {
        a.class_id
            .cmp(&b.class_id)
            .then_with(|| b.percentage.total_cmp(&a.percentage))
    });

    let mut previous: Option<(ClassId, f64)> = None;
    let mut position = 0u32;
    let mut rank = 0u32;
    for result in results.iter_mut() {
        let same_class = previous
            .as_ref()
            .is_some_and(|(class_id, _)| *class_id == result.class_id);
        position = if same_class { position + 1 } else { 1 };

        let tied = same_class
            && previous.as_ref().is_some_and(|(_, percentage)| {
                percentage.total_cmp(&result.percentage) == Ordering::Equal
            });
        if !tied {
            rank = position;
        }
        result.rank_in_class = rank;
        previous = Some((result.class_id.clone(), result.percentage));
    }
}
