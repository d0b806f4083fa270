use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::domain::{ClassId, SchoolId, SectionId, StudentId};

/// Enrolment as reported by the student directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRef {
    pub id: StudentId,
    pub class_id: ClassId,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    pub session: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Read-only view over the school's student records.
pub trait StudentDirectory: Send + Sync {
    /// Active students enrolled in any of `classes` for `session`.
    fn active_students(
        &self,
        school_id: &SchoolId,
        classes: &[ClassId],
        session: &str,
    ) -> Result<Vec<StudentRef>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("student directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStudentDirectory {
    students: Arc<RwLock<HashMap<SchoolId, Vec<StudentRef>>>>,
}

impl InMemoryStudentDirectory {
    pub fn enroll(&self, school_id: &SchoolId, student: StudentRef) -> Result<(), DirectoryError> {
        let mut guard = self
            .students
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;
        let roster = guard.entry(school_id.clone()).or_default();
        roster.retain(|existing| existing.id != student.id);
        roster.push(student);
        Ok(())
    }
}

impl StudentDirectory for InMemoryStudentDirectory {
    fn active_students(
        &self,
        school_id: &SchoolId,
        classes: &[ClassId],
        session: &str,
    ) -> Result<Vec<StudentRef>, DirectoryError> {
        let guard = self
            .students
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;
        let mut students: Vec<StudentRef> = guard
            .get(school_id)
            .map(|roster| {
                roster
                    .iter()
                    .filter(|student| {
                        student.active
                            && student.session == session
                            && classes.contains(&student.class_id)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        students.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(students)
    }
}
