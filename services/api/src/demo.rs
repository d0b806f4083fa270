use crate::infra::build_service;
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Args;
use exam_lifecycle::config::ExamConfig;
use exam_lifecycle::error::AppError;
use exam_lifecycle::workflows::exam::{
    Checklist, ClassId, ConflictReport, EntryDraft, ExamError, ExamResult, MarkInput,
    MarkSelection, NewExam, PublishOutcome, QuestionDraft, RoomId, SchoolId, SectionId, StaffId,
    StudentId, StudentRef, SubjectId,
};
use serde::Serialize;

const CLASS: &str = "8";
const SESSION: &str = "2024-25";
const SUBJECTS: [(&str, f64, f64); 2] = [("math", 60.0, 40.0), ("science", 50.0, 50.0)];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of students to enrol in the demo class
    #[arg(long, default_value_t = 6)]
    pub(crate) students: usize,
    /// Print the final summary as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    initial_conflicts: ConflictReport,
    checklist_before_verification: Checklist,
    results: Vec<ExamResult>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    if args.students == 0 {
        return Err(ExamError::validation("the demo needs at least one student").into());
    }

    let (service, directory) = build_service(&ExamConfig::default());
    let school = SchoolId::from("demo-school");
    let scope = service
        .create_exam(
            school.clone(),
            NewExam {
                exam_id: Some("mid-term".to_string()),
                name: "Mid Term".to_string(),
                session: SESSION.to_string(),
                class_ids: vec![ClassId::from(CLASS)],
            },
        )?
        .scope();

    let students: Vec<StudentRef> = (1..=args.students)
        .map(|n| StudentRef {
            id: StudentId::new(format!("stu-{n:02}")),
            class_id: ClassId::from(CLASS),
            section_id: Some(section_for(n)),
            session: SESSION.to_string(),
            active: true,
        })
        .collect();
    for student in &students {
        directory
            .enroll(&school, student.clone())
            .map_err(ExamError::from)?;
    }

    let datesheets = service.datesheets();
    datesheets.add_entry(&scope, entry("math", "A", "R1", 9))?;
    let clash = datesheets.add_entry(&scope, entry("science", "B", "R1", 10))?;
    let initial_conflicts = datesheets.conflict_report(&scope)?;
    if !args.json {
        println!("Datesheet draft: {} conflicting entries", initial_conflicts.conflict_count);
        for item in &initial_conflicts.conflicts {
            println!(
                "  {} clashes with {:?} ({})",
                item.entry_id,
                item.conflicts_with,
                item.kind.label()
            );
        }
    }
    datesheets.update_entry(&scope, &clash.id, entry("science", "B", "R2", 10))?;
    let datesheet = datesheets.publish(&scope, Utc::now())?;
    if !args.json {
        println!("Datesheet published with {} entries", datesheet.entries.len());
    }

    let papers = service.papers();
    for (subject, part_a, part_b) in SUBJECTS {
        let paper = papers.create(&scope, ClassId::from(CLASS), SubjectId::from(subject))?;
        papers.add_question(&scope, &paper.id, question("Part A", part_a))?;
        papers.add_question(&scope, &paper.id, question("Part B", part_b))?;
        papers.submit(&scope, &paper.id)?;
        papers.approve(&scope, &paper.id, StaffId::from("principal"), None)?;
    }

    let marks = service.marks();
    for (index, student) in students.iter().enumerate() {
        for (subject, _, _) in SUBJECTS {
            marks.record(&scope, mark(student, subject, index))?;
        }
    }

    let checklist_before_verification = service.readiness().evaluate(&scope)?;
    if !args.json {
        println!("Readiness before verification: {}", checklist_before_verification.summary());
    }

    let selection = MarkSelection {
        classes: vec![ClassId::from(CLASS)],
        subjects: SUBJECTS
            .iter()
            .map(|(subject, _, _)| SubjectId::from(*subject))
            .collect(),
        sections: Vec::new(),
    };
    marks.submit_marks(&scope, &selection)?;
    marks.verify_marks(&scope, &selection, StaffId::from("hod"))?;

    let results = service.results();
    loop {
        match results.publish(&scope)? {
            PublishOutcome::AlreadyPublished { published_at } => {
                if !args.json {
                    println!("Results published at {published_at}");
                }
                break;
            }
            PublishOutcome::Generating { job_id } | PublishOutcome::Publishing { job_id } => {
                results.drain_queue(Utc::now())?;
                let ticket = results.job_status(&scope, &job_id)?;
                if !args.json {
                    println!(
                        "{} job {} finished ({} processed)",
                        ticket.kind.label(),
                        job_id,
                        ticket.status.processed_jobs
                    );
                }
            }
        }
    }

    let mut published: Vec<ExamResult> = service.exam(&scope)?.results.into_values().collect();
    published.sort_by(|a, b| {
        a.rank_in_class
            .cmp(&b.rank_in_class)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    if args.json {
        let summary = DemoSummary {
            initial_conflicts,
            checklist_before_verification,
            results: published,
        };
        let rendered = serde_json::to_string_pretty(&summary).map_err(ExamError::from)?;
        println!("{rendered}");
        return Ok(());
    }

    println!("\nRank  Student  Obtained  Percentage  Grade");
    for result in &published {
        println!(
            "{:>4}  {:<7}  {:>8.1}  {:>9.2}%  {}",
            result.rank_in_class,
            result.student_id,
            result.total_obtained,
            result.percentage,
            result.grade
        );
    }
    Ok(())
}

fn section_for(n: usize) -> SectionId {
    if n % 2 == 1 {
        SectionId::from("A")
    } else {
        SectionId::from("B")
    }
}

fn entry(subject: &str, section: &str, room: &str, start_hour: u32) -> EntryDraft {
    EntryDraft {
        class_id: ClassId::from(CLASS),
        section_id: Some(SectionId::from(section)),
        subject_id: SubjectId::from(subject),
        exam_date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap_or_default(),
        start_time: NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap_or_default(),
        end_time: NaiveTime::from_hms_opt(start_hour + 2, 0, 0).unwrap_or_default(),
        room_id: Some(RoomId::from(room)),
        supervisor_id: None,
        invigilator_id: None,
        total_marks: 100.0,
    }
}

fn question(prompt: &str, marks: f64) -> QuestionDraft {
    QuestionDraft {
        prompt: prompt.to_string(),
        marks,
    }
}

/// Deterministic spread of scores so ranks and grades vary.
fn mark(student: &StudentRef, subject: &str, index: usize) -> MarkInput {
    let spread = if subject == "math" {
        (index * 17) % 55
    } else {
        (index * 23) % 60
    };
    MarkInput {
        class_id: student.class_id.clone(),
        section_id: student.section_id.clone(),
        subject_id: SubjectId::from(subject),
        student_id: student.id.clone(),
        marks_obtained: 40.0 + spread as f64,
        is_absent: false,
    }
}
