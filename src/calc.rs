use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

/// Five-point scale. Unknown grades score zero but their units still count.
pub fn grade_point(grade: &str) -> u32 {
    match grade.trim().to_ascii_uppercase().as_str() {
        "A" => 5,
        "B" => 4,
        "C" => 3,
        "D" => 2,
        "E" => 1,
        _ => 0,
    }
}

/// Half away from zero, two decimals.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedCourse {
    pub grade: String,
    pub unit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterCourses {
    pub semester_id: String,
    pub name: String,
    pub courses: Vec<GradedCourse>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedTotals {
    pub grade_points: f64,
    pub units: i64,
}

impl WeightedTotals {
    fn add(&mut self, course: &GradedCourse) {
        self.grade_points += f64::from(grade_point(&course.grade)) * course.unit as f64;
        self.units = self.units.saturating_add(course.unit);
    }

    fn merge(&mut self, other: WeightedTotals) {
        self.grade_points += other.grade_points;
        self.units = self.units.saturating_add(other.units);
    }

    pub fn average(&self) -> f64 {
        if self.units > 0 {
            self.grade_points / self.units as f64
        } else {
            0.0
        }
    }
}

pub fn totals<'a, I>(courses: I) -> WeightedTotals
where
    I: IntoIterator<Item = &'a GradedCourse>,
{
    let mut t = WeightedTotals::default();
    for c in courses {
        t.add(c);
    }
    t
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGpa {
    pub semester_id: String,
    pub name: String,
    pub gpa: f64,
    pub units: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CgpaSummary {
    pub cgpa: f64,
    pub total_credits: i64,
    pub semester_count: usize,
    pub previous_cgpa: Option<f64>,
    pub change: f64,
    pub semesters: Vec<SemesterGpa>,
}

/// `semesters` must be in creation order; the last one is treated as most recent.
pub fn cgpa_summary(semesters: &[SemesterCourses]) -> CgpaSummary {
    let per_semester: Vec<WeightedTotals> =
        semesters.iter().map(|s| totals(&s.courses)).collect();

    let mut all = WeightedTotals::default();
    for t in &per_semester {
        all.merge(*t);
    }
    let cgpa = all.average();

    let previous = if per_semester.len() >= 2 {
        let mut prev = WeightedTotals::default();
        for t in &per_semester[..per_semester.len() - 1] {
            prev.merge(*t);
        }
        Some(prev.average())
    } else {
        None
    };
    let change = previous.map(|p| cgpa - p).unwrap_or(0.0);

    CgpaSummary {
        cgpa: round_2_decimals(cgpa),
        total_credits: all.units,
        semester_count: semesters.len(),
        previous_cgpa: previous.map(round_2_decimals),
        change: round_2_decimals(change),
        semesters: semesters
            .iter()
            .zip(per_semester.iter())
            .map(|(s, t)| SemesterGpa {
                semester_id: s.semester_id.clone(),
                name: s.name.clone(),
                gpa: round_2_decimals(t.average()),
                units: t.units,
            })
            .collect(),
    }
}

pub fn load_user_semesters(
    conn: &Connection,
    user_id: &str,
) -> rusqlite::Result<Vec<SemesterCourses>> {
    let mut sem_stmt = conn.prepare(
        "SELECT id, name FROM semesters WHERE user_id = ? ORDER BY sort_order",
    )?;
    let mut semesters = sem_stmt
        .query_map([user_id], |r| {
            Ok(SemesterCourses {
                semester_id: r.get(0)?,
                name: r.get(1)?,
                courses: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut course_stmt = conn.prepare(
        "SELECT semester_id, grade, unit
         FROM semester_courses
         WHERE user_id = ?
         ORDER BY sort_order",
    )?;
    let mut by_semester: HashMap<String, Vec<GradedCourse>> = HashMap::new();
    let rows = course_stmt.query_map([user_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            GradedCourse {
                grade: r.get(1)?,
                unit: r.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (semester_id, course) = row?;
        by_semester.entry(semester_id).or_default().push(course);
    }

    for s in semesters.iter_mut() {
        s.courses = by_semester.remove(&s.semester_id).unwrap_or_default();
    }
    Ok(semesters)
}
