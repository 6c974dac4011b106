pub mod auth;
pub mod core;
pub mod courses;
pub mod discussions;
pub mod group_timetable;
pub mod resources;
pub mod semesters;
pub mod study_groups;
pub mod timetable;
