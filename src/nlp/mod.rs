pub mod language;
pub mod resume;

pub use language::detect_language;
pub use resume::{is_salary_question, resume_filename, ResumeRule, SalaryExpectations};
