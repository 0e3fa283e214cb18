pub mod answer;
pub mod eligibility;
pub mod payment;
pub mod question;
pub mod student;
pub mod student_status;
pub mod terms_acceptance;
pub mod test_attempt;
