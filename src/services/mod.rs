pub mod attempt_service;
pub mod eligibility_service;
pub mod grading_service;
pub mod notification_service;
pub mod payment_service;
pub mod student_service;
