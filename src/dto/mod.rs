pub mod admin_dto;
pub mod attempt_dto;
pub mod auth_dto;
pub mod payment_dto;
pub mod student_dto;
