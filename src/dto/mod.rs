pub mod assignment_dto;
pub mod session_dto;
