pub mod assignment_service;
pub mod session_loader;
