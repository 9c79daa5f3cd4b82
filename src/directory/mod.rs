pub mod directory_handlers;
pub mod directory_models;
pub mod directory_repository;
pub mod directory_service;

pub use directory_handlers::{get_participant, list_participants};
pub use directory_models::{Participant, Profile, ProfileResponse, Role};
pub use directory_repository::ProfileRepository;
pub use directory_service::DirectoryService;
