use crate::{
    directory::{
        directory_models::{Participant, Profile},
        directory_repository::ProfileRepository,
    },
    error::{AppError, Result},
    websocket::PresenceRegistry,
};
use uuid::Uuid;

/// Read-only participant directory with online status.
#[derive(Clone)]
pub struct DirectoryService {
    repo: ProfileRepository,
    presence: PresenceRegistry,
}

impl DirectoryService {
    pub fn new(repo: ProfileRepository, presence: PresenceRegistry) -> Self {
        Self { repo, presence }
    }

    pub async fn participants(
        &self,
        role: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Participant>> {
        let profiles = self.repo.list(role, search).await?;
        Ok(annotate(profiles, &self.presence))
    }

    pub async fn participant(&self, id: Uuid) -> Result<Participant> {
        let profile = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Participant not found".into()))?;

        Ok(to_participant(profile, &self.presence))
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.repo.find_by_id(id).await?.is_some())
    }
}

fn to_participant(profile: Profile, presence: &PresenceRegistry) -> Participant {
    Participant {
        online: presence.is_online(&profile.id),
        id: profile.id,
        display_name: profile.full_name,
        role: profile.role,
    }
}

fn annotate(profiles: Vec<Profile>, presence: &PresenceRegistry) -> Vec<Participant> {
    profiles
        .into_iter()
        .map(|profile| to_participant(profile, presence))
        .collect()
}
