//! Directory lookups and invitation persistence on the platform document store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::{PlatformClient, PlatformError, QueryOptions};
use crate::config::SchemaConfig;
use crate::types::{ConnectionProfile, DonorRecord, HospitalProfile, InvitationRecord};

/// Read-only hospital/donor directory.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn hospital(&self, hospital_id: &str) -> Result<HospitalProfile, PlatformError>;

    async fn donor(&self, donor_id: &str) -> Result<DonorRecord, PlatformError>;

    /// Connected contact profiles, in the order the platform returns them.
    async fn connection_profiles(
        &self,
        donor_id: &str,
    ) -> Result<Vec<ConnectionProfile>, PlatformError>;
}

/// Invitation documents. Saving an existing `invitation_id` overwrites it.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn save_invitation(
        &self,
        record: &InvitationRecord,
    ) -> Result<InvitationRecord, PlatformError>;

    async fn invitation(&self, invitation_id: &str) -> Result<InvitationRecord, PlatformError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Lookup<'a> {
    #[serde(rename = "id")]
    Id(&'a str),
    DonorId(&'a str),
    InvitationId(&'a str),
}

/// HTTP-backed directory and invitation store.
pub struct HttpDocumentStore {
    client: Arc<PlatformClient>,
    schemas: SchemaConfig,
}

impl HttpDocumentStore {
    pub fn new(client: Arc<PlatformClient>, schemas: SchemaConfig) -> Self {
        Self { client, schemas }
    }

    async fn find_one<T>(
        &self,
        schema: &str,
        lookup: Lookup<'_>,
        kind: &'static str,
        id: &str,
    ) -> Result<T, PlatformError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut docs: Vec<T> = self
            .client
            .query_documents(schema, &lookup, &QueryOptions::first())
            .await?;
        if docs.is_empty() {
            return Err(PlatformError::DocumentNotFound {
                kind,
                id: id.to_string(),
            });
        }
        Ok(docs.swap_remove(0))
    }
}

#[async_trait]
impl DirectoryPort for HttpDocumentStore {
    async fn hospital(&self, hospital_id: &str) -> Result<HospitalProfile, PlatformError> {
        self.find_one(
            &self.schemas.hospital,
            Lookup::Id(hospital_id),
            "hospital",
            hospital_id,
        )
        .await
    }

    async fn donor(&self, donor_id: &str) -> Result<DonorRecord, PlatformError> {
        self.find_one(&self.schemas.donor, Lookup::Id(donor_id), "donor", donor_id)
            .await
    }

    async fn connection_profiles(
        &self,
        donor_id: &str,
    ) -> Result<Vec<ConnectionProfile>, PlatformError> {
        self.client
            .query_documents(
                &self.schemas.connection_profile,
                &Lookup::DonorId(donor_id),
                &QueryOptions::default(),
            )
            .await
    }
}

#[async_trait]
impl InvitationStore for HttpDocumentStore {
    async fn save_invitation(
        &self,
        record: &InvitationRecord,
    ) -> Result<InvitationRecord, PlatformError> {
        let saved = self
            .client
            .save_document(&self.schemas.invitation, record)
            .await?;
        if saved.invitation_id.is_empty() {
            return Err(PlatformError::InvalidResponse(
                "saved invitation has no id".to_string(),
            ));
        }
        Ok(saved)
    }

    async fn invitation(&self, invitation_id: &str) -> Result<InvitationRecord, PlatformError> {
        self.find_one(
            &self.schemas.invitation,
            Lookup::InvitationId(invitation_id),
            "invitation",
            invitation_id,
        )
        .await
    }
}
