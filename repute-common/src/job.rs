use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::SenderIdentity;

/// Lifecycle state of an [`EmailJob`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Sent,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// One unit of dispatch work
///
/// The `html` body is final: any link rewriting happens before the job is
/// created. The provenance fields (`owner_id`, `campaign_id`,
/// `recipient_list_id`) are carried through untouched and never inspected by
/// the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub assigned_subdomain: String,
    #[serde(default, rename = "assignedIP")]
    pub assigned_ip: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_list_id: Option<String>,
}

impl EmailJob {
    /// Create a new queued job with a freshly generated ULID
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            recipient: recipient.into(),
            subject: subject.into(),
            html: html.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    #[must_use]
    pub fn with_campaign(
        mut self,
        campaign_id: impl Into<String>,
        recipient_list_id: impl Into<String>,
    ) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self.recipient_list_id = Some(recipient_list_id.into());
        self
    }

    /// Record the identity this job will be sent through
    pub fn assign(&mut self, identity: &SenderIdentity) {
        self.assigned_subdomain.clone_from(&identity.subdomain);
        self.assigned_ip.clone_from(&identity.ip);
    }

    /// Whether an identity has been assigned to this job
    #[inline]
    pub fn is_assigned(&self) -> bool {
        !self.assigned_subdomain.is_empty() && !self.assigned_ip.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn new_job_is_queued_and_unassigned() {
        let job = EmailJob::new("user@example.org", "Hello", "<p>Hi</p>");

        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.is_assigned());
        assert_eq!(job.id.len(), 26);
    }

    #[test]
    fn assignment_copies_identity_key() {
        let mut job = EmailJob::new("user@example.org", "Hello", "<p>Hi</p>");
        job.assign(&SenderIdentity::seeded("mail2.example.com", "192.0.2.7"));

        assert!(job.is_assigned());
        assert_eq!(job.assigned_subdomain, "mail2.example.com");
        assert_eq!(job.assigned_ip, "192.0.2.7");
    }

    #[test]
    fn payload_field_names() {
        let job = EmailJob::new("user@example.org", "Hello", "<p>Hi</p>").with_owner("owner");
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["status"], "queued");
        assert_eq!(json["assignedIP"], "");
        assert_eq!(json["ownerId"], "owner");
        assert!(json.get("campaignId").is_none());
    }

    #[test]
    fn decodes_minimal_payload() {
        let job: EmailJob = serde_json::from_str(
            r#"{"id":"abc","recipient":"user@example.org","subject":"s","html":"h"}"#,
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.assigned_subdomain, "");
        assert_eq!(job.campaign_id, None);
    }
}
