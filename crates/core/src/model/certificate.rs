use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::model::ids::{CertificateId, EnrollmentId};

/// Proof of completion, issued at most once per enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub enrollment_id: EnrollmentId,
    pub serial: Uuid,
    pub issued_at: DateTime<Utc>,
    pub certificate_url: Option<Url>,
}

/// Certificate data before storage assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCertificate {
    pub enrollment_id: EnrollmentId,
    pub serial: Uuid,
    pub issued_at: DateTime<Utc>,
    pub certificate_url: Option<Url>,
}

impl NewCertificate {
    #[must_use]
    pub fn issue(enrollment_id: EnrollmentId, issued_at: DateTime<Utc>) -> Self {
        Self {
            enrollment_id,
            serial: Uuid::new_v4(),
            issued_at,
            certificate_url: None,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: CertificateId) -> Certificate {
        Certificate {
            id,
            enrollment_id: self.enrollment_id,
            serial: self.serial,
            issued_at: self.issued_at,
            certificate_url: self.certificate_url,
        }
    }
}
