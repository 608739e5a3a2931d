use std::sync::Arc;

use lms_core::model::{Certificate, EnrollmentId, NewCertificate, Principal};
use storage::repository::{CertificateRepository, EnrollmentRepository, StorageError};
use tracing::info;

use crate::Clock;
use crate::authz::require_self;
use crate::collaborators::CertificateRenderer;
use crate::error::{OrNotFound, ServiceError};

/// Issues the single certificate of a completed enrollment.
#[derive(Clone)]
pub struct CertificateService {
    clock: Clock,
    enrollments: Arc<dyn EnrollmentRepository>,
    certificates: Arc<dyn CertificateRepository>,
    renderer: Arc<dyn CertificateRenderer>,
}

impl CertificateService {
    #[must_use]
    pub fn new(
        clock: Clock,
        enrollments: Arc<dyn EnrollmentRepository>,
        certificates: Arc<dyn CertificateRepository>,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> Self {
        Self {
            clock,
            enrollments,
            certificates,
            renderer,
        }
    }

    /// Issue the certificate, or return the one already issued.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` while the enrollment is incomplete,
    /// `Forbidden` for callers other than the student or an admin, and
    /// `Collaborator` if rendering fails.
    pub async fn issue_certificate(
        &self,
        principal: &Principal,
        enrollment_id: EnrollmentId,
    ) -> Result<Certificate, ServiceError> {
        let enrollment = self
            .enrollments
            .get_enrollment(enrollment_id)
            .await
            .or_not_found("enrollment", enrollment_id.value())?;
        require_self(principal, enrollment.student)?;

        if let Some(existing) = self.certificates.find_certificate(enrollment_id).await? {
            return Ok(existing);
        }
        if !enrollment.completed {
            return Err(ServiceError::Validation(format!(
                "enrollment {enrollment_id} is at {}%, certificates need 100%",
                enrollment.progress
            )));
        }

        let mut draft = NewCertificate::issue(enrollment_id, self.clock.now());
        draft.certificate_url = self.renderer.render(&draft).await?;
        match self.certificates.insert_certificate(draft).await {
            Ok(certificate) => {
                info!(
                    enrollment = %enrollment_id,
                    serial = %certificate.serial,
                    "certificate issued"
                );
                Ok(certificate)
            }
            Err(StorageError::Conflict) => self
                .certificates
                .find_certificate(enrollment_id)
                .await?
                .ok_or(ServiceError::Storage(StorageError::Conflict)),
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` for callers other than the student or an admin.
    pub async fn get_certificate(
        &self,
        principal: &Principal,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Certificate>, ServiceError> {
        let enrollment = self
            .enrollments
            .get_enrollment(enrollment_id)
            .await
            .or_not_found("enrollment", enrollment_id.value())?;
        require_self(principal, enrollment.student)?;
        Ok(self.certificates.find_certificate(enrollment_id).await?)
    }
}
