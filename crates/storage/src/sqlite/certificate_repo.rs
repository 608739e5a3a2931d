use lms_core::model::{Certificate, CertificateId, EnrollmentId, NewCertificate};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_certificate_row};
use crate::repository::{CertificateRepository, StorageError};

#[async_trait::async_trait]
impl CertificateRepository for SqliteRepository {
    async fn insert_certificate(
        &self,
        certificate: NewCertificate,
    ) -> Result<Certificate, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO certificates (enrollment_id, serial, issued_at, certificate_url)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("enrollment_id", certificate.enrollment_id.value())?)
        .bind(certificate.serial.to_string())
        .bind(certificate.issued_at)
        .bind(certificate.certificate_url.as_ref().map(url::Url::as_str))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("certificate_id sign overflow".into()))?;
        Ok(certificate.assign_id(CertificateId::new(id)))
    }

    async fn find_certificate(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError> {
        sqlx::query(
            r"
            SELECT id, enrollment_id, serial, issued_at, certificate_url
            FROM certificates
            WHERE enrollment_id = ?1
            ",
        )
        .bind(id_i64("enrollment_id", enrollment.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(map_certificate_row)
        .transpose()
    }
}
