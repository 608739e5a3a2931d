use lms_core::model::{Course, Principal, Role, UserId};

use crate::error::ServiceError;

/// Content edits need an instructor of the course or an admin.
pub(crate) fn require_editor(principal: &Principal, course: &Course) -> Result<(), ServiceError> {
    if principal.can_edit(course) {
        return Ok(());
    }
    Err(ServiceError::Forbidden(format!(
        "user {} cannot edit course {}",
        principal.user_id,
        course.id()
    )))
}

/// Course creation is open to instructors and admins.
pub(crate) fn require_author(principal: &Principal) -> Result<(), ServiceError> {
    match principal.role {
        Role::Instructor | Role::Admin => Ok(()),
        Role::Student => Err(ServiceError::Forbidden(format!(
            "user {} cannot create courses",
            principal.user_id
        ))),
    }
}

/// Students act on their own records; admins may act for anyone.
pub(crate) fn require_self(principal: &Principal, student: UserId) -> Result<(), ServiceError> {
    if principal.user_id == student || principal.is_admin() {
        return Ok(());
    }
    Err(ServiceError::Forbidden(format!(
        "user {} cannot act for user {student}",
        principal.user_id
    )))
}

/// Reading a student's records: the student, staff of the course, or an admin.
pub(crate) fn require_reader(
    principal: &Principal,
    student: UserId,
    course: &Course,
) -> Result<(), ServiceError> {
    if principal.user_id == student || principal.bypasses_gates(course) {
        return Ok(());
    }
    Err(ServiceError::Forbidden(format!(
        "user {} cannot read records of user {student}",
        principal.user_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::CourseId;
    use lms_core::time::fixed_now;

    fn course() -> Course {
        Course::new(CourseId::new(1), "Rust", "", UserId::new(10), fixed_now()).unwrap()
    }

    #[test]
    fn only_course_staff_edit() {
        let course = course();
        assert!(require_editor(&Principal::instructor(UserId::new(10)), &course).is_ok());
        assert!(require_editor(&Principal::admin(UserId::new(99)), &course).is_ok());
        assert!(matches!(
            require_editor(&Principal::instructor(UserId::new(11)), &course),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(require_editor(&Principal::student(UserId::new(10)), &course).is_err());
    }

    #[test]
    fn students_read_only_their_own_records() {
        let course = course();
        let student = UserId::new(3);
        assert!(require_reader(&Principal::student(student), student, &course).is_ok());
        assert!(require_reader(&Principal::student(UserId::new(4)), student, &course).is_err());
        assert!(require_reader(&Principal::instructor(UserId::new(10)), student, &course).is_ok());
        assert!(require_self(&Principal::admin(UserId::new(1)), student).is_ok());
        assert!(require_author(&Principal::student(student)).is_err());
    }
}
