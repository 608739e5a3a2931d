use serde::{Deserialize, Serialize};

use crate::model::course::Course;
use crate::model::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// The authenticated caller, supplied by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn student(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Student,
        }
    }

    #[must_use]
    pub fn instructor(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Instructor,
        }
    }

    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins and the course's own instructors may edit its content.
    #[must_use]
    pub fn can_edit(&self, course: &Course) -> bool {
        self.is_admin() || (self.role == Role::Instructor && course.is_instructor(self.user_id))
    }

    /// Staff bypass prerequisite gates.
    #[must_use]
    pub fn bypasses_gates(&self, course: &Course) -> bool {
        self.is_admin() || course.is_instructor(self.user_id)
    }
}
