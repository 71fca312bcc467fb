//! Caller identity carried through a run and handed to every tool.

use serde::{Deserialize, Serialize};

use crate::KeelsonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SalesRep,
    Manager,
    Analyst,
    Finance,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SalesRep => "sales_rep",
            UserRole::Manager => "manager",
            UserRole::Analyst => "analyst",
            UserRole::Finance => "finance",
            UserRole::Admin => "admin",
        }
    }
}

/// Who is asking. Roles are free-form strings; [`UserRole`] names the well-known ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(rename = "user_email")]
    pub email: String,
    #[serde(rename = "user_role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserContext {
    /// Builds a validated context. Fails when `user_id` or `email` is blank.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: Option<String>,
    ) -> Result<Self, KeelsonError> {
        let context = Self {
            user_id: user_id.into(),
            email: email.into(),
            role,
        };
        context.validate()?;
        Ok(context)
    }

    pub fn validate(&self) -> Result<(), KeelsonError> {
        if self.user_id.trim().is_empty() || self.email.trim().is_empty() {
            return Err(KeelsonError::Authentication(format!(
                "missing identity: user_id={:?}, email={:?}",
                self.user_id, self.email
            )));
        }
        Ok(())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin.as_str())
    }

    pub fn can_access_financial_data(&self) -> bool {
        self.has_role(UserRole::Finance.as_str()) || self.is_admin()
    }
}
