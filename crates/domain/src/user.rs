use chrono_tz::Tz;

use crate::{
    Meta,
    Metadata,
    shared::entity::{Entity, ID},
};

/// Parent of every tenant-bounded entity. Never soft-deleted by the core;
/// deactivation of an organization's resources is modeled at the event-type
/// and API-key level, not here.
#[derive(Debug, Clone)]
pub struct Organization {
    pub id: ID,
    pub slug: String,
    pub default_timezone: Tz,
    pub metadata: Metadata,
}

impl Organization {
    pub fn new(slug: String, default_timezone: Tz) -> Self {
        Self {
            id: ID::default(),
            slug,
            default_timezone,
            metadata: Metadata::default(),
        }
    }
}

impl Entity<ID> for Organization {
    fn id(&self) -> ID {
        self.id.clone()
    }
}

/// A host: someone schedules can be booked against. `email` is the unique,
/// lower-cased identity used for lookups; `timezone` is the IANA zone used
/// to interpret the user's schedule windows absent a query-level override.
#[derive(Debug, Clone)]
pub struct User {
    pub id: ID,
    pub organization_id: ID,
    pub email: String,
    pub name: String,
    pub timezone: Tz,
    pub metadata: Metadata,
}

impl User {
    pub fn new(organization_id: ID, email: String, name: String, timezone: Tz) -> Self {
        Self {
            id: ID::default(),
            organization_id,
            email: email.to_lowercase(),
            name,
            timezone,
            metadata: Metadata::default(),
        }
    }
}

impl Entity<ID> for User {
    fn id(&self) -> ID {
        self.id.clone()
    }
}

impl Meta<ID> for User {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn organization_id(&self) -> &ID {
        &self.organization_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_lowercases_email() {
        let org = ID::default();
        let user = User::new(org, "Jane.Doe@Example.com".into(), "Jane Doe".into(), chrono_tz::UTC);
        assert_eq!(user.email, "jane.doe@example.com");
    }
}
