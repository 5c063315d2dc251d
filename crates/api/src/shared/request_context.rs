use scheduling_domain::{
    booking::{ActorType, BookingSource},
    ID,
};
use scheduling_infra::TenantScope;

/// Everything a use case needs to know about the caller, independent of
/// whatever transport eventually sits in front of this crate. Populated by
/// the surrounding HTTP layer (auth middleware fills in `user_id` /
/// `organization_id` / `api_key_id` once authentication resolves -- they
/// are not necessarily known when the context is first created) and
/// carried by the caller into `UseCase::execute`; this crate has no HTTP
/// surface of its own; see [`crate::shared::usecase`].
///
/// `organization_id` is what the tenant-scope interceptor reads -- a use
/// case builds its `TenantScope` from `tenant_scope()` rather than
/// threading `organization_id` through every repo call by hand. When it is
/// `None` the interceptor is a no-op, which is the system/background-job
/// case: `RequestContext::system()`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<ID>,
    pub organization_id: Option<ID>,
    pub api_key_id: Option<ID>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: String, organization_id: Option<ID>) -> Self {
        Self {
            request_id,
            user_id: None,
            organization_id,
            api_key_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// System-originated work (reminder dispatch, webhook replay) that has
    /// no single tenant to scope to and no caller identity.
    pub fn system() -> Self {
        Self {
            request_id: "system".into(),
            user_id: None,
            organization_id: None,
            api_key_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_user(mut self, user_id: ID) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_api_key(mut self, api_key_id: ID) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    pub fn tenant_scope(&self) -> TenantScope {
        match &self.organization_id {
            Some(organization_id) => TenantScope::scoped(organization_id.clone()),
            None => TenantScope::unscoped(),
        }
    }

    /// `actorType = apiKeyId ? API_KEY : userId ? USER : SYSTEM`.
    pub fn actor_type(&self) -> ActorType {
        if self.api_key_id.is_some() {
            ActorType::ApiKey
        } else if self.user_id.is_some() {
            ActorType::User
        } else {
            ActorType::System
        }
    }

    /// `createdBy`/audit `actorId` -- always the human user, never the key.
    pub fn actor_id(&self) -> Option<ID> {
        self.user_id.clone()
    }

    /// `booking.source`: API if `apiKeyId` is set, else WEB.
    pub fn booking_source(&self) -> BookingSource {
        if self.api_key_id.is_some() {
            BookingSource::Api
        } else {
            BookingSource::Web
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_context_has_no_scope_and_no_actor() {
        let ctx = RequestContext::system();
        assert!(ctx.organization_id.is_none());
        assert_eq!(ctx.actor_type(), ActorType::System);
        assert_eq!(ctx.actor_id(), None);
        assert_eq!(ctx.booking_source(), BookingSource::Web);
    }

    #[test]
    fn user_context_is_actor_type_user() {
        let ctx = RequestContext::new("req-1".into(), Some(ID::new_v4())).with_user(ID::new_v4());
        assert_eq!(ctx.actor_type(), ActorType::User);
        assert!(ctx.actor_id().is_some());
        assert_eq!(ctx.booking_source(), BookingSource::Web);
    }

    #[test]
    fn api_key_context_wins_over_user_and_sources_from_api() {
        let ctx = RequestContext::new("req-1".into(), Some(ID::new_v4()))
            .with_user(ID::new_v4())
            .with_api_key(ID::new_v4());
        assert_eq!(ctx.actor_type(), ActorType::ApiKey);
        assert_eq!(ctx.booking_source(), BookingSource::Api);
        // actorId is always the human user, never the key
        assert!(ctx.actor_id().is_some());
    }
}
