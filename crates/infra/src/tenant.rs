use scheduling_domain::ID;

/// The tenant-scoping key carried by a request, mirroring
/// `RequestContext.organizationId`. `None` means "no scope" -- the
/// interceptor becomes a no-op, which is how background jobs that operate
/// system-wide bypass scoping.
#[derive(Debug, Clone, Default)]
pub struct TenantScope {
    organization_id: Option<ID>,
}

impl TenantScope {
    pub fn scoped(organization_id: ID) -> Self {
        Self {
            organization_id: Some(organization_id),
        }
    }

    pub fn unscoped() -> Self {
        Self {
            organization_id: None,
        }
    }

    pub fn organization_id(&self) -> Option<&ID> {
        self.organization_id.as_ref()
    }

    /// A row with tenant key `row_org` is visible/mutable under this scope
    /// iff the scope is unscoped, or the keys match.
    pub fn allows(&self, row_org: &ID) -> bool {
        match &self.organization_id {
            None => true,
            Some(scope_org) => scope_org == row_org,
        }
    }
}
