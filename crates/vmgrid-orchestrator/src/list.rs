//! Read-only instance listing.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::warn;

use vmgrid_core::RequestContext;
use vmgrid_state::*;

use crate::error::ProvisionResult;
use crate::orchestrator::Orchestrator;
use crate::request::{ListQuery, SortField, SortOrder};

/// An instance with the records a caller usually wants alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub instance: Instance,
    pub interfaces: Vec<Interface>,
    pub floating_ips: Vec<FloatingIp>,
    pub cluster: Option<Cluster>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstancePage {
    /// Visible matches before pagination.
    pub total: u64,
    pub instances: Vec<InstanceView>,
}

impl Orchestrator {
    /// List the instances visible to `ctx`.
    ///
    /// Admins see everything; everyone else sees the instances their
    /// organization owns.
    pub fn list(&self, ctx: &RequestContext, query: &ListQuery) -> ProvisionResult<InstancePage> {
        let order: SortOrder = query.order.parse()?;
        let needle = query.query.trim();

        let mut matches = self.state.list_where::<Instance>(|inst| {
            (ctx.is_admin || inst.owner == ctx.org_id)
                && (needle.is_empty() || inst.hostname.contains(needle))
        })?;
        let total = matches.len() as u64;

        matches.sort_by(|a, b| compare(a, b, order));
        let limit = if query.limit == 0 {
            self.page_size
        } else {
            query.limit
        };
        let page = matches
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX));

        let mut instances = Vec::new();
        for instance in page {
            instances.push(self.enrich(instance)?);
        }
        Ok(InstancePage { total, instances })
    }

    fn enrich(&self, mut instance: Instance) -> ProvisionResult<InstanceView> {
        let interfaces = self.state.interfaces_for_instance(instance.id)?;
        let floating_ips = self.state.floating_ips_for_instance(instance.id)?;
        let cluster = match instance.cluster_id {
            Some(cluster_id) => {
                let cluster = self.state.get::<Cluster>(cluster_id)?;
                if cluster.is_none() {
                    warn!(
                        instance = instance.id,
                        cluster = cluster_id,
                        "instance references a missing cluster"
                    );
                    instance.cluster_id = None;
                }
                cluster
            }
            None => None,
        };
        Ok(InstanceView {
            instance,
            interfaces,
            floating_ips,
            cluster,
        })
    }
}

/// Order by the requested column, then by id so pages are stable.
fn compare(a: &Instance, b: &Instance, order: SortOrder) -> Ordering {
    let primary = match order.field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Hostname => a.hostname.cmp(&b.hostname),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    let ordering = primary.then_with(|| a.id.cmp(&b.id));
    if order.descending {
        ordering.reverse()
    } else {
        ordering
    }
}
