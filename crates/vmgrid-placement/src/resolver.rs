//! Placement resolution: zone choice, eligible groups, pinned hosts.

use tracing::{debug, warn};

use vmgrid_state::{CatalogRead, HostId, Hyper, Subnet, ZoneId};

use crate::directive::GroupToken;
use crate::error::{PlacementError, PlacementResult};

/// Decide the zone an instance lands in.
///
/// Without a requested zone, the first zone of the primary subnet (in its
/// natural order) that every secondary subnet also spans wins. A requested
/// zone must be spanned by the primary and by every secondary subnet.
pub fn resolve_zone(
    primary: &Subnet,
    secondaries: &[Subnet],
    requested: Option<ZoneId>,
) -> PlacementResult<ZoneId> {
    match requested {
        None => primary
            .zones
            .iter()
            .copied()
            .find(|&zone| secondaries.iter().all(|s| s.spans_zone(zone)))
            .ok_or(PlacementError::NoCommonZone { primary: primary.id }),
        Some(zone) => {
            let outside = std::iter::once(primary)
                .chain(secondaries)
                .find(|s| !s.spans_zone(zone));
            match outside {
                Some(subnet) => Err(PlacementError::ZoneMismatch {
                    subnet: subnet.id,
                    zone,
                }),
                None => Ok(zone),
            }
        }
    }
}

/// Hosts in `zone`, filtered by `hyper_type` when one is given, in input order.
pub fn eligible_hosts(hypers: &[Hyper], hyper_type: &str, zone: ZoneId) -> Vec<HostId> {
    hypers
        .iter()
        .filter(|h| h.zone_id == zone)
        .filter(|h| hyper_type.is_empty() || h.hyper_type == hyper_type)
        .map(|h| h.host_id)
        .collect()
}

/// Build the group token for every eligible host in `zone`.
pub fn resolve_group(
    catalog: &impl CatalogRead,
    hyper_type: &str,
    zone: ZoneId,
) -> PlacementResult<GroupToken> {
    let hypers = catalog.list::<Hyper>()?;
    let hosts = eligible_hosts(&hypers, hyper_type, zone);
    if hosts.is_empty() {
        warn!(zone, hyper_type, "no qualified hypervisor");
        return Err(PlacementError::NoEligibleHost {
            zone,
            hyper_type: hyper_type.to_string(),
        });
    }
    let token = GroupToken::new(zone, &hosts);
    debug!(%token, "hypervisor group resolved");
    Ok(token)
}

/// Confirm a caller-pinned host exists and sits in the resolved zone.
pub fn validate_explicit_host(
    catalog: &impl CatalogRead,
    host: HostId,
    zone: ZoneId,
) -> PlacementResult<Hyper> {
    let hyper = catalog.require::<Hyper>(u64::from(host))?;
    if hyper.zone_id != zone {
        return Err(PlacementError::HostZoneMismatch {
            host,
            host_zone: hyper.zone_id,
            zone,
        });
    }
    Ok(hyper)
}
