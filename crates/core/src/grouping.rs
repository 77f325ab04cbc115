use std::collections::{BTreeMap, BTreeSet};

/// Units sharing the source folder of the unit that matched the most keys.
///
/// The busiest unit is picked by distinct matched keys (first id wins a
/// tie). Its id is split on `/`; every unit whose id starts with the same
/// leading `depth` components joins the group, the file name itself never
/// counting as a component. An id with a single component forms a group of
/// one. Returns `None` when no unit matched anything.
#[must_use]
pub fn primary_group(
    keys_by_unit: &BTreeMap<String, BTreeSet<String>>,
    depth: usize,
) -> Option<BTreeSet<String>> {
    let mut busiest: Option<(&str, usize)> = None;
    for (unit, keys) in keys_by_unit {
        if keys.is_empty() {
            continue;
        }
        if busiest.is_none_or(|(_, best)| keys.len() > best) {
            busiest = Some((unit.as_str(), keys.len()));
        }
    }
    let (anchor, key_count) = busiest?;

    let parts: Vec<&str> = anchor.split('/').collect();
    if parts.len() < 2 {
        log::debug!("Primary source unit {anchor} ({key_count} keys) has no folder");
        return Some(BTreeSet::from([anchor.to_string()]));
    }

    let prefix = &parts[..depth.min(parts.len() - 1)];
    let group: BTreeSet<String> = keys_by_unit
        .keys()
        .filter(|unit| {
            let unit_parts: Vec<&str> = unit.split('/').collect();
            unit_parts.len() > prefix.len() && unit_parts[..prefix.len()] == *prefix
        })
        .cloned()
        .collect();

    log::debug!(
        "Primary source group {} ({} units, anchored on {anchor} with {key_count} keys)",
        prefix.join("/"),
        group.len()
    );
    Some(group)
}
