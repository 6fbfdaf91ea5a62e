use crate::domain::models::{
    BlockRule, ResourceType, RuleAction, RuleActionType, RuleCondition, TabInfo,
};
use crate::domain::sites::{is_blocked_by_any, page_domain};
use std::collections::HashSet;

const RULE_PRIORITY: u32 = 1;

/// Sites that should actually be blocked right now: nothing unless enabled.
pub fn effective_sites(desired: &[String], enabled: bool) -> Vec<String> {
    if !enabled {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    desired
        .iter()
        .map(|site| site.trim())
        .filter(|site| !site.is_empty())
        .filter(|site| seen.insert(site.to_string()))
        .map(ToOwned::to_owned)
        .collect()
}

/// One main-document rule per effective site, ids assigned from 1 in list order.
pub fn build_rules(desired: &[String], enabled: bool) -> Vec<BlockRule> {
    effective_sites(desired, enabled)
        .into_iter()
        .zip(1u32..)
        .map(|(site, id)| BlockRule {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction {
                action_type: RuleActionType::Block,
            },
            condition: RuleCondition {
                url_filter: format!("||{site}^"),
                resource_types: vec![ResourceType::MainFrame],
            },
        })
        .collect()
}

/// Open pages that were blocked under `previous` but are reachable under `next`.
pub fn tabs_to_reload(tabs: &[TabInfo], previous: &[String], next: &[String]) -> Vec<i64> {
    if previous.is_empty() {
        return Vec::new();
    }
    tabs.iter()
        .filter_map(|tab| {
            let domain = tab.url.as_deref().and_then(page_domain)?;
            (is_blocked_by_any(&domain, previous) && !is_blocked_by_any(&domain, next))
                .then_some(tab.id)
        })
        .collect()
}

/// Open pages that must be sent to the blocked page when no rule primitive exists.
pub fn tabs_to_redirect(tabs: &[TabInfo], sites: &[String], blocked_page_url: &str) -> Vec<i64> {
    if sites.is_empty() {
        return Vec::new();
    }
    tabs.iter()
        .filter(|tab| tab.url.as_deref() != Some(blocked_page_url))
        .filter_map(|tab| {
            let domain = tab.url.as_deref().and_then(page_domain)?;
            is_blocked_by_any(&domain, sites).then_some(tab.id)
        })
        .collect()
}
