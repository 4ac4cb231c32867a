/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Cluster Resource State Module
//!
//! Both the desired configuration (CIB resources scope) and the live status
//! (`crm_mon --as-xml`) are reduced to the same shape: top-level resource id
//! mapped to a coarse state. The cluster is synced when both shapes agree.

use std::{collections::BTreeMap, fmt};

use roxmltree::Node as XmlNode;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Coarse lifecycle state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Stopped,
    Starting,
    Started,
}

impl ResourceState {
    /// State named by a `target-role` attribute or a live `role`
    pub fn from_role(role: &str) -> Self {
        match role {
            "Started" | "Master" | "Slave" | "Promoted" | "Unpromoted" => ResourceState::Started,
            "Stopped" => ResourceState::Stopped,
            _ => ResourceState::Starting,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Stopped => "stopped",
            ResourceState::Starting => "starting",
            ResourceState::Started => "started",
        };
        f.write_str(name)
    }
}

/// Top-level resource ids with their states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTopology {
    resources: BTreeMap<String, ResourceState>,
}

impl ResourceTopology {
    /// Desired states from a CIB resources document
    pub fn from_cib(cib: &str) -> Result<Self> {
        let document = roxmltree::Document::parse(cib)?;
        let resources = document
            .root_element()
            .children()
            .filter(|child| child.is_element())
            .filter_map(|child| {
                let id = child.attribute("id")?;
                let role = target_role(&child).unwrap_or("Started");
                Some((id.to_string(), ResourceState::from_role(role)))
            })
            .collect();
        Ok(Self { resources })
    }

    /// Live states from a `crm_mon --as-xml` document
    pub fn from_crm_mon(status: &str) -> Result<Self> {
        let document = roxmltree::Document::parse(status)?;
        let resources = document
            .root_element()
            .children()
            .filter(|child| child.has_tag_name("resources"))
            .flat_map(|section| section.children().filter(|child| child.is_element()))
            .filter_map(|child| {
                let id = child.attribute("id")?;
                Some((id.to_string(), live_state(&child)))
            })
            .collect();
        Ok(Self { resources })
    }

    pub fn get(&self, id: &str) -> Option<ResourceState> {
        self.resources.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Resources whose live state differs from `desired`, plus resources
    /// known to only one side
    pub fn differences(&self, desired: &ResourceTopology) -> Vec<String> {
        let mut differences = Vec::new();
        for (id, want) in &desired.resources {
            match self.resources.get(id) {
                Some(have) if have == want => {}
                Some(have) => differences.push(format!("{} is {} (want {})", id, have, want)),
                None => differences.push(format!("{} is missing", id)),
            }
        }
        for id in self.resources.keys() {
            if !desired.resources.contains_key(id) {
                differences.push(format!("{} is not configured", id));
            }
        }
        differences
    }
}

fn target_role<'a>(resource: &XmlNode<'a, '_>) -> Option<&'a str> {
    resource
        .children()
        .filter(|child| child.has_tag_name("meta_attributes"))
        .flat_map(|meta| meta.children())
        .find(|pair| pair.has_tag_name("nvpair") && pair.attribute("name") == Some("target-role"))
        .and_then(|pair| pair.attribute("value"))
}

fn live_state(resource: &XmlNode<'_, '_>) -> ResourceState {
    if resource.has_tag_name("resource") {
        return resource
            .attribute("role")
            .map(ResourceState::from_role)
            .unwrap_or(ResourceState::Stopped);
    }

    // Clones and groups: started only when every member is started.
    let members: Vec<ResourceState> = resource
        .descendants()
        .filter(|member| member.has_tag_name("resource"))
        .map(|member| {
            member
                .attribute("role")
                .map(ResourceState::from_role)
                .unwrap_or(ResourceState::Stopped)
        })
        .collect();

    if members.is_empty() || members.iter().all(|state| *state == ResourceState::Stopped) {
        ResourceState::Stopped
    } else if members.iter().all(|state| *state == ResourceState::Started) {
        ResourceState::Started
    } else {
        ResourceState::Starting
    }
}

/// Whether the live status matches the desired configuration: same set of
/// top-level resources, each in its target role
pub fn is_resources_synced(cib: &str, crm_mon: &str) -> Result<bool> {
    let desired = ResourceTopology::from_cib(cib)?;
    let live = ResourceTopology::from_crm_mon(crm_mon)?;
    Ok(live.differences(&desired).is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CIB: &str = r#"<resources>
  <primitive id="p_heat-engine" class="ocf" type="heat-engine">
    <meta_attributes id="p_heat-engine-meta"><nvpair id="a" name="resource-stickiness" value="1"/></meta_attributes>
  </primitive>
  <clone id="clone_p_neutron-l3-agent">
    <meta_attributes id="c-meta"><nvpair id="b" name="target-role" value="Stopped"/></meta_attributes>
    <primitive id="p_neutron-l3-agent" class="ocf" type="ocf-neutron-l3-agent"/>
  </clone>
</resources>"#;

    pub(crate) fn crm_mon(heat: &str, l3: &[&str]) -> String {
        let members: String = l3
            .iter()
            .map(|role| format!(r#"<resource id="p_neutron-l3-agent" role="{}"/>"#, role))
            .collect();
        format!(
            r#"<crm_mon version="1.1.12"><summary/><nodes/><resources>
  <resource id="p_heat-engine" role="{}" active="true"/>
  <clone id="clone_p_neutron-l3-agent" multi_state="false">{}</clone>
</resources></crm_mon>"#,
            heat, members
        )
    }

    #[test]
    fn test_desired_topology_defaults_to_started() {
        let desired = ResourceTopology::from_cib(CIB).unwrap();
        assert_eq!(desired.get("p_heat-engine"), Some(ResourceState::Started));
        assert_eq!(desired.get("clone_p_neutron-l3-agent"), Some(ResourceState::Stopped));
        assert_eq!(desired.len(), 2);
    }

    #[test]
    fn test_synced_when_roles_match() {
        assert!(is_resources_synced(CIB, &crm_mon("Started", &["Stopped", "Stopped"])).unwrap());
        assert!(!is_resources_synced(CIB, &crm_mon("Stopped", &["Stopped"])).unwrap());
        assert!(!is_resources_synced(CIB, &crm_mon("Started", &["Started", "Stopped"])).unwrap());
    }

    #[test]
    fn test_unknown_or_missing_resources_break_sync() {
        let extra = crm_mon("Started", &[]).replace(
            "</resources>",
            r#"<resource id="p_ceilometer" role="Started"/></resources>"#,
        );
        let live = ResourceTopology::from_crm_mon(&extra).unwrap();
        let desired = ResourceTopology::from_cib(CIB).unwrap();
        assert_eq!(live.differences(&desired), vec!["p_ceilometer is not configured"]);

        let missing = r#"<crm_mon><resources><resource id="p_heat-engine" role="Started"/></resources></crm_mon>"#;
        assert!(!is_resources_synced(CIB, missing).unwrap());
    }

    #[test]
    fn test_transitional_roles_are_starting() {
        let live = ResourceTopology::from_crm_mon(&crm_mon("Starting", &["Started", "Stopped"])).unwrap();
        assert_eq!(live.get("p_heat-engine"), Some(ResourceState::Starting));
        assert_eq!(live.get("clone_p_neutron-l3-agent"), Some(ResourceState::Starting));
    }
}
