// REVDB - Reversible Interpreter Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{Address, EngineError, EngineResult, WatchStep};

/// Addresses of one resolved link, as reported by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAddresses {
    /// Location holding the value this step resolved to
    pub storage_addr: Option<Address>,
    /// Location whose mutation means the storage itself may have moved
    pub guard_addr: Option<Address>,
}

/// Response of the runtime's chain resolution entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResponse {
    /// One entry per requested step
    #[serde(default)]
    pub links: Vec<LinkAddresses>,
    /// Set when resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A step together with the addresses it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchLink {
    /// The step
    pub step: WatchStep,
    /// Location holding the value this step resolved to
    pub storage_addr: Option<Address>,
    /// Location whose mutation invalidates `storage_addr`
    pub guard_addr: Option<Address>,
}

/// A fully resolved watch chain.
///
/// Valid only while none of its watched addresses has been written. Any write
/// calls for resolving the whole chain again, never for patching it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchChain {
    links: Vec<WatchLink>,
}

impl WatchChain {
    /// Pair the requested steps with the runtime's answer.
    pub fn from_response(steps: &[WatchStep], response: ChainResponse) -> EngineResult<Self> {
        if let Some(error) = response.error {
            return Err(EngineError::Runtime(error));
        }
        if response.links.len() != steps.len() {
            return Err(EngineError::Runtime(format!(
                "resolved {} links for {} steps",
                response.links.len(),
                steps.len()
            )));
        }
        let links = steps
            .iter()
            .zip(response.links)
            .map(|(step, addrs)| WatchLink {
                step: step.clone(),
                storage_addr: addrs.storage_addr,
                guard_addr: addrs.guard_addr,
            })
            .collect();
        Ok(Self { links })
    }

    /// The links, outermost step first.
    pub fn links(&self) -> &[WatchLink] {
        &self.links
    }

    /// Every address to watch: each link's storage, then its guard. Duplicates
    /// are dropped.
    pub fn watched_addresses(&self) -> Vec<Address> {
        self.links
            .iter()
            .flat_map(|link| [link.storage_addr, link.guard_addr])
            .flatten()
            .unique()
            .collect()
    }
}
