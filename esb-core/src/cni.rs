// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CNI network configuration for the containerd runtime mode.
//!
//! Emits `10-<name>.conflist` with a bridge plugin carrying host-local IPAM
//! and DNS, plus a shell-sourceable identity file describing the network.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{EsbError, EsbResult, FsError, ValidationError};
use crate::fs;

pub const CNI_VERSION: &str = "1.0.0";
/// Nameserver used when neither the environment nor the subnet yields one.
pub const DEFAULT_DNS_SERVER: &str = "10.88.0.1";
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipam {
    #[serde(rename = "type")]
    pub kind: String,
    pub subnet: String,
    pub range_start: String,
    pub range_end: String,
    pub gateway: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gateway: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_masq: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hairpin_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeMap<String, bool>>,
}

impl Plugin {
    fn named(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            bridge: None,
            is_gateway: None,
            ip_masq: None,
            hairpin_mode: None,
            ipam: None,
            dns: None,
            capabilities: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub cni_version: String,
    pub name: String,
    pub plugins: Vec<Plugin>,
}

/// Parse and normalize an IPv4 CIDR to its network address.
fn parse_subnet(subnet: &str) -> Result<Ipv4Net, ValidationError> {
    subnet
        .trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| ValidationError::InvalidFieldValue {
            field: "subnet",
            value: subnet.to_string(),
            reason: e.to_string(),
        })
}

fn offset(addr: Ipv4Addr, delta: i64) -> Ipv4Addr {
    Ipv4Addr::from((u32::from(addr) as i64 + delta) as u32)
}

/// First usable address of the subnet.
pub fn gateway_of(net: &Ipv4Net) -> Ipv4Addr {
    offset(net.network(), 1)
}

/// First DNS nameserver: `CNI_DNS_SERVER`, then `CNI_GW_IP`, then the subnet
/// gateway, then [`DEFAULT_DNS_SERVER`].
pub fn resolve_dns_server(subnet: Option<&Ipv4Net>) -> String {
    ["CNI_DNS_SERVER", "CNI_GW_IP"]
        .into_iter()
        .find_map(|key| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .or_else(|| subnet.map(|net| gateway_of(net).to_string()))
        .unwrap_or_else(|| DEFAULT_DNS_SERVER.to_string())
}

/// Build the network config for `subnet` on `bridge`.
pub fn network_config(subnet: &str, name: &str, bridge: &str) -> Result<NetworkConfig, ValidationError> {
    for (field, value) in [("name", name), ("bridge", bridge), ("subnet", subnet)] {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field,
                context: "CNI network".to_string(),
            });
        }
    }

    let net = parse_subnet(subnet)?;
    if net.prefix_len() > 30 {
        return Err(ValidationError::InvalidFieldValue {
            field: "subnet",
            value: subnet.to_string(),
            reason: "prefix must leave room for a gateway and hosts (/30 or wider)".to_string(),
        });
    }

    let gateway = gateway_of(&net);
    let bridge_plugin = Plugin {
        bridge: Some(bridge.trim().to_string()),
        is_gateway: Some(true),
        ip_masq: Some(true),
        hairpin_mode: Some(true),
        ipam: Some(Ipam {
            kind: "host-local".to_string(),
            subnet: net.to_string(),
            range_start: gateway.to_string(),
            range_end: offset(net.broadcast(), -1).to_string(),
            gateway: gateway.to_string(),
            routes: vec![Route {
                dst: "0.0.0.0/0".to_string(),
            }],
        }),
        dns: Some(Dns {
            nameservers: vec![resolve_dns_server(Some(&net))],
        }),
        ..Plugin::named("bridge")
    };

    let portmap = Plugin {
        capabilities: Some(BTreeMap::from([("portMappings".to_string(), true)])),
        ..Plugin::named("portmap")
    };

    Ok(NetworkConfig {
        cni_version: CNI_VERSION.to_string(),
        name: name.trim().to_string(),
        plugins: vec![bridge_plugin, portmap, Plugin::named("firewall")],
    })
}

/// Path of the conflist for `name` under `dir`.
pub fn config_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("10-{}.conflist", name.trim()))
}

/// Write `10-<name>.conflist` into `dir`.
pub fn generate_config(dir: &Path, subnet: &str, name: &str, bridge: &str) -> EsbResult<PathBuf> {
    let config = network_config(subnet, name, bridge)?;
    let path = config_path(dir, name);
    let payload = serde_json::to_vec_pretty(&config).map_err(|e| EsbError::ConfigParse {
        path: path.clone(),
        message: e.to_string(),
    })?;

    fs::ensure_dir(dir)?;
    write_file(&path, &payload)?;

    tracing::info!(path = %path.display(), network = %config.name, subnet = %subnet, "Wrote CNI config");
    Ok(path)
}

/// Single-quote a value for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Write a shell-sourceable file with `CNI_NETWORK`, `CNI_BRIDGE`,
/// `CNI_SUBNET` and `CNI_GW_IP`.
pub fn write_identity_file(path: &Path, network: &str, bridge: &str, subnet: &str) -> EsbResult<()> {
    let net = parse_subnet(subnet)?;
    let lines = [
        ("CNI_NETWORK", network.to_string()),
        ("CNI_BRIDGE", bridge.to_string()),
        ("CNI_SUBNET", net.to_string()),
        ("CNI_GW_IP", gateway_of(&net).to_string()),
    ];
    let content: String = lines
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, shell_quote(value)))
        .collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::ensure_dir(parent)?;
    }
    write_file(path, content.as_bytes())?;
    Ok(())
}

/// Subnets claimed by other networks' configs in `dir`, as subnet -> network.
///
/// Unreadable or malformed files are ignored; a missing directory has no claims.
pub fn collect_subnet_claims(dir: &Path, self_name: &str) -> EsbResult<BTreeMap<String, String>> {
    let mut claims = BTreeMap::new();
    if !fs::dir_exists(dir) {
        return Ok(claims);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| FsError::io("read directory", dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_config = path
            .extension()
            .map(|ext| ext == "conflist" || ext == "conf")
            .unwrap_or(false);
        if !is_config {
            continue;
        }

        let Ok(content) = std::fs::read(&path) else {
            continue;
        };
        let Ok(doc) = serde_json::from_slice::<serde_json::Value>(&content) else {
            tracing::debug!(path = %path.display(), "Skipping malformed CNI config");
            continue;
        };

        let name = doc.get("name").and_then(|n| n.as_str()).unwrap_or_default();
        if name.is_empty() || name == self_name {
            continue;
        }

        let inline = doc.get("ipam").into_iter();
        let plugins = doc
            .get("plugins")
            .and_then(|p| p.as_array())
            .into_iter()
            .flatten()
            .filter_map(|plugin| plugin.get("ipam"));
        for ipam in inline.chain(plugins) {
            if let Some(subnet) = ipam.get("subnet").and_then(|s| s.as_str()) {
                claims.insert(subnet.to_string(), name.to_string());
            }
        }
    }

    Ok(claims)
}

fn write_file(path: &Path, payload: &[u8]) -> Result<(), FsError> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options
        .open(path)
        .map_err(|e| FsError::io("write file", path, e))?;
    file.write_all(payload)
        .map_err(|e| FsError::io("write file", path, e))
}
