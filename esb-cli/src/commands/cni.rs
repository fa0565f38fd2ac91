// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb cni` command - Write the CNI bridge config for containerd mode.

use std::path::Path;

use esb_core::cni;

pub async fn execute(
    dir: &Path,
    subnet: &str,
    name: &str,
    bridge: &str,
    identity: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let claims = cni::collect_subnet_claims(dir, name)?;
    if let Some(owner) = claims.get(subnet) {
        tracing::warn!(subnet = %subnet, network = %owner, "Subnet already claimed by another CNI network");
        eprintln!("⚠ Subnet {} is already used by network '{}'", subnet, owner);
    }

    let path = cni::generate_config(dir, subnet, name, bridge)?;
    println!("✓ Wrote {}", path.display());

    if let Some(identity) = identity {
        cni::write_identity_file(identity, name, bridge, subnet)?;
        println!("✓ Wrote {}", identity.display());
    }
    Ok(())
}
