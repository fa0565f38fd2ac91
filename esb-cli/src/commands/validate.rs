// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb validate` command - Validate project configuration and template.

use std::path::Path;

use esb_core::{ConfigLoader, ManifestParser};

pub async fn execute(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %config_path.display(), "Validating configuration");

    let result = ConfigLoader::load_or_default(config_path).and_then(|config| {
        let manifest =
            ManifestParser::new(config.parameters.clone()).parse_file(config.template_path())?;
        Ok((config, manifest))
    });

    match result {
        Ok((config, manifest)) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Project Settings:");
            println!("  Template:           {}", config.template_path().display());
            println!("  Output Directory:   {}", config.paths.output_dir.display());
            println!("  DynamoDB Endpoint:  {}", config.endpoints.dynamodb);
            println!("  S3 Endpoint:        {}", config.endpoints.s3);
            println!("  Parallelism:        {}", config.provisioner.parallelism);
            println!(
                "  Request Timeout:    {}ms",
                config.provisioner.request_timeout.as_millis()
            );
            println!("  Layer Bucket:       {}", config.provisioner.layer_bucket);
            println!();
            println!("Functions ({}):", manifest.functions.len());
            for function in &manifest.functions {
                println!(
                    "  - {} (runtime: {}, memory: {}MB, timeout: {}s)",
                    function.name, function.runtime, function.memory_size, function.timeout
                );
            }
            println!(
                "Resources: {} table(s), {} bucket(s), {} layer(s)",
                manifest.resources.dynamodb.len(),
                manifest.resources.s3.len(),
                manifest.resources.layers.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
