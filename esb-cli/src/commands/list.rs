// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `esb list` command - List functions and resources from the template.

use std::path::Path;

use esb_core::ManifestParser;

pub async fn execute(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_project(config_path, Vec::new())?;
    let manifest = ManifestParser::new(config.parameters.clone()).parse_file(config.template_path())?;

    if manifest.functions.is_empty() && manifest.resources.is_empty() {
        println!("No functions or resources defined in template.");
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                              TEMPLATE FUNCTIONS                              ║");
    println!("╠═══════════════════════╦════════════╦═════════╦═══════════════════════════════╣");
    println!("║ Name                  ║ Runtime    ║ Memory  ║ Routes                        ║");
    println!("╠═══════════════════════╬════════════╬═════════╬═══════════════════════════════╣");

    for function in &manifest.functions {
        let routes: Vec<String> = function.events.iter().map(|e| e.key()).collect();
        println!(
            "║ {:<21} ║ {:<10} ║ {:<7} ║ {:<29} ║",
            function.name,
            function.runtime,
            format!("{}MB", function.memory_size),
            routes.join(", ")
        );
    }

    println!("╚═══════════════════════╩════════════╩═════════╩═══════════════════════════════╝");
    println!();

    for table in &manifest.resources.dynamodb {
        println!("  table   {} ({:?})", table.table_name, table.billing_mode);
    }
    for bucket in &manifest.resources.s3 {
        println!("  bucket  {}", bucket.bucket_name);
    }
    for layer in &manifest.resources.layers {
        println!("  layer   {} ({})", layer.name, layer.content_uri);
    }

    println!();
    println!(
        "Total: {} function(s), {} table(s), {} bucket(s), {} layer(s)",
        manifest.functions.len(),
        manifest.resources.dynamodb.len(),
        manifest.resources.s3.len(),
        manifest.resources.layers.len()
    );

    Ok(())
}
