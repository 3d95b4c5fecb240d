// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Firmware update packer CLI
//! OWNERS: @tools-team
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: via tests/pack.rs
//!
//! PUBLIC API:
//!   - CLI: fw-pack pack --manifest <der> --image <bin> [--output <pkg>] [--force-overwrite]
//!   - CLI: fw-pack inspect <pkg>
//!
//! DEPENDENCIES:
//!   - clap: argument parsing
//!   - env_logger: RUST_LOG-controlled diagnostics

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fw-pack", version, about = "Build and inspect streaming update packages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Concatenate a DER manifest and a firmware image.
    Pack {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        image: PathBuf,
        /// Defaults to the image path with a `.pkg` extension.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        force_overwrite: bool,
    },
    /// Print the manifest/image split of a package.
    Inspect { package: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Pack { manifest, image, output, force_overwrite } => {
            let output = output.unwrap_or_else(|| fw_pack::default_output(&image));
            let info = fw_pack::pack(&manifest, &image, &output, force_overwrite)?;
            println!("{}", output.display());
            println!("image sha256: {}", info.image_sha256_hex());
        }
        Command::Inspect { package } => {
            let info = fw_pack::inspect_file(&package)?;
            println!("manifest: {} bytes", info.manifest_len);
            println!("image:    {} bytes", info.image_len);
            println!("sha256:   {}", info.image_sha256_hex());
        }
    }
    Ok(())
}
