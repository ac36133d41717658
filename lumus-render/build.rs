use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::AgentBuilder;
use walkdir::WalkDir;

const DEFAULT_PDFIUM_VERSION: &str = "7350";
const RELEASES_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

// Pdfium is bound at runtime, so a failed fetch only costs the build hint:
// the binary falls back to ./ and the system library path.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for var in [
        "LUMUS_PDFIUM_SKIP_DOWNLOAD",
        "LUMUS_PDFIUM_ARCHIVE",
        "LUMUS_PDFIUM_VERSION",
        "LUMUS_PDFIUM_PLATFORM",
        "PDFIUM_DYNAMIC_LIB_PATH",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    if env::var_os("LUMUS_PDFIUM_SKIP_DOWNLOAD").is_some()
        || env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
    {
        return;
    }

    match stage_pdfium() {
        Ok(library) => println!(
            "cargo:rustc-env=LUMUS_PDFIUM_LIBRARY_PATH={}",
            library.display()
        ),
        Err(err) => println!("cargo:warning=pdfium was not staged: {err:#}"),
    }
}

fn stage_pdfium() -> Result<PathBuf> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR env var not set")?);
    let staging = out_dir.join("pdfium");
    fs::create_dir_all(&staging).context("failed to create staging directory")?;

    let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS missing")?;
    let target_arch =
        env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH missing")?;
    let library_name = match target_os.as_str() {
        "windows" => "pdfium.dll",
        "macos" => "libpdfium.dylib",
        _ => "libpdfium.so",
    };

    if let Some(found) = find_file(&staging, library_name) {
        return Ok(found);
    }

    let archive = match env::var_os("LUMUS_PDFIUM_ARCHIVE") {
        Some(path) => PathBuf::from(path),
        None => {
            let platform = env::var("LUMUS_PDFIUM_PLATFORM")
                .unwrap_or_else(|_| platform_name(&target_os, &target_arch));
            download(&staging, &platform)?
        }
    };

    let file = File::open(&archive).with_context(|| format!("failed to open {:?}", archive))?;
    Archive::new(GzDecoder::new(file))
        .unpack(&staging)
        .with_context(|| format!("failed to unpack {:?}", archive))?;

    find_file(&staging, library_name)
        .ok_or_else(|| anyhow!("{library_name} not found in {:?}", archive))
}

fn platform_name(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        other => other,
    };
    let arch = match target_arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{os}-{arch}")
}

fn download(staging: &Path, platform: &str) -> Result<PathBuf> {
    let version =
        env::var("LUMUS_PDFIUM_VERSION").unwrap_or_else(|_| DEFAULT_PDFIUM_VERSION.to_string());
    let filename = format!("pdfium-{platform}.tgz");
    let destination = staging.join(&filename);
    if destination.exists() {
        return Ok(destination);
    }

    let url = format!("{RELEASES_URL}/chromium/{version}/{filename}");
    let agent = AgentBuilder::new()
        .timeout_read(Duration::from_secs(120))
        .build();
    let response = agent
        .get(&url)
        .call()
        .with_context(|| format!("GET {url} failed"))?;
    if response.status() != 200 {
        bail!("GET {url} returned HTTP {}", response.status());
    }

    let partial = destination.with_extension("part");
    let mut file =
        File::create(&partial).with_context(|| format!("failed to create {:?}", partial))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to write {:?}", partial))?;
    fs::rename(&partial, &destination)?;
    Ok(destination)
}

fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}
