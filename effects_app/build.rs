// Compiles the GLSL shaders in shaders/ to SPIR-V next to the sources.
// Compilation is skipped (with a warning) when no Vulkan SDK is present
// so the crate still builds on machines without one.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let glslc = match find_glslc() {
        Some(path) => path,
        None => {
            eprintln!("warning: glslc not found, shader compilation skipped");
            eprintln!("hint: install the Vulkan SDK or put glslc on PATH");
            return;
        }
    };

    let shader_dir = PathBuf::from("shaders");
    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let compile = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("vert" | "frag" | "comp")
        );
        if !compile {
            continue;
        }

        let mut output = path.clone().into_os_string();
        output.push(".spv");

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&output).status();
        match status {
            Ok(status) if status.success() => {}
            Ok(_) => panic!("glslc failed for {}", path.display()),
            Err(e) => panic!("failed to run glslc: {}", e),
        }
    }
}

fn find_glslc() -> Option<PathBuf> {
    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let candidate = if cfg!(target_os = "windows") {
            Path::new(&sdk).join("Bin").join("glslc.exe")
        } else {
            Path::new(&sdk).join("bin").join("glslc")
        };
        if candidate.exists() {
            return Some(candidate);
        }
    }

    // Fall back to PATH
    let probe = Command::new("glslc").arg("--version").output();
    if matches!(probe, Ok(ref out) if out.status.success()) {
        return Some(PathBuf::from("glslc"));
    }
    None
}
