// build.rs
// Compiles the GLSL sources under resources/shaders into SPIR-V under target/shaders

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 6] = ["vert", "frag", "comp", "geom", "tesc", "tese"];

/// `quad.vert` -> `quad.vert.spv`, so stages sharing a stem do not collide
fn output_path(target_dir: &Path, source: &Path) -> Option<PathBuf> {
    let file_name = source.file_name()?.to_str()?;
    Some(target_dir.join(format!("{file_name}.spv")))
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src_time), Ok(dst_time)) => src_time > dst_time,
            _ => true,
        },
        _ => true,
    }
}

fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &str) -> usize {
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_STAGES.contains(&ext));
        if !is_stage {
            continue;
        }

        let Some(out_file) = output_path(target_dir, &path) else {
            continue;
        };

        if !is_stale(&path, &out_file) {
            eprintln!("info: Shader {:?} is up to date", path.file_name());
            continue;
        }

        let status = Command::new(glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, out_file);
                compiled += 1;
            }
            Ok(s) => {
                eprintln!("error: glslc failed for {:?} with exit code: {}", path, s.code().unwrap_or(-1));
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {:?}: {}", path, e);
                panic!("Failed to execute shader compiler");
            }
        }
    }
    compiled
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at: {}, shader compilation skipped", glslc);
        return;
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {}", e);
        return;
    }

    let compiled = compile_shaders(&shader_dir, &target_dir, &glslc);
    if compiled > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled);
    } else {
        eprintln!("info: All shaders are up to date");
    }
}
