//! `Key=Value` renderer config file
//!
//! Lines are matched case-insensitively by substring on the key, so
//! `ShadowQuality`, `shadow_quality` and `Shadows.Quality` are all accepted.
//! Anything unrecognized is reported and skipped; a missing file yields the
//! built-in defaults.

use std::fmt::{self, Write as _};
use std::path::Path;

use super::{
    AntiAliasing, FrameBuffering, GraphicsConfigParams, GraphicsQuality, Resolution, WindowMode,
};

/// Errors raised while reading or writing the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the config file at `path`, falling back to defaults when it is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_renderer_configs(path: impl AsRef<Path>) -> Result<GraphicsConfigParams, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(text) => {
            log::info!("Loaded renderer configs from {}", path.display());
            Ok(parse_renderer_configs(&text))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!(
                "No renderer config at {}, using defaults",
                path.display()
            );
            Ok(GraphicsConfigParams::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write `params` to `path` in the same format `load_renderer_configs` reads.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn save_renderer_configs(
    path: impl AsRef<Path>,
    params: &GraphicsConfigParams,
) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format_renderer_configs(params))?;
    log::info!("Saved renderer configs to {}", path.display());
    Ok(())
}

/// Parse config text, starting from defaults.
#[must_use]
pub fn parse_renderer_configs(text: &str) -> GraphicsConfigParams {
    let mut params = GraphicsConfigParams::default();

    for (line_no, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim().to_ascii_lowercase();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::warn!("Config line {}: expected Key=Value, got {raw:?}", line_no + 1);
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if !apply(&mut params, key, value) {
            log::warn!(
                "Config line {}: ignoring {key}={value}",
                line_no + 1
            );
        }
    }

    params
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

/// Apply one lowercased key/value pair. Returns `false` if the key or value
/// was not understood.
fn apply(params: &mut GraphicsConfigParams, key: &str, value: &str) -> bool {
    // More specific keys first: "softshadows" and "cascadeshadowmapres" also
    // contain "shadow".
    if key.contains("soft") {
        set(&mut params.soft_shadows, parse_bool(value))
    } else if key.contains("cascade") {
        set(&mut params.cascade_shadow_map_res, parse_map_size(value))
    } else if key.contains("array") {
        set(&mut params.shadow_map_array_res, parse_map_size(value))
    } else if key.contains("shadow") {
        set(&mut params.shadow_quality, parse_quality(value))
    } else if key.contains("texture") {
        set(&mut params.texture_quality, parse_quality(value))
    } else if key.contains("light") {
        set(&mut params.light_quality, parse_quality(value))
    } else if key.contains("buffer") {
        set(&mut params.buffering, parse_buffering(value))
    } else if key.contains("swap") {
        set(
            &mut params.desired_swap_images,
            value.parse::<u32>().ok().filter(|n| (1..=8).contains(n)),
        )
    } else if key.contains("alias") || key == "aa" {
        set(&mut params.anti_aliasing, parse_anti_aliasing(value))
    } else if key.contains("resolution") {
        set(&mut params.resolution, parse_resolution(value))
    } else if key.contains("window") {
        set(&mut params.window_mode, parse_window_mode(value))
    } else if key.contains("scale") {
        set(
            &mut params.render_scale,
            value
                .parse::<f32>()
                .ok()
                .filter(|s| s.is_finite() && *s > 0.0),
        )
    } else if key.contains("vsync") {
        set(&mut params.vsync, parse_bool(value))
    } else if key.contains("bloom") {
        set(&mut params.bloom, parse_bool(value))
    } else if key.contains("chromatic") {
        set(&mut params.chromatic_aberration, parse_bool(value))
    } else if key.contains("thread") {
        set(&mut params.multithreaded_rendering, parse_bool(value))
    } else if key.contains("reflection") {
        set(&mut params.local_reflections, parse_bool(value))
    } else if key.contains("postprocess") || key.contains("post_process") {
        set(&mut params.post_processing, parse_bool(value))
    } else if key.contains("limit") {
        match value.parse::<u32>() {
            Ok(0) => {
                params.frame_limit = None;
                true
            }
            Ok(n) => {
                params.frame_limit = Some(n);
                true
            }
            Err(_) => false,
        }
    } else {
        false
    }
}

fn set<T>(slot: &mut T, parsed: Option<T>) -> bool {
    match parsed {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "on" | "yes" | "enabled" => Some(true),
        "false" | "0" | "off" | "no" | "disabled" => Some(false),
        _ => None,
    }
}

/// Shadow map side: `0` (automatic) or a size between 16 and 16384.
fn parse_map_size(value: &str) -> Option<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|n| *n == 0 || (16..=16384).contains(n))
}

fn parse_quality(value: &str) -> Option<GraphicsQuality> {
    Some(match value {
        "none" | "off" | "0" => GraphicsQuality::None,
        "potato" | "1" => GraphicsQuality::Potato,
        "low" | "2" => GraphicsQuality::Low,
        "medium" | "3" => GraphicsQuality::Medium,
        "high" | "4" => GraphicsQuality::High,
        "ultra" | "5" => GraphicsQuality::Ultra,
        _ => return None,
    })
}

fn parse_buffering(value: &str) -> Option<FrameBuffering> {
    Some(match value {
        "single" | "1" => FrameBuffering::Single,
        "double" | "2" => FrameBuffering::Double,
        "triple" | "3" => FrameBuffering::Triple,
        _ => return None,
    })
}

fn parse_anti_aliasing(value: &str) -> Option<AntiAliasing> {
    if value == "none" || value == "off" || value == "0" {
        Some(AntiAliasing::None)
    } else if value.contains("fxaa") {
        Some(AntiAliasing::Fxaa2x)
    } else if value.contains("smaa") {
        Some(AntiAliasing::Smaa2x)
    } else {
        None
    }
}

fn parse_resolution(value: &str) -> Option<Resolution> {
    let (w, h) = value.split_once('x')?;
    Resolution::from_dimensions(w.trim().parse().ok()?, h.trim().parse().ok()?)
}

fn parse_window_mode(value: &str) -> Option<WindowMode> {
    if value.contains("borderless") {
        Some(WindowMode::Borderless)
    } else if value.contains("fullscreen") {
        Some(WindowMode::Fullscreen)
    } else if value.contains("window") || value.contains("border") {
        Some(WindowMode::Windowed)
    } else {
        None
    }
}

fn quality_name(q: GraphicsQuality) -> &'static str {
    match q {
        GraphicsQuality::None => "None",
        GraphicsQuality::Potato => "Potato",
        GraphicsQuality::Low => "Low",
        GraphicsQuality::Medium => "Medium",
        GraphicsQuality::High => "High",
        GraphicsQuality::Ultra => "Ultra",
    }
}

fn format_renderer_configs(params: &GraphicsConfigParams) -> String {
    let mut out = String::from("# Recluse renderer configuration\n");
    if let Err(err) = write_entries(&mut out, params) {
        log::error!("Failed to format renderer configs: {err}");
    }
    out
}

fn write_entries(out: &mut String, params: &GraphicsConfigParams) -> fmt::Result {
    let buffering = match params.buffering {
        FrameBuffering::Single => "Single",
        FrameBuffering::Double => "Double",
        FrameBuffering::Triple => "Triple",
    };
    let aa = match params.anti_aliasing {
        AntiAliasing::None => "None",
        AntiAliasing::Fxaa2x => "FXAA_2x",
        AntiAliasing::Smaa2x => "SMAA_2x",
    };
    let window = match params.window_mode {
        WindowMode::Windowed => "Windowed",
        WindowMode::Borderless => "Borderless",
        WindowMode::Fullscreen => "Fullscreen",
    };
    let (w, h) = params.resolution.dimensions();

    writeln!(out, "Buffering={buffering}")?;
    writeln!(out, "SwapImages={}", params.desired_swap_images)?;
    writeln!(out, "AntiAliasing={aa}")?;
    writeln!(out, "ShadowQuality={}", quality_name(params.shadow_quality))?;
    writeln!(out, "CascadeShadowMapRes={}", params.cascade_shadow_map_res)?;
    writeln!(out, "ShadowMapArrayRes={}", params.shadow_map_array_res)?;
    writeln!(out, "TextureQuality={}", quality_name(params.texture_quality))?;
    writeln!(out, "LightQuality={}", quality_name(params.light_quality))?;
    writeln!(out, "Resolution={w}x{h}")?;
    writeln!(out, "WindowMode={window}")?;
    writeln!(out, "RenderScale={}", params.render_scale)?;
    writeln!(out, "VSync={}", params.vsync)?;
    writeln!(out, "Bloom={}", params.bloom)?;
    writeln!(out, "ChromaticAberration={}", params.chromatic_aberration)?;
    writeln!(out, "SoftShadows={}", params.soft_shadows)?;
    writeln!(out, "Multithreaded={}", params.multithreaded_rendering)?;
    writeln!(out, "LocalReflections={}", params.local_reflections)?;
    writeln!(out, "PostProcessing={}", params.post_processing)?;
    writeln!(out, "FrameLimit={}", params.frame_limit.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_substring_based() {
        let params = parse_renderer_configs(
            "SHADOW_QUALITY = Low\n\
             antiAliasing=fxaa_2x\n\
             Graphics.Buffering=Triple\n\
             vsync=OFF\n",
        );
        assert_eq!(params.shadow_quality, GraphicsQuality::Low);
        assert_eq!(params.anti_aliasing, AntiAliasing::Fxaa2x);
        assert_eq!(params.buffering, FrameBuffering::Triple);
        assert!(!params.vsync);
    }

    #[test]
    fn test_soft_shadows_do_not_clobber_shadow_quality() {
        let params = parse_renderer_configs("SoftShadows=false\nShadowQuality=Potato");
        assert!(!params.soft_shadows);
        assert_eq!(params.shadow_quality, GraphicsQuality::Potato);
    }

    #[test]
    fn test_shadow_map_sizes_are_not_read_as_quality() {
        let params = parse_renderer_configs(
            "CascadeShadowMapRes=2048\n\
             Shadows.MapArrayRes=512\n\
             ShadowQuality=Medium\n\
             ShadowMapArrayRes=7\n",
        );
        assert_eq!(params.cascade_shadow_map_res, 2048);
        assert_eq!(params.shadow_map_array_res, 512);
        assert_eq!(params.shadow_quality, GraphicsQuality::Medium);
    }

    #[test]
    fn test_garbage_lines_keep_defaults() {
        let defaults = GraphicsConfigParams::default();
        let params = parse_renderer_configs(
            "# comment only\n\
             not a pair\n\
             Bloom=maybe\n\
             Resolution=123x456\n\
             Unknown=1\n",
        );
        assert_eq!(params, defaults);
    }

    #[test]
    fn test_trailing_comments_are_stripped() {
        let params = parse_renderer_configs("Bloom=false # too bright\nFrameLimit=60 // cap");
        assert!(!params.bloom);
        assert_eq!(params.frame_limit, Some(60));
    }

    #[test]
    fn test_saved_text_parses_back() {
        let params = GraphicsConfigParams {
            anti_aliasing: AntiAliasing::Smaa2x,
            shadow_quality: GraphicsQuality::None,
            resolution: Resolution::R1920x1080,
            window_mode: WindowMode::Borderless,
            soft_shadows: false,
            cascade_shadow_map_res: 3072,
            shadow_map_array_res: 1024,
            texture_quality: GraphicsQuality::Low,
            light_quality: GraphicsQuality::Potato,
            frame_limit: Some(144),
            ..Default::default()
        };
        let parsed = parse_renderer_configs(&format_renderer_configs(&params));
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let params = load_renderer_configs("definitely/not/here.recluse").unwrap();
        assert_eq!(params, GraphicsConfigParams::default());
    }
}
