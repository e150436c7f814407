use crate::cursor_store::CursorState;
use crate::iterator::Served;
use crate::theme::Theme;
use crate::utils::display_path;
use serde::Serialize;

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Quiet,   // Only errors
    Normal,  // Standard output
    Verbose, // Absolute paths and cache details
}

impl OutputMode {
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            OutputMode::Quiet
        } else if verbose > 0 {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct JsonServed {
    pub relative_path: String,
    pub absolute_path: String,
    pub index: usize,
    pub total_count: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub from_cache: bool,
}

impl From<&Served> for JsonServed {
    fn from(served: &Served) -> Self {
        Self {
            relative_path: served.relative_path.clone(),
            absolute_path: display_path(&served.absolute_path),
            index: served.index,
            total_count: served.total_count,
            width: served.image.width,
            height: served.image.height,
            channels: served.image.channels,
            from_cache: served.from_cache,
        }
    }
}

#[derive(Serialize, Debug)]
struct JsonStatus {
    version: String,
    location: String,
    root: String,
    recursive: bool,
    extensions: Vec<String>,
    allow_transparency: bool,
    auto_refresh: bool,
    total_count: usize,
    index: usize,
    next_file: Option<String>,
    fingerprint: String,
    saved_at: Option<String>,
}

pub fn print_served_human(served: &Served, mode: OutputMode) {
    if mode == OutputMode::Quiet {
        return;
    }

    let position = format!("[{}/{}]", served.index + 1, served.total_count);
    let layout = if served.image.has_alpha() { "RGBA" } else { "RGB" };
    println!(
        "{} {}  {}",
        Theme::muted(&position),
        Theme::primary(&served.relative_path),
        Theme::value(&format!("{}x{} {}", served.image.width, served.image.height, layout))
    );

    if mode == OutputMode::Verbose {
        println!("  {}", Theme::muted(&display_path(&served.absolute_path)));
        println!(
            "  {}",
            Theme::muted(if served.from_cache {
                "served from prefetch cache"
            } else {
                "decoded inline"
            })
        );
    }
}

/// Print one JSON object per line.
pub fn print_served_json(served: &Served) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&JsonServed::from(served))?);
    Ok(())
}

pub fn print_status_human(state: &CursorState, location: &str) {
    println!();
    println!("{}", Theme::header("Cursor Status"));
    println!("{}", Theme::divider_bold(60));

    if state.scan_spec.root.as_os_str().is_empty() {
        println!("{}", Theme::muted("No cursor recorded yet."));
        println!("{:<14} {}", "Record:", Theme::muted(location));
        println!();
        return;
    }

    let extensions: Vec<&str> = state.scan_spec.extensions.iter().map(String::as_str).collect();
    println!("{:<14} {}", "Root:", Theme::value(&display_path(&state.scan_spec.root)));
    println!("{:<14} {}", "Recursive:", state.scan_spec.recursive);
    println!("{:<14} {}", "Extensions:", extensions.join(","));
    println!("{:<14} {}", "Transparency:", state.scan_spec.allow_transparency);
    println!("{:<14} {}", "Auto refresh:", state.scan_spec.auto_refresh);
    println!("{}", Theme::divider(60));
    println!(
        "{:<14} {} of {}",
        "Next file:",
        Theme::value(&(state.index + 1).min(state.len()).to_string()),
        Theme::value(&state.len().to_string())
    );
    if let Some(path) = state.current_file() {
        println!(
            "{:<14} {}",
            "",
            Theme::muted(&crate::utils::to_relative_path(path, &state.scan_spec.root))
        );
    }
    println!("{:<14} {}", "Fingerprint:", Theme::muted(&state.fingerprint.to_string()));
    if let Some(saved_at) = state.saved_at {
        println!("{:<14} {}", "Saved:", saved_at.to_rfc3339());
    }
    println!("{:<14} {}", "Record:", Theme::muted(location));
    println!();
}

pub fn print_status_json(state: &CursorState, location: &str) -> anyhow::Result<()> {
    let status = JsonStatus {
        version: "1.0".to_string(),
        location: location.to_string(),
        root: display_path(&state.scan_spec.root),
        recursive: state.scan_spec.recursive,
        extensions: state.scan_spec.extensions.iter().cloned().collect(),
        allow_transparency: state.scan_spec.allow_transparency,
        auto_refresh: state.scan_spec.auto_refresh,
        total_count: state.len(),
        index: state.index,
        next_file: state.current_file().map(display_path),
        fingerprint: state.fingerprint.as_str().to_string(),
        saved_at: state.saved_at.map(|t| t.to_rfc3339()),
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
