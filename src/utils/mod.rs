use std::path::Path;

/// Format a file size in human-readable form
pub fn format_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, units[unit_index])
    } else {
        format!("{:.2} {}", size, units[unit_index])
    }
}

/// Reduce a peer-supplied file name to its final path component so it
/// cannot escape the download directory. Both separator styles are
/// stripped; the peer may be on another platform.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let candidate = Path::new(last).file_name()?.to_str()?;
    if candidate.is_empty() || candidate == ".." || candidate == "." {
        return None;
    }
    Some(candidate.to_string())
}
