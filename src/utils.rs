use std::{
    env,
    path::{Path, PathBuf},
};

use rand::{Rng, distr::Alphanumeric};

/// Longest base name (before the extension) handed to clients.
const MAX_FILE_STEM_LEN: usize = 80;

pub fn generate_job_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Pulls the track id out of a track URL or `spotify:track:<id>` URI:
/// the last path segment with any query string or fragment stripped.
pub fn extract_track_id(track_ref: &str) -> Option<String> {
    let trimmed = track_ref.trim().trim_end_matches('/');
    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    let id = without_query
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim();

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Makes `"<artist> - <title>"` safe to use as a download name: path
/// separators and control characters are replaced and the result is capped
/// at 80 characters.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .take(MAX_FILE_STEM_LEN)
        .collect();

    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "track".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Keeps the last `max_chars` characters of `text`.
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Resolves a program name against `PATH`. Names containing a path separator
/// are checked as given.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}
